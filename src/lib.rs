// SPDX-License-Identifier: Apache-2.0

//! Pure Rust TPM 2.0 command/response marshalling
//!
//! This crate provides byte-exact serialization and parsing for the TPM
//! 2.0 wire protocol: the primitive and structure codecs, a typed command
//! layer with synchronous and callback-based entry points for each
//! command, and the authorization-delegate hooks that let session code
//! rewrite command/response parameters (HMAC sessions, parameter
//! encryption) around the basic marshalling step.
//!
//! ## Layers
//!
//! - [`marshal`]: big-endian primitive codec (`CommandBuffer`,
//!   `ResponseBuffer`, the `Marshal`/`Unmarshal` traits)
//! - [`types`]: one Rust type per TPM structure (`Tpm2b*`, `Tpms*`,
//!   `Tpmt*`, `Tpml*`, `Tpmu*`)
//! - [`tpm`]: per-command builders/parsers and the [`tpm::Tpm`] facade
//! - [`authorization`] / [`transceiver`]: the collaborator interfaces the
//!   command layer depends on, with a password delegate and a
//!   `/dev/tpm*` transport included
//!
//! ## Example
//!
//! ```no_run
//! use tpm2_proto::{Tpm, TpmDevice};
//!
//! let mut tpm = Tpm::new(TpmDevice::detect()?);
//! let random = tpm.get_random_sync(16, None)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod authorization;
pub mod constants;
pub mod error;
pub mod marshal;
pub mod session;
pub mod tpm;
pub mod transceiver;
pub mod types;

pub use authorization::{AuthorizationDelegate, PasswordAuthorizationDelegate, CONTINUE_SESSION};
pub use constants::*;
pub use error::{create_error_response, response_code, TpmRc, TpmResult};
pub use marshal::{CommandBuffer, Marshal, ResponseBuffer, Unmarshal};
pub use session::{compute_pcr_digest, AuthSession};
pub use tpm::*;
pub use transceiver::{CommandTransceiver, ResponseCallback, TpmDevice};
pub use types::*;
