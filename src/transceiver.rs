// SPDX-License-Identifier: Apache-2.0

//! Command transport
//!
//! A `CommandTransceiver` carries fully serialized command buffers to a
//! TPM and returns fully serialized responses, synchronously or through a
//! one-shot callback. Transmission failures are reported as a well-formed
//! error response rather than a separate error channel, so every caller
//! sees a single uniform outcome type.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, error};

use super::constants::MAX_COMMAND_SIZE;
use super::error::{create_error_response, TpmRc};

/// One-shot completion callback carrying the raw response bytes. The
/// lifetime bound lets callers parse with borrowed state; transceivers
/// that complete on another thread require `'static` captures.
pub type ResponseCallback<'a> = Box<dyn FnOnce(Vec<u8>) + 'a>;

pub trait CommandTransceiver {
    /// Sends `command` and blocks until the response arrives. A transport
    /// failure yields a synthesized error response.
    fn send_command_and_wait(&mut self, command: &[u8]) -> Vec<u8>;

    /// Sends `command` and invokes `callback` exactly once with the
    /// response (real or synthesized).
    fn send_command<'a>(&mut self, command: &[u8], callback: ResponseCallback<'a>);
}

/// Character-device transport for `/dev/tpmrm0` / `/dev/tpm0`.
pub struct TpmDevice {
    file: std::fs::File,
    path: String,
}

impl TpmDevice {
    /// Open a TPM device node.
    pub fn open(path: &str) -> Result<Self> {
        let device_path = path.strip_prefix("device:").unwrap_or(path);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(device_path)
            .with_context(|| format!("failed to open TPM device: {}", device_path))?;

        Ok(Self {
            file,
            path: device_path.to_string(),
        })
    }

    /// Detect and open the default TPM device, preferring the in-kernel
    /// resource manager.
    pub fn detect() -> Result<Self> {
        if Path::new("/dev/tpmrm0").exists() {
            Self::open("/dev/tpmrm0")
        } else if Path::new("/dev/tpm0").exists() {
            Self::open("/dev/tpm0")
        } else {
            bail!("TPM device not found")
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TpmRc> {
        if let Err(e) = self.file.write_all(command) {
            error!("failed to write TPM command to {}: {}", self.path, e);
            return Err(TpmRc::WRITE_ERROR);
        }

        let mut response = vec![0u8; MAX_COMMAND_SIZE];
        let n = match self.file.read(&mut response) {
            Ok(n) => n,
            Err(e) => {
                error!("failed to read TPM response from {}: {}", self.path, e);
                return Err(TpmRc::READ_ERROR);
            }
        };
        response.truncate(n);
        debug!("transmitted {} bytes, received {}", command.len(), n);
        Ok(response)
    }
}

impl CommandTransceiver for TpmDevice {
    fn send_command_and_wait(&mut self, command: &[u8]) -> Vec<u8> {
        match self.transmit(command) {
            Ok(response) => response,
            Err(rc) => create_error_response(rc),
        }
    }

    fn send_command<'a>(&mut self, command: &[u8], callback: ResponseCallback<'a>) {
        // The character device has no asynchronous completion; the
        // callback fires inline.
        let response = self.send_command_and_wait(command);
        callback(response);
    }
}
