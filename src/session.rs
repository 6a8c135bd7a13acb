// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 policy-session helpers layered on the command layer

use sha2::{Digest, Sha256, Sha384, Sha512};
use tracing::debug;

use super::constants::{tpm_rh, TpmAlgId, TpmHandle, TpmSe};
use super::error::{TpmRc, TpmResult};
use super::tpm::{name_from_handle, Tpm};
use super::transceiver::CommandTransceiver;
use super::types::{Tpm2bDigest, Tpm2bEncryptedSecret, Tpm2bNonce, TpmlPcrSelection, TpmtSymDef};

/// An open authorization session handle
#[derive(Debug, Clone, Copy)]
pub struct AuthSession {
    pub handle: TpmHandle,
    pub session_type: TpmSe,
    pub hash_alg: TpmAlgId,
}

impl AuthSession {
    /// Start a new unbound, unsalted session.
    pub fn start<T: CommandTransceiver>(
        tpm: &mut Tpm<T>,
        session_type: TpmSe,
        hash_alg: TpmAlgId,
    ) -> TpmResult<Self> {
        // The TPM requires a nonce of at least 16 bytes even for sessions
        // that never use it.
        const ZERO_NONCE: [u8; 16] = [0u8; 16];

        let (handle, _nonce_tpm) = tpm.start_auth_session_sync(
            tpm_rh::NULL,
            &name_from_handle(tpm_rh::NULL),
            tpm_rh::NULL,
            &name_from_handle(tpm_rh::NULL),
            &Tpm2bNonce::new(ZERO_NONCE.to_vec()),
            &Tpm2bEncryptedSecret::empty(),
            session_type,
            &TpmtSymDef::aes_128_cfb(),
            hash_alg,
            None,
        )?;
        debug!("started auth session 0x{:08x}", handle);

        Ok(Self {
            handle,
            session_type,
            hash_alg,
        })
    }

    /// Start a policy session.
    pub fn start_policy<T: CommandTransceiver>(
        tpm: &mut Tpm<T>,
        hash_alg: TpmAlgId,
    ) -> TpmResult<Self> {
        Self::start(tpm, TpmSe::Policy, hash_alg)
    }

    /// Start a trial policy session (for computing policy digests).
    pub fn start_trial<T: CommandTransceiver>(
        tpm: &mut Tpm<T>,
        hash_alg: TpmAlgId,
    ) -> TpmResult<Self> {
        Self::start(tpm, TpmSe::Trial, hash_alg)
    }

    /// Bind this session to the current values of the selected PCRs.
    pub fn policy_pcr<T: CommandTransceiver>(
        &self,
        tpm: &mut Tpm<T>,
        pcr_digest: &[u8],
        pcrs: &TpmlPcrSelection,
    ) -> TpmResult<()> {
        tpm.policy_pcr_sync(
            self.handle,
            &name_from_handle(self.handle),
            &Tpm2bDigest::new(pcr_digest.to_vec()),
            pcrs,
            None,
        )
    }

    /// The session's current policy digest.
    pub fn get_digest<T: CommandTransceiver>(&self, tpm: &mut Tpm<T>) -> TpmResult<Vec<u8>> {
        let digest =
            tpm.policy_get_digest_sync(self.handle, &name_from_handle(self.handle), None)?;
        Ok(digest.buffer)
    }

    /// Flush (close) this session.
    pub fn flush<T: CommandTransceiver>(self, tpm: &mut Tpm<T>) -> TpmResult<()> {
        tpm.flush_context_sync(self.handle, None)
    }
}

/// Compute the PCR digest for a selection by reading the current PCR
/// values and hashing their concatenation with the bank algorithm.
pub fn compute_pcr_digest<T: CommandTransceiver>(
    tpm: &mut Tpm<T>,
    pcr_selection: &TpmlPcrSelection,
    hash_alg: TpmAlgId,
) -> TpmResult<Vec<u8>> {
    let (_update_counter, _selection_out, digest_list) =
        tpm.pcr_read_sync(pcr_selection, None)?;

    let mut concat = Vec::new();
    for digest in &digest_list.digests {
        concat.extend_from_slice(&digest.buffer);
    }

    let digest = match hash_alg {
        TpmAlgId::Sha256 => Sha256::digest(&concat).to_vec(),
        TpmAlgId::Sha384 => Sha384::digest(&concat).to_vec(),
        TpmAlgId::Sha512 => Sha512::digest(&concat).to_vec(),
        _ => return Err(TpmRc::HASH),
    };

    Ok(digest)
}
