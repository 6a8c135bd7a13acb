// SPDX-License-Identifier: Apache-2.0

//! Authorization delegates
//!
//! An `AuthorizationDelegate` is handed to every command. It produces the
//! authorization area for commands, verifies the authorization area of
//! responses, and performs parameter encryption/decryption. Delegates are
//! typically stateful (nonces, HMAC keys) and assume at most one in-flight
//! command at a time.

use tracing::error;

use super::constants::{tpm_rh, TpmaSa};
use super::marshal::{Marshal, ResponseBuffer, Unmarshal};
use super::types::{Tpm2bAuth, Tpm2bNonce, TpmsAuthCommand, TpmsAuthResponse};

/// Session attribute bit requesting that the session stay loaded after the
/// command completes.
pub const CONTINUE_SESSION: u8 = TpmaSa::CONTINUE_SESSION;

pub trait AuthorizationDelegate {
    /// Provides the exact octets of the command authorization area for a
    /// command whose parameter hash is `command_hash`. Encryption
    /// availability for the command/response is indicated by the two
    /// flags. Returns `None` on failure; an empty vector means the command
    /// carries no sessions.
    fn get_command_authorization(
        &mut self,
        command_hash: &[u8],
        is_command_parameter_encryption_possible: bool,
        is_response_parameter_encryption_possible: bool,
    ) -> Option<Vec<u8>>;

    /// Checks the authorization area of a response whose parameter hash is
    /// `response_hash`. Returns true iff the authorization is valid.
    fn check_response_authorization(&mut self, response_hash: &[u8], authorization: &[u8])
        -> bool;

    /// Encrypts `parameter` in place if encryption is enabled. Returns
    /// true on success (including the no-op case).
    fn encrypt_command_parameter(&mut self, parameter: &mut Vec<u8>) -> bool;

    /// Decrypts `parameter` in place if encryption is enabled. Returns
    /// true on success (including the no-op case).
    fn decrypt_response_parameter(&mut self, parameter: &mut Vec<u8>) -> bool;

    /// The current TPM-generated nonce associated with the session, if the
    /// delegate tracks one.
    fn get_tpm_nonce(&mut self) -> Option<Vec<u8>>;
}

/// Plain-password authorization: a single session referencing the built-in
/// password handle, no nonces, no encryption.
pub struct PasswordAuthorizationDelegate {
    password: Tpm2bAuth,
}

impl PasswordAuthorizationDelegate {
    pub fn new(password: impl Into<Vec<u8>>) -> Self {
        Self {
            password: Tpm2bAuth::new(password.into()),
        }
    }
}

impl AuthorizationDelegate for PasswordAuthorizationDelegate {
    fn get_command_authorization(
        &mut self,
        _command_hash: &[u8],
        _is_command_parameter_encryption_possible: bool,
        _is_response_parameter_encryption_possible: bool,
    ) -> Option<Vec<u8>> {
        let auth = TpmsAuthCommand {
            session_handle: tpm_rh::PW,
            nonce: Tpm2bNonce::empty(),
            session_attributes: TpmaSa(CONTINUE_SESSION),
            hmac: self.password.clone(),
        };
        match auth.to_bytes() {
            Ok(bytes) => Some(bytes),
            Err(rc) => {
                error!("could not serialize command auth: {rc}");
                None
            }
        }
    }

    fn check_response_authorization(
        &mut self,
        _response_hash: &[u8],
        authorization: &[u8],
    ) -> bool {
        let mut buf = ResponseBuffer::new(authorization);
        let auth = match TpmsAuthResponse::unmarshal(&mut buf) {
            Ok(auth) => auth,
            Err(rc) => {
                error!("could not parse authorization response: {rc}");
                return false;
            }
        };
        if buf.remaining() != 0 {
            error!("authorization response was of wrong length");
            return false;
        }
        if !auth.nonce.buffer.is_empty() {
            error!("received a non zero length nonce");
            return false;
        }
        if !auth.hmac.buffer.is_empty() {
            error!("received a non zero length hmac");
            return false;
        }
        if auth.session_attributes.0 != CONTINUE_SESSION {
            error!("received wrong session attributes");
            return false;
        }
        true
    }

    fn encrypt_command_parameter(&mut self, _parameter: &mut Vec<u8>) -> bool {
        true
    }

    fn decrypt_response_parameter(&mut self, _parameter: &mut Vec<u8>) -> bool {
        true
    }

    fn get_tpm_nonce(&mut self) -> Option<Vec<u8>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_authorization_bytes() {
        let mut delegate = PasswordAuthorizationDelegate::new(b"secret".to_vec());
        let auth = delegate
            .get_command_authorization(&[0u8; 32], false, false)
            .unwrap();
        let mut expected = vec![
            0x40, 0x00, 0x00, 0x09, // TPM_RS_PW
            0x00, 0x00, // empty nonce
            0x01, // continueSession
            0x00, 0x06, // hmac size
        ];
        expected.extend_from_slice(b"secret");
        assert_eq!(auth, expected);
    }

    #[test]
    fn response_authorization_accepts_null_auth() {
        let mut delegate = PasswordAuthorizationDelegate::new(Vec::new());
        // nonce size 0, continueSession, hmac size 0
        let good = [0x00, 0x00, 0x01, 0x00, 0x00];
        assert!(delegate.check_response_authorization(&[0u8; 32], &good));
    }

    #[test]
    fn response_authorization_rejects_bad_blocks() {
        let mut delegate = PasswordAuthorizationDelegate::new(Vec::new());
        // Non-empty nonce.
        let bad_nonce = [0x00, 0x01, 0xAA, 0x01, 0x00, 0x00];
        assert!(!delegate.check_response_authorization(&[0u8; 32], &bad_nonce));
        // Non-empty hmac.
        let bad_hmac = [0x00, 0x00, 0x01, 0x00, 0x01, 0xBB];
        assert!(!delegate.check_response_authorization(&[0u8; 32], &bad_hmac));
        // Wrong attributes.
        let bad_attrs = [0x00, 0x00, 0x00, 0x00, 0x00];
        assert!(!delegate.check_response_authorization(&[0u8; 32], &bad_attrs));
        // Trailing garbage after the auth block.
        let trailing = [0x00, 0x00, 0x01, 0x00, 0x00, 0xCC];
        assert!(!delegate.check_response_authorization(&[0u8; 32], &trailing));
        // Truncated block.
        let truncated = [0x00, 0x00, 0x01];
        assert!(!delegate.check_response_authorization(&[0u8; 32], &truncated));
    }

    #[test]
    fn password_delegate_is_a_noop_encryptor() {
        let mut delegate = PasswordAuthorizationDelegate::new(b"pw".to_vec());
        let mut parameter = b"payload".to_vec();
        assert!(delegate.encrypt_command_parameter(&mut parameter));
        assert!(delegate.decrypt_response_parameter(&mut parameter));
        assert_eq!(parameter, b"payload");
        assert!(delegate.get_tpm_nonce().is_none());
    }
}
