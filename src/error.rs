// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 response codes
//!
//! Every fallible operation in this crate reports a `TpmRc`. Codes below
//! 0x1000 are the TPM's own response-code space (format-zero, format-one
//! and warning families); codes with a non-zero layer nibble (bits 12-15)
//! are produced locally by this library or by the transport and never
//! appear on the wire from a TPM.

use thiserror::Error;

use super::constants::TpmSt;

/// Result type used throughout the marshalling and command layers.
pub type TpmResult<T> = Result<T, TpmRc>;

/// A TPM 2.0 response code (TPM_RC), including locally-layered codes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("0x{:08x} ({})", self.0, self.describe())]
pub struct TpmRc(pub u32);

const RC_VER1: u32 = 0x100;
const RC_FMT1: u32 = 0x080;
const RC_WARN: u32 = 0x900;

// Layer bases for codes generated outside the TPM, following the TSS
// convention of using bits 12-15 for the originating layer.
const LAYER_LOCAL: u32 = 7 << 12;
const LAYER_TCTI: u32 = 8 << 12;

impl TpmRc {
    pub const SUCCESS: TpmRc = TpmRc(0);

    // Format-zero errors.
    pub const BAD_TAG: TpmRc = TpmRc(0x01E);
    pub const INITIALIZE: TpmRc = TpmRc(RC_VER1);
    pub const FAILURE: TpmRc = TpmRc(RC_VER1 + 0x001);
    pub const SEQUENCE: TpmRc = TpmRc(RC_VER1 + 0x003);
    pub const DISABLED: TpmRc = TpmRc(RC_VER1 + 0x020);
    pub const AUTH_MISSING: TpmRc = TpmRc(RC_VER1 + 0x025);
    pub const POLICY: TpmRc = TpmRc(RC_VER1 + 0x026);
    pub const PCR: TpmRc = TpmRc(RC_VER1 + 0x027);
    pub const PCR_CHANGED: TpmRc = TpmRc(RC_VER1 + 0x028);
    pub const COMMAND_SIZE: TpmRc = TpmRc(RC_VER1 + 0x042);
    pub const COMMAND_CODE: TpmRc = TpmRc(RC_VER1 + 0x043);
    pub const AUTHSIZE: TpmRc = TpmRc(RC_VER1 + 0x044);
    pub const NV_RANGE: TpmRc = TpmRc(RC_VER1 + 0x046);
    pub const NV_SIZE: TpmRc = TpmRc(RC_VER1 + 0x047);
    pub const NV_LOCKED: TpmRc = TpmRc(RC_VER1 + 0x048);
    pub const NV_UNINITIALIZED: TpmRc = TpmRc(RC_VER1 + 0x04A);
    pub const NV_SPACE: TpmRc = TpmRc(RC_VER1 + 0x04B);
    pub const NV_DEFINED: TpmRc = TpmRc(RC_VER1 + 0x04C);

    // Format-one errors. Bits 6 and 8-11 may carry a handle, parameter or
    // session index when reported by the device.
    pub const ASYMMETRIC: TpmRc = TpmRc(RC_FMT1 + 0x001);
    pub const ATTRIBUTES: TpmRc = TpmRc(RC_FMT1 + 0x002);
    pub const HASH: TpmRc = TpmRc(RC_FMT1 + 0x003);
    pub const VALUE: TpmRc = TpmRc(RC_FMT1 + 0x004);
    pub const HIERARCHY: TpmRc = TpmRc(RC_FMT1 + 0x005);
    pub const KEY_SIZE: TpmRc = TpmRc(RC_FMT1 + 0x007);
    pub const MODE: TpmRc = TpmRc(RC_FMT1 + 0x009);
    pub const TYPE: TpmRc = TpmRc(RC_FMT1 + 0x00A);
    pub const HANDLE: TpmRc = TpmRc(RC_FMT1 + 0x00B);
    pub const RANGE: TpmRc = TpmRc(RC_FMT1 + 0x00D);
    pub const AUTH_FAIL: TpmRc = TpmRc(RC_FMT1 + 0x00E);
    pub const NONCE: TpmRc = TpmRc(RC_FMT1 + 0x00F);
    pub const SCHEME: TpmRc = TpmRc(RC_FMT1 + 0x012);
    pub const SIZE: TpmRc = TpmRc(RC_FMT1 + 0x015);
    pub const SYMMETRIC: TpmRc = TpmRc(RC_FMT1 + 0x016);
    pub const TAG: TpmRc = TpmRc(RC_FMT1 + 0x017);
    pub const SELECTOR: TpmRc = TpmRc(RC_FMT1 + 0x018);
    pub const INSUFFICIENT: TpmRc = TpmRc(RC_FMT1 + 0x01A);
    pub const SIGNATURE: TpmRc = TpmRc(RC_FMT1 + 0x01B);
    pub const KEY: TpmRc = TpmRc(RC_FMT1 + 0x01C);
    pub const POLICY_FAIL: TpmRc = TpmRc(RC_FMT1 + 0x01D);
    pub const INTEGRITY: TpmRc = TpmRc(RC_FMT1 + 0x01F);
    pub const BAD_AUTH: TpmRc = TpmRc(RC_FMT1 + 0x022);
    pub const CURVE: TpmRc = TpmRc(RC_FMT1 + 0x026);

    // Warnings.
    pub const CONTEXT_GAP: TpmRc = TpmRc(RC_WARN + 0x001);
    pub const MEMORY: TpmRc = TpmRc(RC_WARN + 0x004);
    pub const LOCALITY: TpmRc = TpmRc(RC_WARN + 0x007);
    pub const YIELDED: TpmRc = TpmRc(RC_WARN + 0x008);
    pub const CANCELED: TpmRc = TpmRc(RC_WARN + 0x009);
    pub const TESTING: TpmRc = TpmRc(RC_WARN + 0x00A);
    pub const NV_RATE: TpmRc = TpmRc(RC_WARN + 0x020);
    pub const LOCKOUT: TpmRc = TpmRc(RC_WARN + 0x021);
    pub const RETRY: TpmRc = TpmRc(RC_WARN + 0x022);
    pub const NV_UNAVAILABLE: TpmRc = TpmRc(RC_WARN + 0x023);

    // Local (library-layer) codes.
    pub const AUTHORIZATION_FAILED: TpmRc = TpmRc(LAYER_LOCAL + 1);
    pub const ENCRYPTION_FAILED: TpmRc = TpmRc(LAYER_LOCAL + 2);
    pub const READ_ERROR: TpmRc = TpmRc(LAYER_LOCAL + 3);
    pub const WRITE_ERROR: TpmRc = TpmRc(LAYER_LOCAL + 4);
    pub const SESSION_SETUP_ERROR: TpmRc = TpmRc(LAYER_LOCAL + 6);
    pub const PARSE_ERROR: TpmRc = TpmRc(LAYER_LOCAL + 8);

    // Transport-layer codes, used when synthesizing an error response for
    // a transmission failure.
    pub const TCTI_TRY_AGAIN: TpmRc = TpmRc(LAYER_TCTI + 1);
    pub const TCTI_GENERAL_FAILURE: TpmRc = TpmRc(LAYER_TCTI + 2);
    pub const TCTI_NO_CONNECTION: TpmRc = TpmRc(LAYER_TCTI + 8);
    pub const TCTI_NO_RESPONSE: TpmRc = TpmRc(LAYER_TCTI + 11);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Whether this is a TPM format-one error, which may carry handle,
    /// parameter or session index bits.
    pub fn is_format_one(self) -> bool {
        self.0 & RC_FMT1 != 0 && self.0 >> 12 == 0
    }

    /// Strips the index bits from a format-one error so it can be compared
    /// against the canonical constants. Non-format-one codes are returned
    /// unchanged.
    pub fn format_one_error(self) -> TpmRc {
        if self.is_format_one() {
            TpmRc(self.0 & (RC_FMT1 | 0x03F))
        } else {
            self
        }
    }

    pub fn describe(self) -> &'static str {
        match self.format_one_error() {
            Self::SUCCESS => "success",
            Self::BAD_TAG => "bad tag",
            Self::INITIALIZE => "TPM not initialized",
            Self::FAILURE => "commands not accepted due to a TPM failure",
            Self::SEQUENCE => "improper use of a sequence handle",
            Self::DISABLED => "the command is disabled",
            Self::AUTH_MISSING => "a required authorization is not provided",
            Self::POLICY => "policy failure",
            Self::PCR => "PCR check fail",
            Self::PCR_CHANGED => "PCR have changed since checked",
            Self::COMMAND_SIZE => "command size field inconsistent with buffer",
            Self::COMMAND_CODE => "command code not supported",
            Self::AUTHSIZE => "authorization size field is invalid",
            Self::NV_RANGE => "NV offset+size is out of range",
            Self::NV_SIZE => "requested allocation size is larger than allowed",
            Self::NV_LOCKED => "NV access locked",
            Self::NV_UNINITIALIZED => "NV location has not been written",
            Self::NV_SPACE => "insufficient space for NV allocation",
            Self::NV_DEFINED => "NV index or persistent object already defined",
            Self::ASYMMETRIC => "asymmetric algorithm not supported or not correct",
            Self::ATTRIBUTES => "inconsistent attributes",
            Self::HASH => "hash algorithm not supported or not appropriate",
            Self::VALUE => "value is out of range or is not correct for the context",
            Self::HIERARCHY => "hierarchy is not enabled or is not correct for the use",
            Self::KEY_SIZE => "key size is not supported",
            Self::MODE => "mode of operation not supported",
            Self::TYPE => "the type of the value is not appropriate for the use",
            Self::HANDLE => "the handle is not correct for the use",
            Self::RANGE => "value was out of allowed range",
            Self::AUTH_FAIL => "the authorization HMAC check failed",
            Self::NONCE => "invalid nonce size",
            Self::SCHEME => "unsupported or incompatible scheme",
            Self::SIZE => "structure is the wrong size",
            Self::SYMMETRIC => "unsupported symmetric algorithm or key size",
            Self::TAG => "incorrect structure tag",
            Self::SELECTOR => "union selector is incorrect",
            Self::INSUFFICIENT => "the buffer is too short for the operation",
            Self::SIGNATURE => "the signature is not valid",
            Self::KEY => "key fields are not compatible with the selected use",
            Self::POLICY_FAIL => "a policy check failed",
            Self::INTEGRITY => "integrity check failed",
            Self::BAD_AUTH => "authorization failure without DA implications",
            Self::CURVE => "curve not supported",
            Self::CONTEXT_GAP => "gap for context ID is too large",
            Self::MEMORY => "out of memory for object contexts",
            Self::LOCALITY => "command locality is not appropriate",
            Self::YIELDED => "the TPM has suspended operation on the command",
            Self::CANCELED => "the command was canceled",
            Self::TESTING => "TPM is performing self-tests",
            Self::NV_RATE => "NV is rate-limiting accesses",
            Self::LOCKOUT => "authorizations are disabled by DA lockout",
            Self::RETRY => "the TPM was not able to start the command",
            Self::NV_UNAVAILABLE => "NV is not available for write",
            Self::AUTHORIZATION_FAILED => "local response authorization check failed",
            Self::ENCRYPTION_FAILED => "parameter encryption or decryption failed",
            Self::READ_ERROR => "failed to read from the TPM device",
            Self::WRITE_ERROR => "failed to write to the TPM device",
            Self::SESSION_SETUP_ERROR => "failed to set up a session",
            Self::PARSE_ERROR => "failed to parse a TPM structure",
            Self::TCTI_TRY_AGAIN => "transport busy, try again",
            Self::TCTI_GENERAL_FAILURE => "general transport failure",
            Self::TCTI_NO_CONNECTION => "no connection to the TPM",
            Self::TCTI_NO_RESPONSE => "no response from the TPM",
            _ => "unknown error code",
        }
    }
}

impl std::fmt::Debug for TpmRc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TpmRc(0x{:x})", self.0)
    }
}

/// Builds a well-formed 10-byte response carrying `rc`, used to keep
/// transport failures on the same code path as device errors.
pub fn create_error_response(rc: TpmRc) -> Vec<u8> {
    let mut response = Vec::with_capacity(10);
    response.extend_from_slice(&TpmSt::NoSessions.to_u16().to_be_bytes());
    response.extend_from_slice(&10u32.to_be_bytes());
    response.extend_from_slice(&rc.0.to_be_bytes());
    response
}

/// Extracts the response code from a response header without parsing the
/// body. Fails with `INSUFFICIENT` if the header is incomplete.
pub fn response_code(response: &[u8]) -> TpmResult<TpmRc> {
    if response.len() < 10 {
        return Err(TpmRc::INSUFFICIENT);
    }
    Ok(TpmRc(u32::from_be_bytes([
        response[6],
        response[7],
        response[8],
        response[9],
    ])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_one_index_bits_are_stripped() {
        // 0x98E is TPM_RC_AUTH_FAIL with a session index overlaid.
        assert_eq!(TpmRc(0x98E).format_one_error(), TpmRc::AUTH_FAIL);
        // Format-zero and layered codes pass through untouched.
        assert_eq!(TpmRc::FAILURE.format_one_error(), TpmRc::FAILURE);
        assert_eq!(
            TpmRc::AUTHORIZATION_FAILED.format_one_error(),
            TpmRc::AUTHORIZATION_FAILED
        );
    }

    #[test]
    fn error_response_shape() {
        let response = create_error_response(TpmRc::FAILURE);
        assert_eq!(
            response,
            [0x80, 0x01, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x01, 0x01]
        );
        assert_eq!(response_code(&response).unwrap(), TpmRc::FAILURE);
    }

    #[test]
    fn response_code_needs_full_header() {
        assert_eq!(response_code(&[0x80, 0x01]), Err(TpmRc::INSUFFICIENT));
    }

    #[test]
    fn describe_strips_index_bits() {
        assert_eq!(TpmRc(0x98E).describe(), "the authorization HMAC check failed");
    }
}
