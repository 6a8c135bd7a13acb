// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 data structures
//!
//! One Rust type per TPM structure, each with `Marshal`/`Unmarshal`
//! implementations composed from the primitive codec. Tagged unions
//! (`Tpmu*`) have no self-describing tag on the wire: their codec entry
//! points take the selector value explicitly, supplied by the caller from
//! the sibling field of the enclosing structure.

use super::constants::*;
use super::error::{TpmRc, TpmResult};
use super::marshal::*;

impl Marshal for TpmAlgId {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        buf.put_u16(self.to_u16());
        Ok(())
    }
}

impl Unmarshal for TpmAlgId {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        let v = buf.get_u16()?;
        TpmAlgId::from_u16(v).ok_or(TpmRc::VALUE)
    }
}

impl Marshal for TpmSt {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        buf.put_u16(self.to_u16());
        Ok(())
    }
}

impl Unmarshal for TpmSt {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        let v = buf.get_u16()?;
        TpmSt::from_u16(v).ok_or(TpmRc::TAG)
    }
}

impl Marshal for TpmCap {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        buf.put_u32(self.to_u32());
        Ok(())
    }
}

impl Unmarshal for TpmCap {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        let v = buf.get_u32()?;
        TpmCap::from_u32(v).ok_or(TpmRc::VALUE)
    }
}

impl Marshal for TpmEccCurve {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        buf.put_u16(self.to_u16());
        Ok(())
    }
}

impl Unmarshal for TpmEccCurve {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        let v = buf.get_u16()?;
        TpmEccCurve::from_u16(v).ok_or(TpmRc::CURVE)
    }
}

// ==================== Length-prefixed buffers ====================

/// Defines a raw-byte TPM2B type: a 16-bit size prefix followed by exactly
/// that many content bytes, with a fixed type-specific capacity enforced in
/// both directions.
macro_rules! tpm2b_bytes {
    ($(#[$attr:meta])* $name:ident, $capacity:expr) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Default)]
        pub struct $name {
            pub buffer: Vec<u8>,
        }

        impl $name {
            pub const CAPACITY: usize = $capacity;

            pub fn new(data: impl Into<Vec<u8>>) -> Self {
                Self { buffer: data.into() }
            }

            pub fn empty() -> Self {
                Self { buffer: Vec::new() }
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.buffer
            }

            pub fn into_vec(self) -> Vec<u8> {
                self.buffer
            }
        }

        impl Marshal for $name {
            fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
                if self.buffer.len() > Self::CAPACITY {
                    return Err(TpmRc::INSUFFICIENT);
                }
                buf.put_tpm2b(&self.buffer);
                Ok(())
            }
        }

        impl Unmarshal for $name {
            fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
                let size = buf.get_u16()? as usize;
                if size > Self::CAPACITY {
                    return Err(TpmRc::INSUFFICIENT);
                }
                Ok(Self { buffer: buf.get_bytes(size)? })
            }
        }
    };
}

tpm2b_bytes!(
    /// TPM2B_DIGEST - digest sized for the largest supported hash
    Tpm2bDigest,
    64
);
tpm2b_bytes!(
    /// TPM2B_DATA - external data sized to hold a TPMT_HA
    Tpm2bData,
    66
);
tpm2b_bytes!(
    /// TPM2B_EVENT - event data for PCR event commands
    Tpm2bEvent,
    1024
);
tpm2b_bytes!(
    /// TPM2B_MAX_BUFFER - general-purpose data buffer
    Tpm2bMaxBuffer,
    1024
);
tpm2b_bytes!(
    /// TPM2B_MAX_NV_BUFFER - NV read/write data buffer
    Tpm2bMaxNvBuffer,
    1024
);
tpm2b_bytes!(
    /// TPM2B_NAME - object name: a handle or a hash prefixed by its algorithm
    Tpm2bName,
    68
);
tpm2b_bytes!(
    /// TPM2B_TIMEOUT - policy timeout value
    Tpm2bTimeout,
    8
);
tpm2b_bytes!(
    /// TPM2B_IV - symmetric block-cipher initialization vector
    Tpm2bIv,
    16
);
tpm2b_bytes!(
    /// TPM2B_SYM_KEY - symmetric key
    Tpm2bSymKey,
    16
);
tpm2b_bytes!(
    /// TPM2B_SENSITIVE_DATA - data to be sealed
    Tpm2bSensitiveData,
    128
);
tpm2b_bytes!(
    /// TPM2B_PUBLIC_KEY_RSA - RSA modulus or signature
    Tpm2bPublicKeyRsa,
    256
);
tpm2b_bytes!(
    /// TPM2B_PRIVATE_KEY_RSA - RSA prime factor
    Tpm2bPrivateKeyRsa,
    128
);
tpm2b_bytes!(
    /// TPM2B_ECC_PARAMETER - ECC coordinate or scalar
    Tpm2bEccParameter,
    32
);
tpm2b_bytes!(
    /// TPM2B_ENCRYPTED_SECRET - secret protected by an asymmetric key
    Tpm2bEncryptedSecret,
    256
);
tpm2b_bytes!(
    /// TPM2B_PRIVATE - opaque encrypted private area
    Tpm2bPrivate,
    1024
);
tpm2b_bytes!(
    /// TPM2B_ID_OBJECT - credential blob for ActivateCredential
    Tpm2bIdObject,
    1024
);
tpm2b_bytes!(
    /// TPM2B_CONTEXT_SENSITIVE - encrypted context payload
    Tpm2bContextSensitive,
    4000
);
tpm2b_bytes!(
    /// TPM2B_CONTEXT_DATA - saved-context blob
    Tpm2bContextData,
    4068
);
tpm2b_bytes!(
    /// TPM2B_ATTEST - marshalled TPMS_ATTEST produced by the TPM
    Tpm2bAttest,
    2048
);
tpm2b_bytes!(
    /// TPM2B_DIGEST_VALUES - marshalled TPML_DIGEST_VALUES
    Tpm2bDigestValues,
    334
);

/// TPM2B_NONCE - session nonce
pub type Tpm2bNonce = Tpm2bDigest;
/// TPM2B_AUTH - authorization value
pub type Tpm2bAuth = Tpm2bDigest;
/// TPM2B_OPERAND - comparison operand for policy commands
pub type Tpm2bOperand = Tpm2bDigest;

// ==================== Hash values ====================

/// TPMT_HA - hash value tagged with its algorithm. The digest is the
/// TPMU_HA union; its length on the wire is fixed by the algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtHa {
    pub hash_alg: TpmAlgId,
    pub digest: Vec<u8>,
}

impl TpmtHa {
    pub fn new(hash_alg: TpmAlgId, digest: Vec<u8>) -> Self {
        Self { hash_alg, digest }
    }

    pub fn sha256(digest: Vec<u8>) -> Self {
        Self::new(TpmAlgId::Sha256, digest)
    }
}

impl Marshal for TpmtHa {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.hash_alg.marshal(buf)?;
        let size = self.hash_alg.digest_size();
        if self.digest.len() != size {
            return Err(TpmRc::SIZE);
        }
        buf.put_bytes(&self.digest);
        Ok(())
    }
}

impl Unmarshal for TpmtHa {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        let hash_alg = TpmAlgId::unmarshal(buf)?;
        let digest = buf.get_bytes(hash_alg.digest_size())?;
        Ok(Self { hash_alg, digest })
    }
}

// ==================== PCR selections ====================

/// TPMS_PCR_SELECTION - PCR bitmap for a single hash algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsPcrSelection {
    pub hash: TpmAlgId,
    pub pcr_select: Vec<u8>,
}

impl TpmsPcrSelection {
    pub fn new(hash: TpmAlgId, pcrs: &[u32]) -> Self {
        let max_pcr = pcrs.iter().max().copied().unwrap_or(0);
        let size = (((max_pcr / 8) + 1) as usize).max(PCR_SELECT_MAX);
        let mut pcr_select = vec![0u8; size];

        for &pcr in pcrs {
            let byte_idx = (pcr / 8) as usize;
            let bit_idx = pcr % 8;
            if byte_idx < pcr_select.len() {
                pcr_select[byte_idx] |= 1 << bit_idx;
            }
        }

        Self { hash, pcr_select }
    }

    pub fn sha256(pcrs: &[u32]) -> Self {
        Self::new(TpmAlgId::Sha256, pcrs)
    }
}

impl Marshal for TpmsPcrSelection {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        if self.pcr_select.len() > PCR_SELECT_MAX {
            return Err(TpmRc::INSUFFICIENT);
        }
        self.hash.marshal(buf)?;
        buf.put_u8(self.pcr_select.len() as u8);
        buf.put_bytes(&self.pcr_select);
        Ok(())
    }
}

impl Unmarshal for TpmsPcrSelection {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        let hash = TpmAlgId::unmarshal(buf)?;
        let size = buf.get_u8()? as usize;
        if size > PCR_SELECT_MAX {
            return Err(TpmRc::INSUFFICIENT);
        }
        let pcr_select = buf.get_bytes(size)?;
        Ok(Self { hash, pcr_select })
    }
}

// ==================== Lists ====================

const MAX_ALG_LIST_SIZE: usize = 64;
const MAX_CAP_ALGS: usize = 68;
const MAX_CAP_HANDLES: usize = 254;
const MAX_CAP_CC: usize = 256;
const MAX_TPM_PROPERTIES: usize = 127;
const MAX_PCR_PROPERTIES: usize = 127;
const MAX_ECC_CURVES: usize = 508;

/// Defines a TPML type: a 32-bit count followed by that many elements,
/// with the implementation's list capacity enforced in both directions.
macro_rules! tpml {
    ($(#[$attr:meta])* $name:ident, $field:ident: $elem:ty, $capacity:expr) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Default)]
        pub struct $name {
            pub $field: Vec<$elem>,
        }

        impl $name {
            pub const CAPACITY: usize = $capacity;

            pub fn new($field: Vec<$elem>) -> Self {
                Self { $field }
            }
        }

        impl Marshal for $name {
            fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
                if self.$field.len() > Self::CAPACITY {
                    return Err(TpmRc::INSUFFICIENT);
                }
                buf.put_u32(self.$field.len() as u32);
                for item in &self.$field {
                    item.marshal(buf)?;
                }
                Ok(())
            }
        }

        impl Unmarshal for $name {
            fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
                let count = buf.get_u32()? as usize;
                if count > Self::CAPACITY {
                    return Err(TpmRc::INSUFFICIENT);
                }
                let mut $field = Vec::with_capacity(count);
                for _ in 0..count {
                    $field.push(<$elem>::unmarshal(buf)?);
                }
                Ok(Self { $field })
            }
        }
    };
}

tpml!(
    /// TPML_ALG - list of algorithm IDs
    TpmlAlg,
    algorithms: TpmAlgId,
    MAX_ALG_LIST_SIZE
);
tpml!(
    /// TPML_HANDLE - list of handles from a capability query
    TpmlHandle,
    handle: u32,
    MAX_CAP_HANDLES
);
tpml!(
    /// TPML_CC - list of command codes
    TpmlCc,
    command_codes: u32,
    MAX_CAP_CC
);
tpml!(
    /// TPML_CCA - list of command attribute words
    TpmlCca,
    command_attributes: u32,
    MAX_CAP_CC
);
tpml!(
    /// TPML_DIGEST - list of digests (PolicyOR, PCR_Read)
    TpmlDigest,
    digests: Tpm2bDigest,
    8
);
tpml!(
    /// TPML_DIGEST_VALUES - one tagged digest per PCR bank
    TpmlDigestValues,
    digests: TpmtHa,
    HASH_COUNT
);
tpml!(
    /// TPML_PCR_SELECTION - PCR selections across banks
    TpmlPcrSelection,
    pcr_selections: TpmsPcrSelection,
    HASH_COUNT
);
tpml!(
    /// TPML_ECC_CURVE - list of supported ECC curves
    TpmlEccCurve,
    ecc_curves: TpmEccCurve,
    MAX_ECC_CURVES
);

impl TpmlPcrSelection {
    pub fn single(hash: TpmAlgId, pcrs: &[u32]) -> Self {
        Self {
            pcr_selections: vec![TpmsPcrSelection::new(hash, pcrs)],
        }
    }
}

impl TpmlDigestValues {
    pub fn single(digest: TpmtHa) -> Self {
        Self {
            digests: vec![digest],
        }
    }
}

// ==================== Tickets ====================

macro_rules! ticket {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub tag: TpmSt,
            pub hierarchy: TpmHandle,
            pub digest: Tpm2bDigest,
        }

        impl $name {
            /// The null ticket the TPM returns when no ticket applies.
            pub fn null(tag: TpmSt) -> Self {
                Self {
                    tag,
                    hierarchy: tpm_rh::NULL,
                    digest: Tpm2bDigest::empty(),
                }
            }
        }

        impl Marshal for $name {
            fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
                self.tag.marshal(buf)?;
                buf.put_u32(self.hierarchy);
                self.digest.marshal(buf)
            }
        }

        impl Unmarshal for $name {
            fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
                Ok(Self {
                    tag: TpmSt::unmarshal(buf)?,
                    hierarchy: buf.get_u32()?,
                    digest: Tpm2bDigest::unmarshal(buf)?,
                })
            }
        }
    };
}

ticket!(
    /// TPMT_TK_CREATION - ticket binding creation data to an object
    TpmtTkCreation
);
ticket!(
    /// TPMT_TK_VERIFIED - ticket from VerifySignature
    TpmtTkVerified
);
ticket!(
    /// TPMT_TK_AUTH - ticket from a signed or secret policy assertion
    TpmtTkAuth
);
ticket!(
    /// TPMT_TK_HASHCHECK - ticket proving a digest was produced by the TPM
    TpmtTkHashcheck
);

// ==================== Authorization blocks ====================

/// TPMS_AUTH_COMMAND - one session's entry in a command authorization area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsAuthCommand {
    pub session_handle: TpmHandle,
    pub nonce: Tpm2bNonce,
    pub session_attributes: TpmaSa,
    pub hmac: Tpm2bAuth,
}

impl Marshal for TpmsAuthCommand {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        buf.put_u32(self.session_handle);
        self.nonce.marshal(buf)?;
        buf.put_u8(self.session_attributes.0);
        self.hmac.marshal(buf)
    }
}

impl Unmarshal for TpmsAuthCommand {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            session_handle: buf.get_u32()?,
            nonce: Tpm2bNonce::unmarshal(buf)?,
            session_attributes: TpmaSa(buf.get_u8()?),
            hmac: Tpm2bAuth::unmarshal(buf)?,
        })
    }
}

/// TPMS_AUTH_RESPONSE - one session's entry in a response authorization area
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TpmsAuthResponse {
    pub nonce: Tpm2bNonce,
    pub session_attributes: TpmaSa,
    pub hmac: Tpm2bAuth,
}

impl Marshal for TpmsAuthResponse {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.nonce.marshal(buf)?;
        buf.put_u8(self.session_attributes.0);
        self.hmac.marshal(buf)
    }
}

impl Unmarshal for TpmsAuthResponse {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            nonce: Tpm2bNonce::unmarshal(buf)?,
            session_attributes: TpmaSa(buf.get_u8()?),
            hmac: Tpm2bAuth::unmarshal(buf)?,
        })
    }
}

// ==================== Symmetric definitions ====================

/// TPMU_SYM_KEY_BITS - key size selected by the symmetric algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmuSymKeyBits {
    /// Key size in bits for a block cipher (AES, SM4, Camellia).
    Sym(u16),
    /// Hash algorithm for XOR obfuscation.
    Xor(TpmAlgId),
    Null,
}

impl TpmuSymKeyBits {
    pub fn marshal(&self, selector: TpmAlgId, buf: &mut CommandBuffer) -> TpmResult<()> {
        match (selector, self) {
            (TpmAlgId::Aes | TpmAlgId::Sm4 | TpmAlgId::Camellia, Self::Sym(bits)) => {
                buf.put_u16(*bits);
                Ok(())
            }
            (TpmAlgId::Xor, Self::Xor(hash)) => hash.marshal(buf),
            (TpmAlgId::Aes | TpmAlgId::Sm4 | TpmAlgId::Camellia | TpmAlgId::Xor, _) => {
                Err(TpmRc::SELECTOR)
            }
            (_, Self::Null) => Ok(()),
            _ => Err(TpmRc::SELECTOR),
        }
    }

    pub fn unmarshal(selector: TpmAlgId, buf: &mut ResponseBuffer) -> TpmResult<Self> {
        match selector {
            TpmAlgId::Aes | TpmAlgId::Sm4 | TpmAlgId::Camellia => Ok(Self::Sym(buf.get_u16()?)),
            TpmAlgId::Xor => Ok(Self::Xor(TpmAlgId::unmarshal(buf)?)),
            _ => Ok(Self::Null),
        }
    }
}

/// TPMU_SYM_MODE - block-cipher mode selected by the symmetric algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmuSymMode {
    Sym(TpmAlgId),
    Null,
}

impl TpmuSymMode {
    pub fn marshal(&self, selector: TpmAlgId, buf: &mut CommandBuffer) -> TpmResult<()> {
        match (selector, self) {
            (TpmAlgId::Aes | TpmAlgId::Sm4 | TpmAlgId::Camellia, Self::Sym(mode)) => {
                mode.marshal(buf)
            }
            (TpmAlgId::Aes | TpmAlgId::Sm4 | TpmAlgId::Camellia, _) => Err(TpmRc::SELECTOR),
            (_, Self::Null) => Ok(()),
            _ => Err(TpmRc::SELECTOR),
        }
    }

    pub fn unmarshal(selector: TpmAlgId, buf: &mut ResponseBuffer) -> TpmResult<Self> {
        match selector {
            TpmAlgId::Aes | TpmAlgId::Sm4 | TpmAlgId::Camellia => {
                Ok(Self::Sym(TpmAlgId::unmarshal(buf)?))
            }
            _ => Ok(Self::Null),
        }
    }
}

/// TPMU_SYM_DETAILS - no symmetric algorithm defines detail fields, so
/// this union is always empty on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TpmuSymDetails;

impl TpmuSymDetails {
    pub fn marshal(&self, _selector: TpmAlgId, _buf: &mut CommandBuffer) -> TpmResult<()> {
        Ok(())
    }

    pub fn unmarshal(_selector: TpmAlgId, _buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self)
    }
}

/// TPMT_SYM_DEF - symmetric algorithm selection for sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmtSymDef {
    pub algorithm: TpmAlgId,
    pub key_bits: TpmuSymKeyBits,
    pub mode: TpmuSymMode,
    pub details: TpmuSymDetails,
}

impl TpmtSymDef {
    pub fn null() -> Self {
        Self {
            algorithm: TpmAlgId::Null,
            key_bits: TpmuSymKeyBits::Null,
            mode: TpmuSymMode::Null,
            details: TpmuSymDetails,
        }
    }

    pub fn aes_128_cfb() -> Self {
        Self {
            algorithm: TpmAlgId::Aes,
            key_bits: TpmuSymKeyBits::Sym(128),
            mode: TpmuSymMode::Sym(TpmAlgId::Cfb),
            details: TpmuSymDetails,
        }
    }
}

impl Marshal for TpmtSymDef {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.algorithm.marshal(buf)?;
        self.key_bits.marshal(self.algorithm, buf)?;
        self.mode.marshal(self.algorithm, buf)?;
        self.details.marshal(self.algorithm, buf)
    }
}

impl Unmarshal for TpmtSymDef {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        let algorithm = TpmAlgId::unmarshal(buf)?;
        Ok(Self {
            algorithm,
            key_bits: TpmuSymKeyBits::unmarshal(algorithm, buf)?,
            mode: TpmuSymMode::unmarshal(algorithm, buf)?,
            details: TpmuSymDetails::unmarshal(algorithm, buf)?,
        })
    }
}

/// TPMT_SYM_DEF_OBJECT - symmetric definition for object parameters
pub type TpmtSymDefObject = TpmtSymDef;

/// TPMS_SYMCIPHER_PARMS - parameters of a symmetric block cipher object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsSymcipherParms {
    pub sym: TpmtSymDefObject,
}

impl Marshal for TpmsSymcipherParms {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.sym.marshal(buf)
    }
}

impl Unmarshal for TpmsSymcipherParms {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            sym: TpmtSymDefObject::unmarshal(buf)?,
        })
    }
}

// ==================== Schemes ====================

/// TPMS_SCHEME_SIGHASH - the common single-hash scheme body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsSchemeSigHash {
    pub hash_alg: TpmAlgId,
}

impl Marshal for TpmsSchemeSigHash {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.hash_alg.marshal(buf)
    }
}

impl Unmarshal for TpmsSchemeSigHash {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            hash_alg: TpmAlgId::unmarshal(buf)?,
        })
    }
}

pub type TpmsSchemeHmac = TpmsSchemeSigHash;
pub type TpmsSchemeRsassa = TpmsSchemeSigHash;
pub type TpmsSchemeRsapss = TpmsSchemeSigHash;
pub type TpmsSchemeEcdsa = TpmsSchemeSigHash;
pub type TpmsSchemeMgf1 = TpmsSchemeSigHash;

/// TPMS_SCHEME_XOR - XOR obfuscation scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsSchemeXor {
    pub hash_alg: TpmAlgId,
    pub kdf: TpmAlgId,
}

impl Marshal for TpmsSchemeXor {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.hash_alg.marshal(buf)?;
        self.kdf.marshal(buf)
    }
}

impl Unmarshal for TpmsSchemeXor {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            hash_alg: TpmAlgId::unmarshal(buf)?,
            kdf: TpmAlgId::unmarshal(buf)?,
        })
    }
}

/// TPMS_SCHEME_ECDAA - anonymous attestation scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsSchemeEcdaa {
    pub hash_alg: TpmAlgId,
    pub count: u16,
}

impl Marshal for TpmsSchemeEcdaa {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.hash_alg.marshal(buf)?;
        buf.put_u16(self.count);
        Ok(())
    }
}

impl Unmarshal for TpmsSchemeEcdaa {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            hash_alg: TpmAlgId::unmarshal(buf)?,
            count: buf.get_u16()?,
        })
    }
}

/// TPMU_SIG_SCHEME - signature scheme details selected by the scheme
/// algorithm of the enclosing TPMT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmuSigScheme {
    SigHash(TpmsSchemeSigHash),
    Ecdaa(TpmsSchemeEcdaa),
    Null,
}

impl TpmuSigScheme {
    fn wants_sighash(selector: TpmAlgId) -> bool {
        matches!(
            selector,
            TpmAlgId::RsaSsa
                | TpmAlgId::RsaPss
                | TpmAlgId::EcDsa
                | TpmAlgId::Sm2
                | TpmAlgId::EcSchnorr
                | TpmAlgId::Hmac
        )
    }

    pub fn marshal(&self, selector: TpmAlgId, buf: &mut CommandBuffer) -> TpmResult<()> {
        match self {
            Self::SigHash(scheme) if Self::wants_sighash(selector) => scheme.marshal(buf),
            Self::Ecdaa(scheme) if selector == TpmAlgId::EcDaa => scheme.marshal(buf),
            Self::Null if !Self::wants_sighash(selector) && selector != TpmAlgId::EcDaa => Ok(()),
            _ => Err(TpmRc::SELECTOR),
        }
    }

    pub fn unmarshal(selector: TpmAlgId, buf: &mut ResponseBuffer) -> TpmResult<Self> {
        if Self::wants_sighash(selector) {
            Ok(Self::SigHash(TpmsSchemeSigHash::unmarshal(buf)?))
        } else if selector == TpmAlgId::EcDaa {
            Ok(Self::Ecdaa(TpmsSchemeEcdaa::unmarshal(buf)?))
        } else {
            Ok(Self::Null)
        }
    }
}

/// TPMT_SIG_SCHEME - signature scheme selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmtSigScheme {
    pub scheme: TpmAlgId,
    pub details: TpmuSigScheme,
}

impl TpmtSigScheme {
    pub fn null() -> Self {
        Self {
            scheme: TpmAlgId::Null,
            details: TpmuSigScheme::Null,
        }
    }

    pub fn rsassa(hash_alg: TpmAlgId) -> Self {
        Self {
            scheme: TpmAlgId::RsaSsa,
            details: TpmuSigScheme::SigHash(TpmsSchemeSigHash { hash_alg }),
        }
    }

    pub fn ecdsa(hash_alg: TpmAlgId) -> Self {
        Self {
            scheme: TpmAlgId::EcDsa,
            details: TpmuSigScheme::SigHash(TpmsSchemeSigHash { hash_alg }),
        }
    }
}

impl Marshal for TpmtSigScheme {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.scheme.marshal(buf)?;
        self.details.marshal(self.scheme, buf)
    }
}

impl Unmarshal for TpmtSigScheme {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        let scheme = TpmAlgId::unmarshal(buf)?;
        Ok(Self {
            scheme,
            details: TpmuSigScheme::unmarshal(scheme, buf)?,
        })
    }
}

/// TPMU_ASYM_SCHEME - asymmetric scheme details; also covers encryption
/// schemes (OAEP, ECDH) that the signature union does not
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmuAsymScheme {
    SigHash(TpmsSchemeSigHash),
    Ecdaa(TpmsSchemeEcdaa),
    Null,
}

impl TpmuAsymScheme {
    fn wants_sighash(selector: TpmAlgId) -> bool {
        matches!(
            selector,
            TpmAlgId::RsaSsa
                | TpmAlgId::RsaPss
                | TpmAlgId::Oaep
                | TpmAlgId::EcDsa
                | TpmAlgId::EcDh
                | TpmAlgId::Sm2
                | TpmAlgId::EcSchnorr
        )
    }

    pub fn marshal(&self, selector: TpmAlgId, buf: &mut CommandBuffer) -> TpmResult<()> {
        match self {
            Self::SigHash(scheme) if Self::wants_sighash(selector) => scheme.marshal(buf),
            Self::Ecdaa(scheme) if selector == TpmAlgId::EcDaa => scheme.marshal(buf),
            Self::Null if !Self::wants_sighash(selector) && selector != TpmAlgId::EcDaa => Ok(()),
            _ => Err(TpmRc::SELECTOR),
        }
    }

    pub fn unmarshal(selector: TpmAlgId, buf: &mut ResponseBuffer) -> TpmResult<Self> {
        if Self::wants_sighash(selector) {
            Ok(Self::SigHash(TpmsSchemeSigHash::unmarshal(buf)?))
        } else if selector == TpmAlgId::EcDaa {
            Ok(Self::Ecdaa(TpmsSchemeEcdaa::unmarshal(buf)?))
        } else {
            Ok(Self::Null)
        }
    }
}

/// TPMT_RSA_SCHEME - RSA scheme selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmtRsaScheme {
    pub scheme: TpmAlgId,
    pub details: TpmuAsymScheme,
}

impl TpmtRsaScheme {
    pub fn null() -> Self {
        Self {
            scheme: TpmAlgId::Null,
            details: TpmuAsymScheme::Null,
        }
    }

    pub fn rsassa(hash_alg: TpmAlgId) -> Self {
        Self {
            scheme: TpmAlgId::RsaSsa,
            details: TpmuAsymScheme::SigHash(TpmsSchemeSigHash { hash_alg }),
        }
    }
}

impl Marshal for TpmtRsaScheme {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.scheme.marshal(buf)?;
        self.details.marshal(self.scheme, buf)
    }
}

impl Unmarshal for TpmtRsaScheme {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        let scheme = TpmAlgId::unmarshal(buf)?;
        Ok(Self {
            scheme,
            details: TpmuAsymScheme::unmarshal(scheme, buf)?,
        })
    }
}

/// TPMT_ECC_SCHEME - ECC scheme selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmtEccScheme {
    pub scheme: TpmAlgId,
    pub details: TpmuSigScheme,
}

impl TpmtEccScheme {
    pub fn null() -> Self {
        Self {
            scheme: TpmAlgId::Null,
            details: TpmuSigScheme::Null,
        }
    }

    pub fn ecdsa(hash_alg: TpmAlgId) -> Self {
        Self {
            scheme: TpmAlgId::EcDsa,
            details: TpmuSigScheme::SigHash(TpmsSchemeSigHash { hash_alg }),
        }
    }
}

impl Marshal for TpmtEccScheme {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.scheme.marshal(buf)?;
        self.details.marshal(self.scheme, buf)
    }
}

impl Unmarshal for TpmtEccScheme {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        let scheme = TpmAlgId::unmarshal(buf)?;
        Ok(Self {
            scheme,
            details: TpmuSigScheme::unmarshal(scheme, buf)?,
        })
    }
}

/// TPMU_KDF_SCHEME - key-derivation scheme details
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmuKdfScheme {
    Kdf(TpmsSchemeSigHash),
    Null,
}

impl TpmuKdfScheme {
    fn wants_hash(selector: TpmAlgId) -> bool {
        matches!(
            selector,
            TpmAlgId::Mgf1 | TpmAlgId::Kdf1Sp800_56a | TpmAlgId::Kdf2 | TpmAlgId::Kdf1Sp800_108
        )
    }

    pub fn marshal(&self, selector: TpmAlgId, buf: &mut CommandBuffer) -> TpmResult<()> {
        match self {
            Self::Kdf(scheme) if Self::wants_hash(selector) => scheme.marshal(buf),
            Self::Null if !Self::wants_hash(selector) => Ok(()),
            _ => Err(TpmRc::SELECTOR),
        }
    }

    pub fn unmarshal(selector: TpmAlgId, buf: &mut ResponseBuffer) -> TpmResult<Self> {
        if Self::wants_hash(selector) {
            Ok(Self::Kdf(TpmsSchemeSigHash::unmarshal(buf)?))
        } else {
            Ok(Self::Null)
        }
    }
}

/// TPMT_KDF_SCHEME - key-derivation scheme selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmtKdfScheme {
    pub scheme: TpmAlgId,
    pub details: TpmuKdfScheme,
}

impl TpmtKdfScheme {
    pub fn null() -> Self {
        Self {
            scheme: TpmAlgId::Null,
            details: TpmuKdfScheme::Null,
        }
    }
}

impl Marshal for TpmtKdfScheme {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.scheme.marshal(buf)?;
        self.details.marshal(self.scheme, buf)
    }
}

impl Unmarshal for TpmtKdfScheme {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        let scheme = TpmAlgId::unmarshal(buf)?;
        Ok(Self {
            scheme,
            details: TpmuKdfScheme::unmarshal(scheme, buf)?,
        })
    }
}

/// TPMU_SCHEME_KEYEDHASH - keyed-hash object scheme details
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmuSchemeKeyedHash {
    Hmac(TpmsSchemeHmac),
    Xor(TpmsSchemeXor),
    Null,
}

impl TpmuSchemeKeyedHash {
    pub fn marshal(&self, selector: TpmAlgId, buf: &mut CommandBuffer) -> TpmResult<()> {
        match (selector, self) {
            (TpmAlgId::Hmac, Self::Hmac(scheme)) => scheme.marshal(buf),
            (TpmAlgId::Xor, Self::Xor(scheme)) => scheme.marshal(buf),
            (TpmAlgId::Hmac | TpmAlgId::Xor, _) => Err(TpmRc::SELECTOR),
            (_, Self::Null) => Ok(()),
            _ => Err(TpmRc::SELECTOR),
        }
    }

    pub fn unmarshal(selector: TpmAlgId, buf: &mut ResponseBuffer) -> TpmResult<Self> {
        match selector {
            TpmAlgId::Hmac => Ok(Self::Hmac(TpmsSchemeHmac::unmarshal(buf)?)),
            TpmAlgId::Xor => Ok(Self::Xor(TpmsSchemeXor::unmarshal(buf)?)),
            _ => Ok(Self::Null),
        }
    }
}

/// TPMT_KEYEDHASH_SCHEME - keyed-hash scheme selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmtKeyedHashScheme {
    pub scheme: TpmAlgId,
    pub details: TpmuSchemeKeyedHash,
}

impl TpmtKeyedHashScheme {
    pub fn null() -> Self {
        Self {
            scheme: TpmAlgId::Null,
            details: TpmuSchemeKeyedHash::Null,
        }
    }

    pub fn hmac(hash_alg: TpmAlgId) -> Self {
        Self {
            scheme: TpmAlgId::Hmac,
            details: TpmuSchemeKeyedHash::Hmac(TpmsSchemeHmac { hash_alg }),
        }
    }
}

impl Marshal for TpmtKeyedHashScheme {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.scheme.marshal(buf)?;
        self.details.marshal(self.scheme, buf)
    }
}

impl Unmarshal for TpmtKeyedHashScheme {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        let scheme = TpmAlgId::unmarshal(buf)?;
        Ok(Self {
            scheme,
            details: TpmuSchemeKeyedHash::unmarshal(scheme, buf)?,
        })
    }
}

// ==================== Public area ====================

/// TPMS_KEYEDHASH_PARMS - parameters of a keyed-hash object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsKeyedHashParms {
    pub scheme: TpmtKeyedHashScheme,
}

impl TpmsKeyedHashParms {
    pub fn null() -> Self {
        Self {
            scheme: TpmtKeyedHashScheme::null(),
        }
    }
}

impl Marshal for TpmsKeyedHashParms {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.scheme.marshal(buf)
    }
}

impl Unmarshal for TpmsKeyedHashParms {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            scheme: TpmtKeyedHashScheme::unmarshal(buf)?,
        })
    }
}

/// TPMS_RSA_PARMS - parameters of an RSA key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsRsaParms {
    pub symmetric: TpmtSymDefObject,
    pub scheme: TpmtRsaScheme,
    pub key_bits: u16,
    pub exponent: u32,
}

impl TpmsRsaParms {
    /// A 2048-bit restricted decryption key with AES-128-CFB protection,
    /// the conventional storage-root-key shape.
    pub fn storage_key() -> Self {
        Self {
            symmetric: TpmtSymDef::aes_128_cfb(),
            scheme: TpmtRsaScheme::null(),
            key_bits: 2048,
            exponent: 0,
        }
    }
}

impl Marshal for TpmsRsaParms {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.symmetric.marshal(buf)?;
        self.scheme.marshal(buf)?;
        buf.put_u16(self.key_bits);
        buf.put_u32(self.exponent);
        Ok(())
    }
}

impl Unmarshal for TpmsRsaParms {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            symmetric: TpmtSymDefObject::unmarshal(buf)?,
            scheme: TpmtRsaScheme::unmarshal(buf)?,
            key_bits: buf.get_u16()?,
            exponent: buf.get_u32()?,
        })
    }
}

/// TPMS_ECC_PARMS - parameters of an ECC key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsEccParms {
    pub symmetric: TpmtSymDefObject,
    pub scheme: TpmtEccScheme,
    pub curve_id: TpmEccCurve,
    pub kdf: TpmtKdfScheme,
}

impl Marshal for TpmsEccParms {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.symmetric.marshal(buf)?;
        self.scheme.marshal(buf)?;
        self.curve_id.marshal(buf)?;
        self.kdf.marshal(buf)
    }
}

impl Unmarshal for TpmsEccParms {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            symmetric: TpmtSymDefObject::unmarshal(buf)?,
            scheme: TpmtEccScheme::unmarshal(buf)?,
            curve_id: TpmEccCurve::unmarshal(buf)?,
            kdf: TpmtKdfScheme::unmarshal(buf)?,
        })
    }
}

/// TPMU_PUBLIC_PARMS - key parameters selected by the object type
#[derive(Debug, Clone, PartialEq)]
pub enum TpmuPublicParms {
    KeyedHash(TpmsKeyedHashParms),
    SymCipher(TpmsSymcipherParms),
    Rsa(TpmsRsaParms),
    Ecc(TpmsEccParms),
    Empty,
}

impl TpmuPublicParms {
    pub fn marshal(&self, selector: TpmAlgId, buf: &mut CommandBuffer) -> TpmResult<()> {
        match (selector, self) {
            (TpmAlgId::KeyedHash, Self::KeyedHash(parms)) => parms.marshal(buf),
            (TpmAlgId::SymCipher, Self::SymCipher(parms)) => parms.marshal(buf),
            (TpmAlgId::Rsa, Self::Rsa(parms)) => parms.marshal(buf),
            (TpmAlgId::Ecc, Self::Ecc(parms)) => parms.marshal(buf),
            (
                TpmAlgId::KeyedHash | TpmAlgId::SymCipher | TpmAlgId::Rsa | TpmAlgId::Ecc,
                _,
            ) => Err(TpmRc::SELECTOR),
            (_, Self::Empty) => Ok(()),
            _ => Err(TpmRc::SELECTOR),
        }
    }

    pub fn unmarshal(selector: TpmAlgId, buf: &mut ResponseBuffer) -> TpmResult<Self> {
        match selector {
            TpmAlgId::KeyedHash => Ok(Self::KeyedHash(TpmsKeyedHashParms::unmarshal(buf)?)),
            TpmAlgId::SymCipher => Ok(Self::SymCipher(TpmsSymcipherParms::unmarshal(buf)?)),
            TpmAlgId::Rsa => Ok(Self::Rsa(TpmsRsaParms::unmarshal(buf)?)),
            TpmAlgId::Ecc => Ok(Self::Ecc(TpmsEccParms::unmarshal(buf)?)),
            _ => Ok(Self::Empty),
        }
    }
}

/// TPMS_ECC_POINT - an ECC point as two coordinate buffers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TpmsEccPoint {
    pub x: Tpm2bEccParameter,
    pub y: Tpm2bEccParameter,
}

impl Marshal for TpmsEccPoint {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.x.marshal(buf)?;
        self.y.marshal(buf)
    }
}

impl Unmarshal for TpmsEccPoint {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            x: Tpm2bEccParameter::unmarshal(buf)?,
            y: Tpm2bEccParameter::unmarshal(buf)?,
        })
    }
}

/// TPMU_PUBLIC_ID - unique identifier selected by the object type
#[derive(Debug, Clone, PartialEq)]
pub enum TpmuPublicId {
    KeyedHash(Tpm2bDigest),
    Sym(Tpm2bDigest),
    Rsa(Tpm2bPublicKeyRsa),
    Ecc(TpmsEccPoint),
    Empty,
}

impl TpmuPublicId {
    pub fn marshal(&self, selector: TpmAlgId, buf: &mut CommandBuffer) -> TpmResult<()> {
        match (selector, self) {
            (TpmAlgId::KeyedHash, Self::KeyedHash(digest)) => digest.marshal(buf),
            (TpmAlgId::SymCipher, Self::Sym(digest)) => digest.marshal(buf),
            (TpmAlgId::Rsa, Self::Rsa(key)) => key.marshal(buf),
            (TpmAlgId::Ecc, Self::Ecc(point)) => point.marshal(buf),
            (
                TpmAlgId::KeyedHash | TpmAlgId::SymCipher | TpmAlgId::Rsa | TpmAlgId::Ecc,
                _,
            ) => Err(TpmRc::SELECTOR),
            (_, Self::Empty) => Ok(()),
            _ => Err(TpmRc::SELECTOR),
        }
    }

    pub fn unmarshal(selector: TpmAlgId, buf: &mut ResponseBuffer) -> TpmResult<Self> {
        match selector {
            TpmAlgId::KeyedHash => Ok(Self::KeyedHash(Tpm2bDigest::unmarshal(buf)?)),
            TpmAlgId::SymCipher => Ok(Self::Sym(Tpm2bDigest::unmarshal(buf)?)),
            TpmAlgId::Rsa => Ok(Self::Rsa(Tpm2bPublicKeyRsa::unmarshal(buf)?)),
            TpmAlgId::Ecc => Ok(Self::Ecc(TpmsEccPoint::unmarshal(buf)?)),
            _ => Ok(Self::Empty),
        }
    }
}

/// TPMT_PUBLIC - the public area of an object
#[derive(Debug, Clone, PartialEq)]
pub struct TpmtPublic {
    pub type_alg: TpmAlgId,
    pub name_alg: TpmAlgId,
    pub object_attributes: TpmaObject,
    pub auth_policy: Tpm2bDigest,
    pub parameters: TpmuPublicParms,
    pub unique: TpmuPublicId,
}

impl TpmtPublic {
    /// RSA storage key template (SRK shape).
    pub fn rsa_storage_key() -> Self {
        Self {
            type_alg: TpmAlgId::Rsa,
            name_alg: TpmAlgId::Sha256,
            object_attributes: TpmaObject::new()
                .with_fixed_tpm()
                .with_fixed_parent()
                .with_sensitive_data_origin()
                .with_user_with_auth()
                .with_restricted()
                .with_decrypt(),
            auth_policy: Tpm2bDigest::empty(),
            parameters: TpmuPublicParms::Rsa(TpmsRsaParms::storage_key()),
            unique: TpmuPublicId::Rsa(Tpm2bPublicKeyRsa::empty()),
        }
    }

    /// P-256 ECDSA signing key template.
    pub fn ecc_signing_key() -> Self {
        Self {
            type_alg: TpmAlgId::Ecc,
            name_alg: TpmAlgId::Sha256,
            object_attributes: TpmaObject::new()
                .with_fixed_tpm()
                .with_fixed_parent()
                .with_sensitive_data_origin()
                .with_user_with_auth()
                .with_sign_encrypt(),
            auth_policy: Tpm2bDigest::empty(),
            parameters: TpmuPublicParms::Ecc(TpmsEccParms {
                symmetric: TpmtSymDef::null(),
                scheme: TpmtEccScheme::ecdsa(TpmAlgId::Sha256),
                curve_id: TpmEccCurve::NistP256,
                kdf: TpmtKdfScheme::null(),
            }),
            unique: TpmuPublicId::Ecc(TpmsEccPoint::default()),
        }
    }

    /// Sealed data object template. An empty policy digest selects plain
    /// password authorization; a non-empty one requires the policy.
    pub fn sealed_object(policy_digest: Tpm2bDigest) -> Self {
        let object_attributes = if policy_digest.buffer.is_empty() {
            TpmaObject::new()
                .with_fixed_tpm()
                .with_fixed_parent()
                .with_user_with_auth()
        } else {
            TpmaObject::new()
                .with_fixed_tpm()
                .with_fixed_parent()
                .with_admin_with_policy()
        };

        Self {
            type_alg: TpmAlgId::KeyedHash,
            name_alg: TpmAlgId::Sha256,
            object_attributes,
            auth_policy: policy_digest,
            parameters: TpmuPublicParms::KeyedHash(TpmsKeyedHashParms::null()),
            unique: TpmuPublicId::KeyedHash(Tpm2bDigest::empty()),
        }
    }
}

impl Marshal for TpmtPublic {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.type_alg.marshal(buf)?;
        self.name_alg.marshal(buf)?;
        buf.put_u32(self.object_attributes.0);
        self.auth_policy.marshal(buf)?;
        self.parameters.marshal(self.type_alg, buf)?;
        self.unique.marshal(self.type_alg, buf)
    }
}

impl Unmarshal for TpmtPublic {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        let type_alg = TpmAlgId::unmarshal(buf)?;
        let name_alg = TpmAlgId::unmarshal(buf)?;
        let object_attributes = TpmaObject(buf.get_u32()?);
        let auth_policy = Tpm2bDigest::unmarshal(buf)?;
        let parameters = TpmuPublicParms::unmarshal(type_alg, buf)?;
        let unique = TpmuPublicId::unmarshal(type_alg, buf)?;
        Ok(Self {
            type_alg,
            name_alg,
            object_attributes,
            auth_policy,
            parameters,
            unique,
        })
    }
}

// ==================== Nested TPM2B wrappers ====================

/// Defines a TPM2B type wrapping a nested structure. A zero size on the
/// wire means the inner structure is absent; otherwise the inner parser
/// must consume exactly the declared size.
macro_rules! tpm2b_struct {
    ($(#[$attr:meta])* $name:ident, $field:ident: $inner:ty) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Default)]
        pub struct $name {
            pub $field: Option<$inner>,
        }

        impl $name {
            pub fn new($field: $inner) -> Self {
                Self { $field: Some($field) }
            }

            pub fn empty() -> Self {
                Self { $field: None }
            }
        }

        impl Marshal for $name {
            fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
                match &self.$field {
                    Some(inner) => {
                        let mut scratch = CommandBuffer::new();
                        inner.marshal(&mut scratch)?;
                        if scratch.len() > u16::MAX as usize {
                            return Err(TpmRc::INSUFFICIENT);
                        }
                        buf.put_tpm2b(scratch.as_bytes());
                    }
                    None => buf.put_u16(0),
                }
                Ok(())
            }
        }

        impl Unmarshal for $name {
            fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
                let size = buf.get_u16()? as usize;
                if size == 0 {
                    return Ok(Self { $field: None });
                }
                let data = buf.get_bytes(size)?;
                let mut inner = ResponseBuffer::new(&data);
                let value = <$inner>::unmarshal(&mut inner)?;
                if inner.remaining() != 0 {
                    return Err(TpmRc::SIZE);
                }
                Ok(Self { $field: Some(value) })
            }
        }
    };
}

tpm2b_struct!(
    /// TPM2B_PUBLIC - size-prefixed public area
    Tpm2bPublic,
    public_area: TpmtPublic
);
tpm2b_struct!(
    /// TPM2B_ECC_POINT - size-prefixed ECC point
    Tpm2bEccPoint,
    point: TpmsEccPoint
);

// ==================== Sensitive creation ====================

/// TPMS_SENSITIVE_CREATE - secret data for object creation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TpmsSensitiveCreate {
    pub user_auth: Tpm2bAuth,
    pub data: Tpm2bSensitiveData,
}

impl Marshal for TpmsSensitiveCreate {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.user_auth.marshal(buf)?;
        self.data.marshal(buf)
    }
}

impl Unmarshal for TpmsSensitiveCreate {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            user_auth: Tpm2bAuth::unmarshal(buf)?,
            data: Tpm2bSensitiveData::unmarshal(buf)?,
        })
    }
}

tpm2b_struct!(
    /// TPM2B_SENSITIVE_CREATE - size-prefixed sensitive creation data
    Tpm2bSensitiveCreate,
    sensitive: TpmsSensitiveCreate
);

impl Tpm2bSensitiveCreate {
    pub fn with_data(data: Vec<u8>) -> Self {
        Self::new(TpmsSensitiveCreate {
            user_auth: Tpm2bAuth::empty(),
            data: Tpm2bSensitiveData::new(data),
        })
    }
}

// ==================== NV public area ====================

/// TPMS_NV_PUBLIC - NV index public area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsNvPublic {
    pub nv_index: TpmHandle,
    pub name_alg: TpmAlgId,
    pub attributes: TpmaNv,
    pub auth_policy: Tpm2bDigest,
    pub data_size: u16,
}

impl TpmsNvPublic {
    pub fn new(nv_index: TpmHandle, data_size: u16, attributes: TpmaNv) -> Self {
        Self {
            nv_index,
            name_alg: TpmAlgId::Sha256,
            attributes,
            auth_policy: Tpm2bDigest::empty(),
            data_size,
        }
    }
}

impl Marshal for TpmsNvPublic {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        buf.put_u32(self.nv_index);
        self.name_alg.marshal(buf)?;
        buf.put_u32(self.attributes.0);
        self.auth_policy.marshal(buf)?;
        buf.put_u16(self.data_size);
        Ok(())
    }
}

impl Unmarshal for TpmsNvPublic {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            nv_index: buf.get_u32()?,
            name_alg: TpmAlgId::unmarshal(buf)?,
            attributes: TpmaNv(buf.get_u32()?),
            auth_policy: Tpm2bDigest::unmarshal(buf)?,
            data_size: buf.get_u16()?,
        })
    }
}

tpm2b_struct!(
    /// TPM2B_NV_PUBLIC - size-prefixed NV public area
    Tpm2bNvPublic,
    nv_public: TpmsNvPublic
);

// ==================== Creation data ====================

/// TPMS_CREATION_DATA - environment captured at object creation
#[derive(Debug, Clone, PartialEq)]
pub struct TpmsCreationData {
    pub pcr_select: TpmlPcrSelection,
    pub pcr_digest: Tpm2bDigest,
    pub locality: u8,
    pub parent_name_alg: TpmAlgId,
    pub parent_name: Tpm2bName,
    pub parent_qualified_name: Tpm2bName,
    pub outside_info: Tpm2bData,
}

impl Marshal for TpmsCreationData {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.pcr_select.marshal(buf)?;
        self.pcr_digest.marshal(buf)?;
        buf.put_u8(self.locality);
        self.parent_name_alg.marshal(buf)?;
        self.parent_name.marshal(buf)?;
        self.parent_qualified_name.marshal(buf)?;
        self.outside_info.marshal(buf)
    }
}

impl Unmarshal for TpmsCreationData {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            pcr_select: TpmlPcrSelection::unmarshal(buf)?,
            pcr_digest: Tpm2bDigest::unmarshal(buf)?,
            locality: buf.get_u8()?,
            parent_name_alg: TpmAlgId::unmarshal(buf)?,
            parent_name: Tpm2bName::unmarshal(buf)?,
            parent_qualified_name: Tpm2bName::unmarshal(buf)?,
            outside_info: Tpm2bData::unmarshal(buf)?,
        })
    }
}

tpm2b_struct!(
    /// TPM2B_CREATION_DATA - size-prefixed creation data
    Tpm2bCreationData,
    creation_data: TpmsCreationData
);

// ==================== Signatures ====================

/// TPMS_SIGNATURE_RSA - RSASSA/RSAPSS signature body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsSignatureRsa {
    pub hash: TpmAlgId,
    pub sig: Tpm2bPublicKeyRsa,
}

impl Marshal for TpmsSignatureRsa {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.hash.marshal(buf)?;
        self.sig.marshal(buf)
    }
}

impl Unmarshal for TpmsSignatureRsa {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            hash: TpmAlgId::unmarshal(buf)?,
            sig: Tpm2bPublicKeyRsa::unmarshal(buf)?,
        })
    }
}

pub type TpmsSignatureRsassa = TpmsSignatureRsa;
pub type TpmsSignatureRsapss = TpmsSignatureRsa;

/// TPMS_SIGNATURE_ECDSA - ECDSA-family signature body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsSignatureEcdsa {
    pub hash: TpmAlgId,
    pub signature_r: Tpm2bEccParameter,
    pub signature_s: Tpm2bEccParameter,
}

impl Marshal for TpmsSignatureEcdsa {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.hash.marshal(buf)?;
        self.signature_r.marshal(buf)?;
        self.signature_s.marshal(buf)
    }
}

impl Unmarshal for TpmsSignatureEcdsa {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            hash: TpmAlgId::unmarshal(buf)?,
            signature_r: Tpm2bEccParameter::unmarshal(buf)?,
            signature_s: Tpm2bEccParameter::unmarshal(buf)?,
        })
    }
}

/// TPMU_SIGNATURE - signature body selected by the signing algorithm
#[derive(Debug, Clone, PartialEq)]
pub enum TpmuSignature {
    Rsa(TpmsSignatureRsa),
    Ecdsa(TpmsSignatureEcdsa),
    Hmac(TpmtHa),
    Null,
}

impl TpmuSignature {
    pub fn marshal(&self, selector: TpmAlgId, buf: &mut CommandBuffer) -> TpmResult<()> {
        match (selector, self) {
            (TpmAlgId::RsaSsa | TpmAlgId::RsaPss, Self::Rsa(sig)) => sig.marshal(buf),
            (
                TpmAlgId::EcDsa | TpmAlgId::Sm2 | TpmAlgId::EcDaa | TpmAlgId::EcSchnorr,
                Self::Ecdsa(sig),
            ) => sig.marshal(buf),
            (TpmAlgId::Hmac, Self::Hmac(digest)) => digest.marshal(buf),
            (
                TpmAlgId::RsaSsa
                | TpmAlgId::RsaPss
                | TpmAlgId::EcDsa
                | TpmAlgId::Sm2
                | TpmAlgId::EcDaa
                | TpmAlgId::EcSchnorr
                | TpmAlgId::Hmac,
                _,
            ) => Err(TpmRc::SELECTOR),
            (_, Self::Null) => Ok(()),
            _ => Err(TpmRc::SELECTOR),
        }
    }

    pub fn unmarshal(selector: TpmAlgId, buf: &mut ResponseBuffer) -> TpmResult<Self> {
        match selector {
            TpmAlgId::RsaSsa | TpmAlgId::RsaPss => {
                Ok(Self::Rsa(TpmsSignatureRsa::unmarshal(buf)?))
            }
            TpmAlgId::EcDsa | TpmAlgId::Sm2 | TpmAlgId::EcDaa | TpmAlgId::EcSchnorr => {
                Ok(Self::Ecdsa(TpmsSignatureEcdsa::unmarshal(buf)?))
            }
            TpmAlgId::Hmac => Ok(Self::Hmac(TpmtHa::unmarshal(buf)?)),
            _ => Ok(Self::Null),
        }
    }
}

/// TPMT_SIGNATURE - signature tagged with its algorithm
#[derive(Debug, Clone, PartialEq)]
pub struct TpmtSignature {
    pub sig_alg: TpmAlgId,
    pub signature: TpmuSignature,
}

impl TpmtSignature {
    pub fn null() -> Self {
        Self {
            sig_alg: TpmAlgId::Null,
            signature: TpmuSignature::Null,
        }
    }
}

impl Marshal for TpmtSignature {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.sig_alg.marshal(buf)?;
        self.signature.marshal(self.sig_alg, buf)
    }
}

impl Unmarshal for TpmtSignature {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        let sig_alg = TpmAlgId::unmarshal(buf)?;
        Ok(Self {
            sig_alg,
            signature: TpmuSignature::unmarshal(sig_alg, buf)?,
        })
    }
}

// ==================== Clock and attestation ====================

/// TPMS_CLOCK_INFO - clock, reset and restart state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TpmsClockInfo {
    pub clock: u64,
    pub reset_count: u32,
    pub restart_count: u32,
    pub safe: u8,
}

impl Marshal for TpmsClockInfo {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        buf.put_u64(self.clock);
        buf.put_u32(self.reset_count);
        buf.put_u32(self.restart_count);
        buf.put_u8(self.safe);
        Ok(())
    }
}

impl Unmarshal for TpmsClockInfo {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            clock: buf.get_u64()?,
            reset_count: buf.get_u32()?,
            restart_count: buf.get_u32()?,
            safe: buf.get_u8()?,
        })
    }
}

/// TPMS_TIME_INFO - current time and clock state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TpmsTimeInfo {
    pub time: u64,
    pub clock_info: TpmsClockInfo,
}

impl Marshal for TpmsTimeInfo {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        buf.put_u64(self.time);
        self.clock_info.marshal(buf)
    }
}

impl Unmarshal for TpmsTimeInfo {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            time: buf.get_u64()?,
            clock_info: TpmsClockInfo::unmarshal(buf)?,
        })
    }
}

/// TPMS_CERTIFY_INFO - attested names from Certify
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TpmsCertifyInfo {
    pub name: Tpm2bName,
    pub qualified_name: Tpm2bName,
}

impl Marshal for TpmsCertifyInfo {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.name.marshal(buf)?;
        self.qualified_name.marshal(buf)
    }
}

impl Unmarshal for TpmsCertifyInfo {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            name: Tpm2bName::unmarshal(buf)?,
            qualified_name: Tpm2bName::unmarshal(buf)?,
        })
    }
}

/// TPMS_QUOTE_INFO - attested PCR state from Quote
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TpmsQuoteInfo {
    pub pcr_select: TpmlPcrSelection,
    pub pcr_digest: Tpm2bDigest,
}

impl Marshal for TpmsQuoteInfo {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.pcr_select.marshal(buf)?;
        self.pcr_digest.marshal(buf)
    }
}

impl Unmarshal for TpmsQuoteInfo {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            pcr_select: TpmlPcrSelection::unmarshal(buf)?,
            pcr_digest: Tpm2bDigest::unmarshal(buf)?,
        })
    }
}

/// TPMS_CREATION_INFO - attested creation binding from CertifyCreation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TpmsCreationInfo {
    pub object_name: Tpm2bName,
    pub creation_hash: Tpm2bDigest,
}

impl Marshal for TpmsCreationInfo {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.object_name.marshal(buf)?;
        self.creation_hash.marshal(buf)
    }
}

impl Unmarshal for TpmsCreationInfo {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            object_name: Tpm2bName::unmarshal(buf)?,
            creation_hash: Tpm2bDigest::unmarshal(buf)?,
        })
    }
}

/// TPMS_COMMAND_AUDIT_INFO - attested command audit digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsCommandAuditInfo {
    pub audit_counter: u64,
    pub digest_alg: TpmAlgId,
    pub audit_digest: Tpm2bDigest,
    pub command_digest: Tpm2bDigest,
}

impl Marshal for TpmsCommandAuditInfo {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        buf.put_u64(self.audit_counter);
        self.digest_alg.marshal(buf)?;
        self.audit_digest.marshal(buf)?;
        self.command_digest.marshal(buf)
    }
}

impl Unmarshal for TpmsCommandAuditInfo {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            audit_counter: buf.get_u64()?,
            digest_alg: TpmAlgId::unmarshal(buf)?,
            audit_digest: Tpm2bDigest::unmarshal(buf)?,
            command_digest: Tpm2bDigest::unmarshal(buf)?,
        })
    }
}

/// TPMS_SESSION_AUDIT_INFO - attested session audit digest
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TpmsSessionAuditInfo {
    pub exclusive_session: u8,
    pub session_digest: Tpm2bDigest,
}

impl Marshal for TpmsSessionAuditInfo {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        buf.put_u8(self.exclusive_session);
        self.session_digest.marshal(buf)
    }
}

impl Unmarshal for TpmsSessionAuditInfo {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            exclusive_session: buf.get_u8()?,
            session_digest: Tpm2bDigest::unmarshal(buf)?,
        })
    }
}

/// TPMS_TIME_ATTEST_INFO - attested time from GetTime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TpmsTimeAttestInfo {
    pub time: TpmsTimeInfo,
    pub firmware_version: u64,
}

impl Marshal for TpmsTimeAttestInfo {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.time.marshal(buf)?;
        buf.put_u64(self.firmware_version);
        Ok(())
    }
}

impl Unmarshal for TpmsTimeAttestInfo {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            time: TpmsTimeInfo::unmarshal(buf)?,
            firmware_version: buf.get_u64()?,
        })
    }
}

/// TPMS_NV_CERTIFY_INFO - attested NV contents from NV_Certify
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TpmsNvCertifyInfo {
    pub index_name: Tpm2bName,
    pub offset: u16,
    pub nv_contents: Tpm2bMaxNvBuffer,
}

impl Marshal for TpmsNvCertifyInfo {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.index_name.marshal(buf)?;
        buf.put_u16(self.offset);
        self.nv_contents.marshal(buf)
    }
}

impl Unmarshal for TpmsNvCertifyInfo {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            index_name: Tpm2bName::unmarshal(buf)?,
            offset: buf.get_u16()?,
            nv_contents: Tpm2bMaxNvBuffer::unmarshal(buf)?,
        })
    }
}

/// TPMU_ATTEST - attested body selected by the attestation tag
#[derive(Debug, Clone, PartialEq)]
pub enum TpmuAttest {
    Certify(TpmsCertifyInfo),
    Creation(TpmsCreationInfo),
    Quote(TpmsQuoteInfo),
    CommandAudit(TpmsCommandAuditInfo),
    SessionAudit(TpmsSessionAuditInfo),
    Time(TpmsTimeAttestInfo),
    Nv(TpmsNvCertifyInfo),
    Empty,
}

impl TpmuAttest {
    pub fn marshal(&self, selector: TpmSt, buf: &mut CommandBuffer) -> TpmResult<()> {
        match (selector, self) {
            (TpmSt::AttestCertify, Self::Certify(info)) => info.marshal(buf),
            (TpmSt::AttestCreation, Self::Creation(info)) => info.marshal(buf),
            (TpmSt::AttestQuote, Self::Quote(info)) => info.marshal(buf),
            (TpmSt::AttestCommandAudit, Self::CommandAudit(info)) => info.marshal(buf),
            (TpmSt::AttestSessionAudit, Self::SessionAudit(info)) => info.marshal(buf),
            (TpmSt::AttestTime, Self::Time(info)) => info.marshal(buf),
            (TpmSt::AttestNv, Self::Nv(info)) => info.marshal(buf),
            (
                TpmSt::AttestCertify
                | TpmSt::AttestCreation
                | TpmSt::AttestQuote
                | TpmSt::AttestCommandAudit
                | TpmSt::AttestSessionAudit
                | TpmSt::AttestTime
                | TpmSt::AttestNv,
                _,
            ) => Err(TpmRc::SELECTOR),
            (_, Self::Empty) => Ok(()),
            _ => Err(TpmRc::SELECTOR),
        }
    }

    pub fn unmarshal(selector: TpmSt, buf: &mut ResponseBuffer) -> TpmResult<Self> {
        match selector {
            TpmSt::AttestCertify => Ok(Self::Certify(TpmsCertifyInfo::unmarshal(buf)?)),
            TpmSt::AttestCreation => Ok(Self::Creation(TpmsCreationInfo::unmarshal(buf)?)),
            TpmSt::AttestQuote => Ok(Self::Quote(TpmsQuoteInfo::unmarshal(buf)?)),
            TpmSt::AttestCommandAudit => {
                Ok(Self::CommandAudit(TpmsCommandAuditInfo::unmarshal(buf)?))
            }
            TpmSt::AttestSessionAudit => {
                Ok(Self::SessionAudit(TpmsSessionAuditInfo::unmarshal(buf)?))
            }
            TpmSt::AttestTime => Ok(Self::Time(TpmsTimeAttestInfo::unmarshal(buf)?)),
            TpmSt::AttestNv => Ok(Self::Nv(TpmsNvCertifyInfo::unmarshal(buf)?)),
            _ => Ok(Self::Empty),
        }
    }
}

/// TPMS_ATTEST - the structure signed by attestation commands
#[derive(Debug, Clone, PartialEq)]
pub struct TpmsAttest {
    pub magic: u32,
    pub attest_type: TpmSt,
    pub qualified_signer: Tpm2bName,
    pub extra_data: Tpm2bData,
    pub clock_info: TpmsClockInfo,
    pub firmware_version: u64,
    pub attested: TpmuAttest,
}

impl Marshal for TpmsAttest {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        buf.put_u32(self.magic);
        self.attest_type.marshal(buf)?;
        self.qualified_signer.marshal(buf)?;
        self.extra_data.marshal(buf)?;
        self.clock_info.marshal(buf)?;
        buf.put_u64(self.firmware_version);
        self.attested.marshal(self.attest_type, buf)
    }
}

impl Unmarshal for TpmsAttest {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        let magic = buf.get_u32()?;
        let attest_type = TpmSt::unmarshal(buf)?;
        Ok(Self {
            magic,
            attest_type,
            qualified_signer: Tpm2bName::unmarshal(buf)?,
            extra_data: Tpm2bData::unmarshal(buf)?,
            clock_info: TpmsClockInfo::unmarshal(buf)?,
            firmware_version: buf.get_u64()?,
            attested: TpmuAttest::unmarshal(attest_type, buf)?,
        })
    }
}

// ==================== Capabilities ====================

/// TPMS_ALG_PROPERTY - algorithm with its attribute word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsAlgProperty {
    pub alg: TpmAlgId,
    pub alg_properties: u32,
}

impl Marshal for TpmsAlgProperty {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.alg.marshal(buf)?;
        buf.put_u32(self.alg_properties);
        Ok(())
    }
}

impl Unmarshal for TpmsAlgProperty {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            alg: TpmAlgId::unmarshal(buf)?,
            alg_properties: buf.get_u32()?,
        })
    }
}

/// TPMS_TAGGED_PROPERTY - property identifier with its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsTaggedProperty {
    pub property: u32,
    pub value: u32,
}

impl Marshal for TpmsTaggedProperty {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        buf.put_u32(self.property);
        buf.put_u32(self.value);
        Ok(())
    }
}

impl Unmarshal for TpmsTaggedProperty {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            property: buf.get_u32()?,
            value: buf.get_u32()?,
        })
    }
}

/// TPMS_TAGGED_PCR_SELECT - PCR property with its bitmap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsTaggedPcrSelect {
    pub tag: u32,
    pub pcr_select: Vec<u8>,
}

impl Marshal for TpmsTaggedPcrSelect {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        if self.pcr_select.len() > PCR_SELECT_MAX {
            return Err(TpmRc::INSUFFICIENT);
        }
        buf.put_u32(self.tag);
        buf.put_u8(self.pcr_select.len() as u8);
        buf.put_bytes(&self.pcr_select);
        Ok(())
    }
}

impl Unmarshal for TpmsTaggedPcrSelect {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        let tag = buf.get_u32()?;
        let size = buf.get_u8()? as usize;
        if size > PCR_SELECT_MAX {
            return Err(TpmRc::INSUFFICIENT);
        }
        Ok(Self {
            tag,
            pcr_select: buf.get_bytes(size)?,
        })
    }
}

tpml!(
    /// TPML_ALG_PROPERTY - algorithm capability listing
    TpmlAlgProperty,
    alg_properties: TpmsAlgProperty,
    MAX_CAP_ALGS
);
tpml!(
    /// TPML_TAGGED_TPM_PROPERTY - TPM property capability listing
    TpmlTaggedTpmProperty,
    tpm_property: TpmsTaggedProperty,
    MAX_TPM_PROPERTIES
);
tpml!(
    /// TPML_TAGGED_PCR_PROPERTY - PCR property capability listing
    TpmlTaggedPcrProperty,
    pcr_property: TpmsTaggedPcrSelect,
    MAX_PCR_PROPERTIES
);

/// TPMU_CAPABILITIES - capability payload selected by the category
#[derive(Debug, Clone, PartialEq)]
pub enum TpmuCapabilities {
    Algorithms(TpmlAlgProperty),
    Handles(TpmlHandle),
    Commands(TpmlCca),
    PpCommands(TpmlCc),
    AuditCommands(TpmlCc),
    AssignedPcr(TpmlPcrSelection),
    TpmProperties(TpmlTaggedTpmProperty),
    PcrProperties(TpmlTaggedPcrProperty),
    EccCurves(TpmlEccCurve),
}

impl TpmuCapabilities {
    pub fn marshal(&self, selector: TpmCap, buf: &mut CommandBuffer) -> TpmResult<()> {
        match (selector, self) {
            (TpmCap::Algs, Self::Algorithms(list)) => list.marshal(buf),
            (TpmCap::Handles, Self::Handles(list)) => list.marshal(buf),
            (TpmCap::Commands, Self::Commands(list)) => list.marshal(buf),
            (TpmCap::PpCommands, Self::PpCommands(list)) => list.marshal(buf),
            (TpmCap::AuditCommands, Self::AuditCommands(list)) => list.marshal(buf),
            (TpmCap::Pcrs, Self::AssignedPcr(list)) => list.marshal(buf),
            (TpmCap::TpmProperties, Self::TpmProperties(list)) => list.marshal(buf),
            (TpmCap::PcrProperties, Self::PcrProperties(list)) => list.marshal(buf),
            (TpmCap::EccCurves, Self::EccCurves(list)) => list.marshal(buf),
            _ => Err(TpmRc::SELECTOR),
        }
    }

    pub fn unmarshal(selector: TpmCap, buf: &mut ResponseBuffer) -> TpmResult<Self> {
        match selector {
            TpmCap::Algs => Ok(Self::Algorithms(TpmlAlgProperty::unmarshal(buf)?)),
            TpmCap::Handles => Ok(Self::Handles(TpmlHandle::unmarshal(buf)?)),
            TpmCap::Commands => Ok(Self::Commands(TpmlCca::unmarshal(buf)?)),
            TpmCap::PpCommands => Ok(Self::PpCommands(TpmlCc::unmarshal(buf)?)),
            TpmCap::AuditCommands => Ok(Self::AuditCommands(TpmlCc::unmarshal(buf)?)),
            TpmCap::Pcrs => Ok(Self::AssignedPcr(TpmlPcrSelection::unmarshal(buf)?)),
            TpmCap::TpmProperties => Ok(Self::TpmProperties(TpmlTaggedTpmProperty::unmarshal(buf)?)),
            TpmCap::PcrProperties => Ok(Self::PcrProperties(TpmlTaggedPcrProperty::unmarshal(buf)?)),
            TpmCap::EccCurves => Ok(Self::EccCurves(TpmlEccCurve::unmarshal(buf)?)),
        }
    }
}

/// TPMS_CAPABILITY_DATA - capability category with its payload
#[derive(Debug, Clone, PartialEq)]
pub struct TpmsCapabilityData {
    pub capability: TpmCap,
    pub data: TpmuCapabilities,
}

impl Marshal for TpmsCapabilityData {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        self.capability.marshal(buf)?;
        self.data.marshal(self.capability, buf)
    }
}

impl Unmarshal for TpmsCapabilityData {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        let capability = TpmCap::unmarshal(buf)?;
        Ok(Self {
            capability,
            data: TpmuCapabilities::unmarshal(capability, buf)?,
        })
    }
}

// ==================== Saved contexts ====================

/// TPMS_CONTEXT - a saved session or object context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsContext {
    pub sequence: u64,
    pub saved_handle: TpmHandle,
    pub hierarchy: TpmHandle,
    pub context_blob: Tpm2bContextData,
}

impl Marshal for TpmsContext {
    fn marshal(&self, buf: &mut CommandBuffer) -> TpmResult<()> {
        buf.put_u64(self.sequence);
        buf.put_u32(self.saved_handle);
        buf.put_u32(self.hierarchy);
        self.context_blob.marshal(buf)
    }
}

impl Unmarshal for TpmsContext {
    fn unmarshal(buf: &mut ResponseBuffer) -> TpmResult<Self> {
        Ok(Self {
            sequence: buf.get_u64()?,
            saved_handle: buf.get_u32()?,
            hierarchy: buf.get_u32()?,
            context_blob: Tpm2bContextData::unmarshal(buf)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: Marshal + Unmarshal + PartialEq + std::fmt::Debug>(value: &T) {
        let bytes = value.to_bytes().unwrap();
        let mut buf = ResponseBuffer::new(&bytes);
        let parsed = T::unmarshal(&mut buf).unwrap();
        assert_eq!(&parsed, value);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn tpm2b_digest_round_trip() {
        round_trip(&Tpm2bDigest::new(vec![0xAB; 32]));
        round_trip(&Tpm2bDigest::empty());
    }

    #[test]
    fn tpm2b_empty_is_two_zero_bytes() {
        assert_eq!(Tpm2bDigest::empty().to_bytes().unwrap(), [0x00, 0x00]);
        assert_eq!(Tpm2bPublic::empty().to_bytes().unwrap(), [0x00, 0x00]);
        assert_eq!(
            Tpm2bCreationData::empty().to_bytes().unwrap(),
            [0x00, 0x00]
        );
        // Parsing the two zero bytes yields a logically-empty value.
        assert_eq!(
            Tpm2bCreationData::from_bytes(&[0x00, 0x00]).unwrap(),
            Tpm2bCreationData::empty()
        );
    }

    #[test]
    fn tpm2b_serialize_capacity_overflow() {
        let oversized = Tpm2bMaxBuffer::new(vec![0u8; Tpm2bMaxBuffer::CAPACITY + 1]);
        assert_eq!(oversized.to_bytes(), Err(TpmRc::INSUFFICIENT));
    }

    #[test]
    fn tpm2b_parse_capacity_overflow() {
        // Declared size 0x1000 exceeds the destination capacity; the
        // oversized content must not be consumed.
        let mut malformed = vec![0x10, 0x00];
        malformed.extend_from_slice(&[b'A'; 0x1000]);
        assert_eq!(
            Tpm2bMaxBuffer::from_bytes(&malformed),
            Err(TpmRc::INSUFFICIENT)
        );

        // Declared size 1 with no content.
        assert_eq!(
            Tpm2bMaxBuffer::from_bytes(&[0x00, 0x01]),
            Err(TpmRc::INSUFFICIENT)
        );
    }

    #[test]
    fn creation_data_fixture() {
        // The populated TPM2B_CREATION_DATA fixture serializes to 35 bytes:
        // 2-byte size plus a 33-byte TPMS_CREATION_DATA.
        let data = Tpm2bCreationData::new(TpmsCreationData {
            pcr_select: TpmlPcrSelection {
                pcr_selections: vec![TpmsPcrSelection {
                    hash: TpmAlgId::Sha256,
                    pcr_select: vec![0x00],
                }],
            },
            pcr_digest: Tpm2bDigest::new(vec![0x00, 0x00]),
            locality: 0,
            parent_name_alg: TpmAlgId::Sha256,
            parent_name: Tpm2bName::new(vec![0x00; 3]),
            parent_qualified_name: Tpm2bName::new(vec![0x00; 4]),
            outside_info: Tpm2bData::new(vec![0x00; 5]),
        });
        let bytes = data.to_bytes().unwrap();
        assert_eq!(bytes.len(), 35);
        assert_eq!(&bytes[..2], [0x00, 33]);
        round_trip(&data);
    }

    #[test]
    fn nested_tpm2b_size_must_match_content() {
        // TPM2B_NV_PUBLIC whose declared size is one byte longer than the
        // inner structure actually is.
        let nv_public = TpmsNvPublic::new(0x01800100, 16, TpmaNv::new().with_owner_read());
        let inner = nv_public.to_bytes().unwrap();
        let mut wire = Vec::new();
        wire.extend_from_slice(&((inner.len() + 1) as u16).to_be_bytes());
        wire.extend_from_slice(&inner);
        wire.push(0x00);
        assert_eq!(Tpm2bNvPublic::from_bytes(&wire), Err(TpmRc::SIZE));
    }

    #[test]
    fn sym_def_variants() {
        round_trip(&TpmtSymDef::null());
        round_trip(&TpmtSymDef::aes_128_cfb());
        assert_eq!(TpmtSymDef::null().to_bytes().unwrap(), [0x00, 0x10]);
        assert_eq!(
            TpmtSymDef::aes_128_cfb().to_bytes().unwrap(),
            [0x00, 0x06, 0x00, 0x80, 0x00, 0x43]
        );
    }

    #[test]
    fn union_selector_mismatch_is_rejected() {
        let def = TpmtSymDef {
            algorithm: TpmAlgId::Aes,
            key_bits: TpmuSymKeyBits::Null,
            mode: TpmuSymMode::Null,
            details: TpmuSymDetails,
        };
        assert_eq!(def.to_bytes(), Err(TpmRc::SELECTOR));
    }

    #[test]
    fn null_scheme_serializes_empty_details() {
        assert_eq!(TpmtSigScheme::null().to_bytes().unwrap(), [0x00, 0x10]);
        round_trip(&TpmtSigScheme::rsassa(TpmAlgId::Sha256));
        round_trip(&TpmtSigScheme::ecdsa(TpmAlgId::Sha256));
    }

    #[test]
    fn public_area_sym_cipher_fixture() {
        // The 18-byte TPMT_PUBLIC used by the command-layer fixtures.
        let public = Tpm2bPublic::new(TpmtPublic {
            type_alg: TpmAlgId::SymCipher,
            name_alg: TpmAlgId::Sha256,
            object_attributes: TpmaObject(0),
            auth_policy: Tpm2bDigest::empty(),
            parameters: TpmuPublicParms::SymCipher(TpmsSymcipherParms {
                sym: TpmtSymDef::aes_128_cfb(),
            }),
            unique: TpmuPublicId::Sym(Tpm2bDigest::empty()),
        });
        let bytes = public.to_bytes().unwrap();
        assert_eq!(
            bytes,
            [
                0x00, 0x12, // size = 18
                0x00, 0x25, // type = TPM_ALG_SYMCIPHER
                0x00, 0x0B, // name_alg = SHA256
                0x00, 0x00, 0x00, 0x00, // attributes
                0x00, 0x00, // auth_policy.size = 0
                0x00, 0x06, // sym.alg = AES
                0x00, 0x80, // sym.key_bits = 128
                0x00, 0x43, // sym.mode = CFB
                0x00, 0x00, // unique.size = 0
            ]
        );
        round_trip(&public);
    }

    #[test]
    fn public_area_rsa_template_round_trip() {
        round_trip(&Tpm2bPublic::new(TpmtPublic::rsa_storage_key()));
        round_trip(&Tpm2bPublic::new(TpmtPublic::ecc_signing_key()));
        round_trip(&Tpm2bPublic::new(TpmtPublic::sealed_object(
            Tpm2bDigest::new(vec![0x11; 32]),
        )));
    }

    #[test]
    fn signature_fixture_parse() {
        // sig_alg=RSASSA, hash=SHA256, 9-byte signature "signature".
        let mut wire = vec![0x00, 0x14, 0x00, 0x0B, 0x00, 0x09];
        wire.extend_from_slice(b"signature");
        let sig = TpmtSignature::from_bytes(&wire).unwrap();
        assert_eq!(sig.sig_alg, TpmAlgId::RsaSsa);
        match &sig.signature {
            TpmuSignature::Rsa(body) => {
                assert_eq!(body.hash, TpmAlgId::Sha256);
                assert_eq!(body.sig.as_bytes(), b"signature");
            }
            other => panic!("unexpected signature body: {other:?}"),
        }
        round_trip(&sig);
    }

    #[test]
    fn null_signature_round_trip() {
        assert_eq!(TpmtSignature::null().to_bytes().unwrap(), [0x00, 0x10]);
        round_trip(&TpmtSignature::null());
    }

    #[test]
    fn tpmt_ha_length_is_fixed_by_algorithm() {
        round_trip(&TpmtHa::sha256(vec![0x42; 32]));
        let wrong = TpmtHa::sha256(vec![0x42; 20]);
        assert_eq!(wrong.to_bytes(), Err(TpmRc::SIZE));
        // Parsing consumes exactly the algorithm's digest length.
        let mut wire = vec![0x00, 0x04];
        wire.extend_from_slice(&[0x01; 20]);
        wire.push(0xFF);
        let mut buf = ResponseBuffer::new(&wire);
        let ha = TpmtHa::unmarshal(&mut buf).unwrap();
        assert_eq!(ha.digest.len(), 20);
        assert_eq!(buf.remaining(), 1);
    }

    #[test]
    fn pcr_selection_bitmap() {
        let sel = TpmsPcrSelection::sha256(&[0, 1, 2, 7]);
        assert_eq!(sel.pcr_select[0], 0x87);
        assert_eq!(sel.pcr_select.len(), PCR_SELECT_MAX);
        round_trip(&sel);
        round_trip(&TpmlPcrSelection::single(TpmAlgId::Sha256, &[0, 2, 14]));
    }

    #[test]
    fn list_count_cap_is_enforced() {
        // Six banks exceed the HASH_COUNT limit.
        let list = TpmlPcrSelection {
            pcr_selections: vec![TpmsPcrSelection::sha256(&[0]); HASH_COUNT + 1],
        };
        assert_eq!(list.to_bytes(), Err(TpmRc::INSUFFICIENT));

        let mut wire = vec![0x00, 0x00, 0x00, 0x09]; // TPML_DIGEST count = 9 > 8
        wire.extend_from_slice(&[0x00; 18]);
        assert_eq!(TpmlDigest::from_bytes(&wire), Err(TpmRc::INSUFFICIENT));
    }

    #[test]
    fn attest_quote_round_trip() {
        let attest = TpmsAttest {
            magic: TPM_GENERATED_VALUE,
            attest_type: TpmSt::AttestQuote,
            qualified_signer: Tpm2bName::new(vec![0x22; 34]),
            extra_data: Tpm2bData::new(b"nonce".to_vec()),
            clock_info: TpmsClockInfo {
                clock: 1000,
                reset_count: 2,
                restart_count: 3,
                safe: 1,
            },
            firmware_version: 0x0102030405060708,
            attested: TpmuAttest::Quote(TpmsQuoteInfo {
                pcr_select: TpmlPcrSelection::single(TpmAlgId::Sha256, &[0, 2, 14]),
                pcr_digest: Tpm2bDigest::new(vec![0x33; 32]),
            }),
        };
        round_trip(&attest);
    }

    #[test]
    fn capability_data_round_trip() {
        round_trip(&TpmsCapabilityData {
            capability: TpmCap::TpmProperties,
            data: TpmuCapabilities::TpmProperties(TpmlTaggedTpmProperty {
                tpm_property: vec![TpmsTaggedProperty {
                    property: 0x100,
                    value: 42,
                }],
            }),
        });
        round_trip(&TpmsCapabilityData {
            capability: TpmCap::EccCurves,
            data: TpmuCapabilities::EccCurves(TpmlEccCurve {
                ecc_curves: vec![TpmEccCurve::NistP256, TpmEccCurve::NistP384],
            }),
        });
    }

    #[test]
    fn auth_command_block_layout() {
        let auth = TpmsAuthCommand {
            session_handle: tpm_rh::PW,
            nonce: Tpm2bNonce::empty(),
            session_attributes: TpmaSa(TpmaSa::CONTINUE_SESSION),
            hmac: Tpm2bAuth::new(b"pw".to_vec()),
        };
        assert_eq!(
            auth.to_bytes().unwrap(),
            [0x40, 0x00, 0x00, 0x09, 0x00, 0x00, 0x01, 0x00, 0x02, b'p', b'w']
        );
    }

    #[test]
    fn ticket_round_trips() {
        round_trip(&TpmtTkCreation::null(TpmSt::Creation));
        round_trip(&TpmtTkVerified {
            tag: TpmSt::Verified,
            hierarchy: tpm_rh::OWNER,
            digest: Tpm2bDigest::new(vec![0x10; 32]),
        });
        round_trip(&TpmtTkAuth::null(TpmSt::AuthSecret));
        round_trip(&TpmtTkHashcheck::null(TpmSt::Hashcheck));
        round_trip(&Tpm2bDigestValues::new(
            TpmlDigestValues::single(TpmtHa::sha256(vec![0x42; 32]))
                .to_bytes()
                .unwrap(),
        ));
    }

    #[test]
    fn context_round_trip() {
        round_trip(&TpmsContext {
            sequence: 7,
            saved_handle: 0x80000000,
            hierarchy: tpm_rh::OWNER,
            context_blob: Tpm2bContextData::new(vec![0x5A; 48]),
        });
    }

    #[test]
    fn sensitive_create_fixture() {
        let sensitive = Tpm2bSensitiveCreate::new(TpmsSensitiveCreate {
            user_auth: Tpm2bAuth::new(b"a".to_vec()),
            data: Tpm2bSensitiveData::empty(),
        });
        assert_eq!(
            sensitive.to_bytes().unwrap(),
            [0x00, 0x05, 0x00, 0x01, b'a', 0x00, 0x00]
        );
    }
}
