// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 constants, command codes and the command handle-count registry

/// Opaque 4-byte reference to a TPM-resident object, session or permanent
/// resource.
pub type TpmHandle = u32;

/// Marker at the start of every TPMS_ATTEST structure (TPM_GENERATED_VALUE).
pub const TPM_GENERATED_VALUE: u32 = 0xFF54_4347;

/// Largest supported command or response buffer.
pub const MAX_COMMAND_SIZE: usize = 4096;

/// Bytes in a PCR selection bitmap (IMPLEMENTATION_PCR / 8).
pub const PCR_SELECT_MAX: usize = 3;

/// Number of PCR banks a selection list or digest-values list may carry.
pub const HASH_COUNT: usize = 5;

/// TPM 2.0 Command Codes (TPM_CC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TpmCc {
    NvUndefineSpaceSpecial = 0x0000011F,
    EvictControl = 0x00000120,
    HierarchyControl = 0x00000121,
    NvUndefineSpace = 0x00000122,
    ChangeEps = 0x00000124,
    ChangePps = 0x00000125,
    Clear = 0x00000126,
    ClearControl = 0x00000127,
    ClockSet = 0x00000128,
    HierarchyChangeAuth = 0x00000129,
    NvDefineSpace = 0x0000012A,
    PcrAllocate = 0x0000012B,
    PcrSetAuthPolicy = 0x0000012C,
    PpCommands = 0x0000012D,
    SetPrimaryPolicy = 0x0000012E,
    FieldUpgradeStart = 0x0000012F,
    ClockRateAdjust = 0x00000130,
    CreatePrimary = 0x00000131,
    NvGlobalWriteLock = 0x00000132,
    GetCommandAuditDigest = 0x00000133,
    NvIncrement = 0x00000134,
    NvSetBits = 0x00000135,
    NvExtend = 0x00000136,
    NvWrite = 0x00000137,
    NvWriteLock = 0x00000138,
    DictionaryAttackLockReset = 0x00000139,
    DictionaryAttackParameters = 0x0000013A,
    NvChangeAuth = 0x0000013B,
    PcrEvent = 0x0000013C,
    PcrReset = 0x0000013D,
    SequenceComplete = 0x0000013E,
    SetAlgorithmSet = 0x0000013F,
    SetCommandCodeAuditStatus = 0x00000140,
    FieldUpgradeData = 0x00000141,
    IncrementalSelfTest = 0x00000142,
    SelfTest = 0x00000143,
    Startup = 0x00000144,
    Shutdown = 0x00000145,
    StirRandom = 0x00000146,
    ActivateCredential = 0x00000147,
    Certify = 0x00000148,
    PolicyNv = 0x00000149,
    CertifyCreation = 0x0000014A,
    Duplicate = 0x0000014B,
    GetTime = 0x0000014C,
    GetSessionAuditDigest = 0x0000014D,
    NvRead = 0x0000014E,
    NvReadLock = 0x0000014F,
    ObjectChangeAuth = 0x00000150,
    PolicySecret = 0x00000151,
    Rewrap = 0x00000152,
    Create = 0x00000153,
    EcdhZGen = 0x00000154,
    Hmac = 0x00000155,
    Import = 0x00000156,
    Load = 0x00000157,
    Quote = 0x00000158,
    RsaDecrypt = 0x00000159,
    HmacStart = 0x0000015B,
    SequenceUpdate = 0x0000015C,
    Sign = 0x0000015D,
    Unseal = 0x0000015E,
    PolicySigned = 0x00000160,
    ContextLoad = 0x00000161,
    ContextSave = 0x00000162,
    EcdhKeyGen = 0x00000163,
    EncryptDecrypt = 0x00000164,
    FlushContext = 0x00000165,
    LoadExternal = 0x00000167,
    MakeCredential = 0x00000168,
    NvReadPublic = 0x00000169,
    PolicyAuthorize = 0x0000016A,
    PolicyAuthValue = 0x0000016B,
    PolicyCommandCode = 0x0000016C,
    PolicyCounterTimer = 0x0000016D,
    PolicyCpHash = 0x0000016E,
    PolicyLocality = 0x0000016F,
    PolicyNameHash = 0x00000170,
    PolicyOr = 0x00000171,
    PolicyTicket = 0x00000172,
    ReadPublic = 0x00000173,
    RsaEncrypt = 0x00000174,
    StartAuthSession = 0x00000176,
    VerifySignature = 0x00000177,
    EccParameters = 0x00000178,
    FirmwareRead = 0x00000179,
    GetCapability = 0x0000017A,
    GetRandom = 0x0000017B,
    GetTestResult = 0x0000017C,
    Hash = 0x0000017D,
    PcrRead = 0x0000017E,
    PolicyPcr = 0x0000017F,
    PolicyRestart = 0x00000180,
    ReadClock = 0x00000181,
    PcrExtend = 0x00000182,
    PcrSetAuthValue = 0x00000183,
    NvCertify = 0x00000184,
    EventSequenceComplete = 0x00000185,
    HashSequenceStart = 0x00000186,
    PolicyPhysicalPresence = 0x00000187,
    PolicyDuplicationSelect = 0x00000188,
    PolicyGetDigest = 0x00000189,
    TestParms = 0x0000018A,
    Commit = 0x0000018B,
    PolicyPassword = 0x0000018C,
    ZGen2Phase = 0x0000018D,
    EcEphemeral = 0x0000018E,
    PolicyNvWritten = 0x0000018F,
}

impl TpmCc {
    pub fn to_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(v: u32) -> Option<Self> {
        COMMAND_INFO
            .iter()
            .find(|info| info.code.to_u32() == v)
            .map(|info| info.code)
    }
}

/// Per-command handle counts, kept in one place so the command builders,
/// the response parsers and the lookup helpers cannot drift apart.
#[derive(Debug, Clone, Copy)]
pub struct CommandInfo {
    pub code: TpmCc,
    pub request_handles: usize,
    pub response_handles: usize,
}

const fn info(code: TpmCc, request_handles: usize, response_handles: usize) -> CommandInfo {
    CommandInfo {
        code,
        request_handles,
        response_handles,
    }
}

/// The TPM_CC registry with each command's handle-area layout.
pub const COMMAND_INFO: &[CommandInfo] = &[
    info(TpmCc::NvUndefineSpaceSpecial, 2, 0),
    info(TpmCc::EvictControl, 2, 0),
    info(TpmCc::HierarchyControl, 1, 0),
    info(TpmCc::NvUndefineSpace, 2, 0),
    info(TpmCc::ChangeEps, 1, 0),
    info(TpmCc::ChangePps, 1, 0),
    info(TpmCc::Clear, 1, 0),
    info(TpmCc::ClearControl, 1, 0),
    info(TpmCc::ClockSet, 1, 0),
    info(TpmCc::HierarchyChangeAuth, 1, 0),
    info(TpmCc::NvDefineSpace, 1, 0),
    info(TpmCc::PcrAllocate, 1, 0),
    info(TpmCc::PcrSetAuthPolicy, 1, 0),
    info(TpmCc::PpCommands, 1, 0),
    info(TpmCc::SetPrimaryPolicy, 1, 0),
    info(TpmCc::FieldUpgradeStart, 2, 0),
    info(TpmCc::ClockRateAdjust, 1, 0),
    info(TpmCc::CreatePrimary, 1, 1),
    info(TpmCc::NvGlobalWriteLock, 1, 0),
    info(TpmCc::GetCommandAuditDigest, 2, 0),
    info(TpmCc::NvIncrement, 2, 0),
    info(TpmCc::NvSetBits, 2, 0),
    info(TpmCc::NvExtend, 2, 0),
    info(TpmCc::NvWrite, 2, 0),
    info(TpmCc::NvWriteLock, 2, 0),
    info(TpmCc::DictionaryAttackLockReset, 1, 0),
    info(TpmCc::DictionaryAttackParameters, 1, 0),
    info(TpmCc::NvChangeAuth, 1, 0),
    info(TpmCc::PcrEvent, 1, 0),
    info(TpmCc::PcrReset, 1, 0),
    info(TpmCc::SequenceComplete, 1, 0),
    info(TpmCc::SetAlgorithmSet, 1, 0),
    info(TpmCc::SetCommandCodeAuditStatus, 1, 0),
    info(TpmCc::FieldUpgradeData, 0, 0),
    info(TpmCc::IncrementalSelfTest, 0, 0),
    info(TpmCc::SelfTest, 0, 0),
    info(TpmCc::Startup, 0, 0),
    info(TpmCc::Shutdown, 0, 0),
    info(TpmCc::StirRandom, 0, 0),
    info(TpmCc::ActivateCredential, 2, 0),
    info(TpmCc::Certify, 2, 0),
    info(TpmCc::PolicyNv, 3, 0),
    info(TpmCc::CertifyCreation, 2, 0),
    info(TpmCc::Duplicate, 2, 0),
    info(TpmCc::GetTime, 2, 0),
    info(TpmCc::GetSessionAuditDigest, 3, 0),
    info(TpmCc::NvRead, 2, 0),
    info(TpmCc::NvReadLock, 2, 0),
    info(TpmCc::ObjectChangeAuth, 2, 0),
    info(TpmCc::PolicySecret, 2, 0),
    info(TpmCc::Rewrap, 2, 0),
    info(TpmCc::Create, 1, 0),
    info(TpmCc::EcdhZGen, 1, 0),
    info(TpmCc::Hmac, 1, 0),
    info(TpmCc::Import, 1, 0),
    info(TpmCc::Load, 1, 1),
    info(TpmCc::Quote, 1, 0),
    info(TpmCc::RsaDecrypt, 1, 0),
    info(TpmCc::HmacStart, 1, 1),
    info(TpmCc::SequenceUpdate, 1, 0),
    info(TpmCc::Sign, 1, 0),
    info(TpmCc::Unseal, 1, 0),
    info(TpmCc::PolicySigned, 2, 0),
    info(TpmCc::ContextLoad, 0, 1),
    info(TpmCc::ContextSave, 1, 0),
    info(TpmCc::EcdhKeyGen, 1, 0),
    info(TpmCc::EncryptDecrypt, 1, 0),
    // flushHandle is in the parameter area: context handles have no name
    // and the command takes no authorization.
    info(TpmCc::FlushContext, 0, 0),
    info(TpmCc::LoadExternal, 0, 1),
    info(TpmCc::MakeCredential, 1, 0),
    info(TpmCc::NvReadPublic, 1, 0),
    info(TpmCc::PolicyAuthorize, 1, 0),
    info(TpmCc::PolicyAuthValue, 1, 0),
    info(TpmCc::PolicyCommandCode, 1, 0),
    info(TpmCc::PolicyCounterTimer, 1, 0),
    info(TpmCc::PolicyCpHash, 1, 0),
    info(TpmCc::PolicyLocality, 1, 0),
    info(TpmCc::PolicyNameHash, 1, 0),
    info(TpmCc::PolicyOr, 1, 0),
    info(TpmCc::PolicyTicket, 1, 0),
    info(TpmCc::ReadPublic, 1, 0),
    info(TpmCc::RsaEncrypt, 1, 0),
    info(TpmCc::StartAuthSession, 2, 1),
    info(TpmCc::VerifySignature, 1, 0),
    info(TpmCc::EccParameters, 0, 0),
    info(TpmCc::FirmwareRead, 0, 0),
    info(TpmCc::GetCapability, 0, 0),
    info(TpmCc::GetRandom, 0, 0),
    info(TpmCc::GetTestResult, 0, 0),
    info(TpmCc::Hash, 0, 0),
    info(TpmCc::PcrRead, 0, 0),
    info(TpmCc::PolicyPcr, 1, 0),
    info(TpmCc::PolicyRestart, 1, 0),
    info(TpmCc::ReadClock, 0, 0),
    info(TpmCc::PcrExtend, 1, 0),
    info(TpmCc::PcrSetAuthValue, 1, 0),
    info(TpmCc::NvCertify, 3, 0),
    info(TpmCc::EventSequenceComplete, 2, 0),
    info(TpmCc::HashSequenceStart, 0, 1),
    info(TpmCc::PolicyPhysicalPresence, 1, 0),
    info(TpmCc::PolicyDuplicationSelect, 1, 0),
    info(TpmCc::PolicyGetDigest, 1, 0),
    info(TpmCc::TestParms, 0, 0),
    info(TpmCc::Commit, 1, 0),
    info(TpmCc::PolicyPassword, 1, 0),
    info(TpmCc::ZGen2Phase, 1, 0),
    info(TpmCc::EcEphemeral, 0, 0),
    info(TpmCc::PolicyNvWritten, 1, 0),
];

/// Number of handles in the command's handle area.
pub fn number_of_request_handles(code: TpmCc) -> usize {
    COMMAND_INFO
        .iter()
        .find(|info| info.code == code)
        .map(|info| info.request_handles)
        .unwrap_or(0)
}

/// Number of handles in the response's handle area.
pub fn number_of_response_handles(code: TpmCc) -> usize {
    COMMAND_INFO
        .iter()
        .find(|info| info.code == code)
        .map(|info| info.response_handles)
        .unwrap_or(0)
}

/// TPM 2.0 Algorithm IDs (TPM_ALG_ID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TpmAlgId {
    Error = 0x0000,
    Rsa = 0x0001,
    Tdes = 0x0003,
    Sha1 = 0x0004,
    Hmac = 0x0005,
    Aes = 0x0006,
    Mgf1 = 0x0007,
    KeyedHash = 0x0008,
    Xor = 0x000A,
    Sha256 = 0x000B,
    Sha384 = 0x000C,
    Sha512 = 0x000D,
    Null = 0x0010,
    Sm3_256 = 0x0012,
    Sm4 = 0x0013,
    RsaSsa = 0x0014,
    RsaEs = 0x0015,
    RsaPss = 0x0016,
    Oaep = 0x0017,
    EcDsa = 0x0018,
    EcDh = 0x0019,
    EcDaa = 0x001A,
    Sm2 = 0x001B,
    EcSchnorr = 0x001C,
    EcMqv = 0x001D,
    Kdf1Sp800_56a = 0x0020,
    Kdf2 = 0x0021,
    Kdf1Sp800_108 = 0x0022,
    Ecc = 0x0023,
    SymCipher = 0x0025,
    Camellia = 0x0026,
    Ctr = 0x0040,
    Ofb = 0x0041,
    Cbc = 0x0042,
    Cfb = 0x0043,
    Ecb = 0x0044,
}

impl TpmAlgId {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        let alg = match v {
            0x0000 => TpmAlgId::Error,
            0x0001 => TpmAlgId::Rsa,
            0x0003 => TpmAlgId::Tdes,
            0x0004 => TpmAlgId::Sha1,
            0x0005 => TpmAlgId::Hmac,
            0x0006 => TpmAlgId::Aes,
            0x0007 => TpmAlgId::Mgf1,
            0x0008 => TpmAlgId::KeyedHash,
            0x000A => TpmAlgId::Xor,
            0x000B => TpmAlgId::Sha256,
            0x000C => TpmAlgId::Sha384,
            0x000D => TpmAlgId::Sha512,
            0x0010 => TpmAlgId::Null,
            0x0012 => TpmAlgId::Sm3_256,
            0x0013 => TpmAlgId::Sm4,
            0x0014 => TpmAlgId::RsaSsa,
            0x0015 => TpmAlgId::RsaEs,
            0x0016 => TpmAlgId::RsaPss,
            0x0017 => TpmAlgId::Oaep,
            0x0018 => TpmAlgId::EcDsa,
            0x0019 => TpmAlgId::EcDh,
            0x001A => TpmAlgId::EcDaa,
            0x001B => TpmAlgId::Sm2,
            0x001C => TpmAlgId::EcSchnorr,
            0x001D => TpmAlgId::EcMqv,
            0x0020 => TpmAlgId::Kdf1Sp800_56a,
            0x0021 => TpmAlgId::Kdf2,
            0x0022 => TpmAlgId::Kdf1Sp800_108,
            0x0023 => TpmAlgId::Ecc,
            0x0025 => TpmAlgId::SymCipher,
            0x0026 => TpmAlgId::Camellia,
            0x0040 => TpmAlgId::Ctr,
            0x0041 => TpmAlgId::Ofb,
            0x0042 => TpmAlgId::Cbc,
            0x0043 => TpmAlgId::Cfb,
            0x0044 => TpmAlgId::Ecb,
            _ => return None,
        };
        Some(alg)
    }

    /// Digest length for hash algorithms, 0 for everything else.
    pub fn digest_size(self) -> usize {
        match self {
            TpmAlgId::Sha1 => 20,
            TpmAlgId::Sha256 => 32,
            TpmAlgId::Sm3_256 => 32,
            TpmAlgId::Sha384 => 48,
            TpmAlgId::Sha512 => 64,
            _ => 0,
        }
    }
}

/// TPM 2.0 structure tags (TPM_ST)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TpmSt {
    RspCommand = 0x00C4,
    Null = 0x8000,
    NoSessions = 0x8001,
    Sessions = 0x8002,
    AttestNv = 0x8014,
    AttestCommandAudit = 0x8015,
    AttestSessionAudit = 0x8016,
    AttestCertify = 0x8017,
    AttestQuote = 0x8018,
    AttestTime = 0x8019,
    AttestCreation = 0x801A,
    Creation = 0x8021,
    Verified = 0x8022,
    AuthSecret = 0x8023,
    Hashcheck = 0x8024,
    AuthSigned = 0x8025,
    FuManifest = 0x8029,
}

impl TpmSt {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        let st = match v {
            0x00C4 => TpmSt::RspCommand,
            0x8000 => TpmSt::Null,
            0x8001 => TpmSt::NoSessions,
            0x8002 => TpmSt::Sessions,
            0x8014 => TpmSt::AttestNv,
            0x8015 => TpmSt::AttestCommandAudit,
            0x8016 => TpmSt::AttestSessionAudit,
            0x8017 => TpmSt::AttestCertify,
            0x8018 => TpmSt::AttestQuote,
            0x8019 => TpmSt::AttestTime,
            0x801A => TpmSt::AttestCreation,
            0x8021 => TpmSt::Creation,
            0x8022 => TpmSt::Verified,
            0x8023 => TpmSt::AuthSecret,
            0x8024 => TpmSt::Hashcheck,
            0x8025 => TpmSt::AuthSigned,
            0x8029 => TpmSt::FuManifest,
            _ => return None,
        };
        Some(st)
    }
}

/// TPM 2.0 Startup Types (TPM_SU)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TpmSu {
    Clear = 0x0000,
    State = 0x0001,
}

impl TpmSu {
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// TPM 2.0 Session Types (TPM_SE)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TpmSe {
    Hmac = 0x00,
    Policy = 0x01,
    Trial = 0x03,
}

/// TPM 2.0 Capability categories (TPM_CAP)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TpmCap {
    Algs = 0x00000000,
    Handles = 0x00000001,
    Commands = 0x00000002,
    PpCommands = 0x00000003,
    AuditCommands = 0x00000004,
    Pcrs = 0x00000005,
    TpmProperties = 0x00000006,
    PcrProperties = 0x00000007,
    EccCurves = 0x00000008,
}

impl TpmCap {
    pub fn to_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(v: u32) -> Option<Self> {
        let cap = match v {
            0x00000000 => TpmCap::Algs,
            0x00000001 => TpmCap::Handles,
            0x00000002 => TpmCap::Commands,
            0x00000003 => TpmCap::PpCommands,
            0x00000004 => TpmCap::AuditCommands,
            0x00000005 => TpmCap::Pcrs,
            0x00000006 => TpmCap::TpmProperties,
            0x00000007 => TpmCap::PcrProperties,
            0x00000008 => TpmCap::EccCurves,
            _ => return None,
        };
        Some(cap)
    }
}

/// ECC Curve IDs (TPM_ECC_CURVE)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TpmEccCurve {
    None = 0x0000,
    NistP192 = 0x0001,
    NistP224 = 0x0002,
    NistP256 = 0x0003,
    NistP384 = 0x0004,
    NistP521 = 0x0005,
    BnP256 = 0x0010,
    BnP638 = 0x0011,
    Sm2P256 = 0x0020,
}

impl TpmEccCurve {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        let curve = match v {
            0x0000 => TpmEccCurve::None,
            0x0001 => TpmEccCurve::NistP192,
            0x0002 => TpmEccCurve::NistP224,
            0x0003 => TpmEccCurve::NistP256,
            0x0004 => TpmEccCurve::NistP384,
            0x0005 => TpmEccCurve::NistP521,
            0x0010 => TpmEccCurve::BnP256,
            0x0011 => TpmEccCurve::BnP638,
            0x0020 => TpmEccCurve::Sm2P256,
            _ => return None,
        };
        Some(curve)
    }
}

/// TPM 2.0 Permanent Handles
pub mod tpm_rh {
    pub const OWNER: u32 = 0x40000001;
    pub const NULL: u32 = 0x40000007;
    pub const PW: u32 = 0x40000009; // TPM_RS_PW password session handle
    pub const LOCKOUT: u32 = 0x4000000A;
    pub const ENDORSEMENT: u32 = 0x4000000B;
    pub const PLATFORM: u32 = 0x4000000C;
}

/// TPM 2.0 Handle Types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TpmHt {
    Pcr = 0x00,
    NvIndex = 0x01,
    HmacSession = 0x02,
    PolicySession = 0x03,
    Permanent = 0x40,
    Transient = 0x80,
    Persistent = 0x81,
}

/// TPM 2.0 Object Attributes (TPMA_OBJECT)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TpmaObject(pub u32);

impl TpmaObject {
    pub const FIXED_TPM: u32 = 1 << 1;
    pub const ST_CLEAR: u32 = 1 << 2;
    pub const FIXED_PARENT: u32 = 1 << 4;
    pub const SENSITIVE_DATA_ORIGIN: u32 = 1 << 5;
    pub const USER_WITH_AUTH: u32 = 1 << 6;
    pub const ADMIN_WITH_POLICY: u32 = 1 << 7;
    pub const NO_DA: u32 = 1 << 10;
    pub const ENCRYPTED_DUPLICATION: u32 = 1 << 11;
    pub const RESTRICTED: u32 = 1 << 16;
    pub const DECRYPT: u32 = 1 << 17;
    pub const SIGN_ENCRYPT: u32 = 1 << 18;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with_fixed_tpm(mut self) -> Self {
        self.0 |= Self::FIXED_TPM;
        self
    }

    pub fn with_fixed_parent(mut self) -> Self {
        self.0 |= Self::FIXED_PARENT;
        self
    }

    pub fn with_sensitive_data_origin(mut self) -> Self {
        self.0 |= Self::SENSITIVE_DATA_ORIGIN;
        self
    }

    pub fn with_user_with_auth(mut self) -> Self {
        self.0 |= Self::USER_WITH_AUTH;
        self
    }

    pub fn with_admin_with_policy(mut self) -> Self {
        self.0 |= Self::ADMIN_WITH_POLICY;
        self
    }

    pub fn with_no_da(mut self) -> Self {
        self.0 |= Self::NO_DA;
        self
    }

    pub fn with_restricted(mut self) -> Self {
        self.0 |= Self::RESTRICTED;
        self
    }

    pub fn with_decrypt(mut self) -> Self {
        self.0 |= Self::DECRYPT;
        self
    }

    pub fn with_sign_encrypt(mut self) -> Self {
        self.0 |= Self::SIGN_ENCRYPT;
        self
    }
}

/// TPM 2.0 NV Attributes (TPMA_NV)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TpmaNv(pub u32);

impl TpmaNv {
    pub const PP_WRITE: u32 = 1 << 0;
    pub const OWNER_WRITE: u32 = 1 << 1;
    pub const AUTH_WRITE: u32 = 1 << 2;
    pub const POLICY_WRITE: u32 = 1 << 3;
    pub const WRITE_LOCKED: u32 = 1 << 11;
    pub const PP_READ: u32 = 1 << 16;
    pub const OWNER_READ: u32 = 1 << 17;
    pub const AUTH_READ: u32 = 1 << 18;
    pub const POLICY_READ: u32 = 1 << 19;
    pub const NO_DA: u32 = 1 << 25;
    pub const ORDERLY: u32 = 1 << 26;
    pub const READ_LOCKED: u32 = 1 << 28;
    pub const WRITTEN: u32 = 1 << 29;
    pub const PLATFORM_CREATE: u32 = 1 << 30;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with_owner_write(mut self) -> Self {
        self.0 |= Self::OWNER_WRITE;
        self
    }

    pub fn with_owner_read(mut self) -> Self {
        self.0 |= Self::OWNER_READ;
        self
    }

    pub fn with_auth_write(mut self) -> Self {
        self.0 |= Self::AUTH_WRITE;
        self
    }

    pub fn with_auth_read(mut self) -> Self {
        self.0 |= Self::AUTH_READ;
        self
    }

    pub fn with_no_da(mut self) -> Self {
        self.0 |= Self::NO_DA;
        self
    }
}

/// TPM 2.0 Session Attributes (TPMA_SESSION)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TpmaSa(pub u8);

impl TpmaSa {
    pub const CONTINUE_SESSION: u8 = 1 << 0;
    pub const AUDIT_EXCLUSIVE: u8 = 1 << 1;
    pub const AUDIT_RESET: u8 = 1 << 2;
    pub const DECRYPT: u8 = 1 << 5;
    pub const ENCRYPT: u8 = 1 << 6;
    pub const AUDIT: u8 = 1 << 7;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with_continue_session(mut self) -> Self {
        self.0 |= Self::CONTINUE_SESSION;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_counts_match_command_layouts() {
        assert_eq!(number_of_request_handles(TpmCc::Startup), 0);
        assert_eq!(number_of_response_handles(TpmCc::Startup), 0);
        assert_eq!(number_of_request_handles(TpmCc::Certify), 2);
        assert_eq!(number_of_response_handles(TpmCc::Certify), 0);
        assert_eq!(number_of_request_handles(TpmCc::CreatePrimary), 1);
        assert_eq!(number_of_response_handles(TpmCc::CreatePrimary), 1);
        assert_eq!(number_of_request_handles(TpmCc::StartAuthSession), 2);
        assert_eq!(number_of_response_handles(TpmCc::StartAuthSession), 1);
        assert_eq!(number_of_request_handles(TpmCc::FlushContext), 0);
        assert_eq!(number_of_request_handles(TpmCc::NvWrite), 2);
        assert_eq!(number_of_response_handles(TpmCc::Load), 1);
    }

    #[test]
    fn command_code_lookup_round_trips() {
        for info in COMMAND_INFO {
            assert_eq!(TpmCc::from_u32(info.code.to_u32()), Some(info.code));
        }
        assert_eq!(TpmCc::from_u32(0xdeadbeef), None);
        assert_eq!(TpmCc::Startup.to_u32(), 0x144);
        assert_eq!(TpmCc::GetRandom.to_u32(), 0x17B);
    }

    #[test]
    fn registry_has_no_duplicates() {
        for (i, a) in COMMAND_INFO.iter().enumerate() {
            for b in &COMMAND_INFO[i + 1..] {
                assert_ne!(a.code, b.code);
            }
        }
    }

    #[test]
    fn alg_id_round_trips() {
        for v in 0u16..0x100 {
            if let Some(alg) = TpmAlgId::from_u16(v) {
                assert_eq!(alg.to_u16(), v);
            }
        }
        assert_eq!(TpmAlgId::Sha256.digest_size(), 32);
        assert_eq!(TpmAlgId::Null.digest_size(), 0);
    }
}
