use serde::Serialize;
use thiserror::Error;

pub type SsiResult<T> = Result<T, SsiError>;

#[derive(Debug, Error)]
pub enum SsiError {
    // ── Validation: raised before any cryptographic operation ─────────────────
    #[error("invalid crypto mode: {0:?} (expected \"anoncrypt\" or \"authcrypt\")")]
    InvalidCryptoMode(String),

    #[error("envelope kind is empty")]
    EmptyKind,

    #[error("envelope thread_id is empty")]
    EmptyThreadId,

    #[error("authcrypt requires a sender verkey")]
    MissingSenderVerkey,

    #[error("recipient verkey does not belong to the receiving DID")]
    RecipientMismatch,

    #[error("sender verkey does not match the one recorded in the package")]
    SenderMismatch,

    #[error("invalid verkey: {0}")]
    InvalidVerkey(String),

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u32),

    #[error("envelope expired at {expires_at_ms} ms")]
    Expired { expires_at_ms: u64 },

    #[error("chunk size {0} is outside the configured bounds")]
    InvalidChunkSize(usize),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // ── Integrity / authentication ───────────────────────────────────────────
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("decryption failed: wrong key or corrupted data")]
    DecryptFailed,

    #[error("chunk {index} failed authentication")]
    ChunkDecryptFailed { index: u64 },

    // ── Transport / format ───────────────────────────────────────────────────
    #[error("input truncated: unexpected end of data")]
    TruncatedInput,

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("bad magic: not an SSIFILE2 container")]
    BadMagic,

    #[error("malformed package: {0}")]
    MalformedPackage(String),

    // ── Resource ─────────────────────────────────────────────────────────────
    #[error("no key material found for {0}")]
    KeyNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse error class, used by callers deciding whether fixing input can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorClass {
    Validation,
    Integrity,
    Format,
    Resource,
}

/// Serializable form of an [`SsiError`], handed across API boundaries.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub class: ErrorClass,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
}

impl SsiError {
    /// Stable identifier for this error variant.
    pub fn kind(&self) -> &'static str {
        match self {
            SsiError::InvalidCryptoMode(_) => "InvalidCryptoMode",
            SsiError::EmptyKind => "EmptyKind",
            SsiError::EmptyThreadId => "EmptyThreadId",
            SsiError::MissingSenderVerkey => "MissingSenderVerkey",
            SsiError::RecipientMismatch => "RecipientMismatch",
            SsiError::SenderMismatch => "SenderMismatch",
            SsiError::InvalidVerkey(_) => "InvalidVerkey",
            SsiError::UnsupportedVersion(_) => "UnsupportedVersion",
            SsiError::Expired { .. } => "Expired",
            SsiError::InvalidChunkSize(_) => "InvalidChunkSize",
            SsiError::InvalidInput(_) => "InvalidInput",
            SsiError::SignatureVerificationFailed => "SignatureVerificationFailed",
            SsiError::DecryptFailed => "DecryptFailed",
            SsiError::ChunkDecryptFailed { .. } => "ChunkDecryptFailed",
            SsiError::TruncatedInput => "TruncatedInput",
            SsiError::MalformedHeader(_) => "MalformedHeader",
            SsiError::BadMagic => "BadMagic",
            SsiError::MalformedPackage(_) => "MalformedPackage",
            SsiError::KeyNotFound(_) => "KeyNotFound",
            SsiError::Io(_) => "Io",
            SsiError::Other(_) => "Other",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            SsiError::InvalidCryptoMode(_)
            | SsiError::EmptyKind
            | SsiError::EmptyThreadId
            | SsiError::MissingSenderVerkey
            | SsiError::RecipientMismatch
            | SsiError::SenderMismatch
            | SsiError::InvalidVerkey(_)
            | SsiError::UnsupportedVersion(_)
            | SsiError::Expired { .. }
            | SsiError::InvalidChunkSize(_)
            | SsiError::InvalidInput(_) => ErrorClass::Validation,
            SsiError::SignatureVerificationFailed
            | SsiError::DecryptFailed
            | SsiError::ChunkDecryptFailed { .. } => ErrorClass::Integrity,
            SsiError::TruncatedInput
            | SsiError::MalformedHeader(_)
            | SsiError::BadMagic
            | SsiError::MalformedPackage(_) => ErrorClass::Format,
            SsiError::KeyNotFound(_) | SsiError::Io(_) | SsiError::Other(_) => {
                ErrorClass::Resource
            }
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            class: self.class(),
            message: self.to_string(),
            index: match self {
                SsiError::ChunkDecryptFailed { index } => Some(*index),
                _ => None,
            },
        }
    }

    /// Map a short read to [`SsiError::TruncatedInput`], leaving other I/O errors intact.
    pub fn from_read(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            SsiError::TruncatedInput
        } else {
            SsiError::Io(err)
        }
    }
}
