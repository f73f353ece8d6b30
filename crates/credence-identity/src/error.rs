use credence_core::{ErrorKind, StoreError};

/// Identity-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("DID not found: {0}")]
    DidNotFound(String),

    #[error("invalid DID format: {0}")]
    InvalidDid(String),

    #[error("duplicate DID: {0}")]
    DuplicateDid(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("no tenant session available within {timeout_ms}ms")]
    SessionUnavailable { timeout_ms: u64 },

    #[error("crypto error: {0}")]
    Crypto(#[from] credence_crypto::CryptoError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl IdentityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DidNotFound(_) | Self::InvalidDid(_) => ErrorKind::BadRequest,
            Self::DuplicateDid(_) => ErrorKind::Conflict,
            Self::KeyNotFound(_)
            | Self::Signing(_)
            | Self::SessionUnavailable { .. }
            | Self::Crypto(_)
            | Self::Store(_) => ErrorKind::Internal,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::DidNotFound(_) => "did_not_found",
            Self::InvalidDid(_) => "invalid_did",
            Self::DuplicateDid(_) => "duplicate_did",
            Self::KeyNotFound(_) => "key_not_found",
            Self::Signing(_) => "signing_failed",
            Self::SessionUnavailable { .. } => "session_unavailable",
            Self::Crypto(_) => "crypto_error",
            Self::Store(_) => "storage_error",
        }
    }
}
