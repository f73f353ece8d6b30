use credence_core::{CoreError, ErrorKind, StoreError};
use credence_identity::IdentityError;

use crate::schema::ValidationIssue;

/// Credential-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("invalid JSON schema: {0}")]
    InvalidSchema(String),

    #[error("schema {name}@{version} already registered in this namespace")]
    SchemaConflict { name: String, version: String },

    #[error("schema not found: {0}")]
    SchemaNotFound(String),

    #[error("unknown schema reference: {0}")]
    UnknownSchema(String),

    #[error("definition {name}@{version} already registered for issuer {issuer_did}")]
    DefinitionConflict {
        name: String,
        version: String,
        issuer_did: String,
    },

    #[error("invalid credential definition: {0}")]
    InvalidDefinition(String),

    #[error("credential definition not found: {0}")]
    DefinitionNotFound(String),

    #[error("unknown credential definition reference: {0}")]
    UnknownDefinition(String),

    #[error("invalid offer: {0}")]
    InvalidOffer(String),

    #[error("issuer {0} is not an identity of this tenant")]
    IssuerNotOwned(String),

    #[error("invalid or expired code")]
    InvalidOrExpiredCode,

    #[error("offer expired")]
    OfferExpired,

    #[error("claims violate schema {schema_id}: {}", summarize(.issues))]
    SchemaViolation {
        schema_id: String,
        issues: Vec<ValidationIssue>,
    },

    #[error("credential not found: {0}")]
    CredentialNotFound(String),

    #[error("presentation request not found: {0}")]
    RequestNotFound(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("crypto error: {0}")]
    Crypto(#[from] credence_crypto::CryptoError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{} {}", i.path, i.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl CredentialError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSchema(_)
            | Self::UnknownSchema(_)
            | Self::InvalidDefinition(_)
            | Self::UnknownDefinition(_)
            | Self::InvalidOffer(_)
            | Self::IssuerNotOwned(_)
            | Self::InvalidOrExpiredCode
            | Self::OfferExpired
            | Self::SchemaViolation { .. } => ErrorKind::BadRequest,
            Self::SchemaConflict { .. } | Self::DefinitionConflict { .. } => ErrorKind::Conflict,
            Self::SchemaNotFound(_)
            | Self::DefinitionNotFound(_)
            | Self::CredentialNotFound(_)
            | Self::RequestNotFound(_) => ErrorKind::NotFound,
            Self::Identity(e) => e.kind(),
            Self::Signing(_)
            | Self::Crypto(_)
            | Self::Store(_)
            | Self::Core(_)
            | Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable reason.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidSchema(_) => "invalid_schema",
            Self::SchemaConflict { .. } => "schema_conflict",
            Self::SchemaNotFound(_) => "schema_not_found",
            Self::UnknownSchema(_) => "unknown_schema",
            Self::DefinitionConflict { .. } => "definition_conflict",
            Self::InvalidDefinition(_) => "invalid_definition",
            Self::DefinitionNotFound(_) => "definition_not_found",
            Self::UnknownDefinition(_) => "unknown_definition",
            Self::InvalidOffer(_) => "invalid_offer",
            Self::IssuerNotOwned(_) => "issuer_not_owned",
            Self::InvalidOrExpiredCode => "invalid_or_expired_code",
            Self::OfferExpired => "offer_expired",
            Self::SchemaViolation { .. } => "schema_violation",
            Self::CredentialNotFound(_) => "credential_not_found",
            Self::RequestNotFound(_) => "presentation_request_not_found",
            Self::Signing(_) => "signing_failed",
            Self::Identity(e) => e.reason(),
            Self::Crypto(_) => "crypto_error",
            Self::Store(_) => "storage_error",
            Self::Core(_) => "internal_state_error",
            Self::Serialization(_) => "serialization_error",
        }
    }

    /// Structured detail worth returning to a client, if any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::SchemaViolation { issues, .. } => serde_json::to_value(issues).ok(),
            _ => None,
        }
    }
}
