use std::fmt;

use serde::{Deserialize, Serialize};

use crate::credential_state::{CredentialStatus, OfferState};

/// Coarse error classes surfaced at the HTTP boundary.
///
/// Every crate-level error maps onto exactly one kind. The kind decides the
/// status code; the crate error decides the stable `reason` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Conflict,
    NotFound,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Conflict => "CONFLICT",
            Self::NotFound => "NOT_FOUND",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid offer transition from {from} on {event}")]
    InvalidOfferTransition { from: OfferState, event: String },

    #[error("invalid credential transition from {from} on {event}")]
    InvalidCredentialTransition {
        from: CredentialStatus,
        event: String,
    },

    #[error("invalid tenant id: {0}")]
    InvalidTenantId(String),

    #[error("unknown wire format: {0}")]
    UnknownWireFormat(String),
}

/// Failures raised by a [`crate::RecordStore`] backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("unknown table: {0}")]
    UnknownTable(&'static str),
}
