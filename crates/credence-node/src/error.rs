//! Unified API error type and its HTTP rendering.
//!
//! Every error body has the shape
//! `{"error": {"code": "...", "reason": "...", "message": "...", "details": ...}}`.
//! `code` is the coarse error kind; `reason` is the stable machine-readable cause.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use credence_core::{ErrorKind, StoreError};
use credence_credentials::CredentialError;
use credence_identity::IdentityError;
use serde::Serialize;
use serde_json::Value;

use crate::auth::AuthError;
use crate::tenants::TenantError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A request-level failure raised directly by a handler.
    #[error("{message}")]
    Request {
        kind: ErrorKind,
        reason: &'static str,
        message: String,
    },

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn bad_request(reason: &'static str, message: impl Into<String>) -> Self {
        Self::Request {
            kind: ErrorKind::BadRequest,
            reason,
            message: message.into(),
        }
    }

    pub fn not_found(reason: &'static str, message: impl Into<String>) -> Self {
        Self::Request {
            kind: ErrorKind::NotFound,
            reason,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Request { kind, .. } => *kind,
            Self::Credential(e) => e.kind(),
            Self::Identity(e) => e.kind(),
            Self::Tenant(e) => e.kind(),
            Self::Auth(e) => e.kind(),
            Self::Store(_) => ErrorKind::Internal,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Request { reason, .. } => reason,
            Self::Credential(e) => e.reason(),
            Self::Identity(e) => e.reason(),
            Self::Tenant(e) => e.reason(),
            Self::Auth(e) => e.reason(),
            Self::Store(_) => "storage_error",
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::Credential(e) => e.details(),
            _ => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub reason: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            // Internal detail stays in the log.
            tracing::error!(reason = self.reason(), error = %self, "internal error");
            "an internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.kind().as_str(),
                reason: self.reason(),
                message,
                details: self.details(),
            },
        };
        (status, Json(body)).into_response()
    }
}
