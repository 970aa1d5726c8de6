// src/core/errors.rs

//! Defines the primary error type for the service, and its mapping onto
//! the transport's status codes (spec §7).

use thiserror::Error;

/// The error taxonomy of §7: every failure a handler or background task can
/// produce, independent of how it is eventually reported over the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("exists: {0}")]
    Exists(String),

    #[error("nomem: {0}")]
    NoMem(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("busy: {0}")]
    Busy(String),

    #[error("not acceptable: {0}")]
    NotAcceptable(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Maps the error onto the transport status code fixed by §6.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NotFound,
            ServiceError::Exists(_) => StatusCode::BadRequest,
            ServiceError::NoMem(_) => StatusCode::InternalServerError,
            ServiceError::BadRequest(_) => StatusCode::BadRequest,
            ServiceError::Busy(_) => StatusCode::ServiceUnavailable,
            ServiceError::NotAcceptable(_) => StatusCode::NotAcceptable,
            ServiceError::NotImplemented(_) => StatusCode::NotImplemented,
            ServiceError::Internal(_) => StatusCode::InternalServerError,
        }
    }

    /// The human-readable diagnostic payload carried alongside the status.
    pub fn diagnostic(&self) -> String {
        self.to_string()
    }
}

/// Transport-level status codes this Service ever answers with (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Content,
    Changed,
    Deleted,
    BadRequest,
    NotFound,
    NotImplemented,
    ServiceUnavailable,
    NotAcceptable,
    InternalServerError,
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::BadRequest(format!("malformed JSON: {e}"))
    }
}

impl From<crate::core::addr::AddrError> for ServiceError {
    fn from(e: crate::core::addr::AddrError) -> Self {
        ServiceError::BadRequest(format!("malformed address: {e}"))
    }
}
