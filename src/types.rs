//! Error taxonomy shared across the crate
//!
//! Every failure in the request pipeline maps onto one of these variants;
//! the transport layer converts them to HTTP statuses with [`Error::status`].

use hyper::StatusCode;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the access-control layer or its backend.
#[derive(Debug, Error)]
pub enum Error {
    /// Authorization or field-tamper denial. Surfaced verbatim, never retried.
    #[error("Access violation: {0}")]
    AccessViolation(String),

    /// Login length/shape or malformed payload.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Login uniqueness violation.
    #[error("{0}")]
    Conflict(String),

    /// Random-source or key-derivation failure.
    #[error("Hashing error: {0}")]
    Hashing(String),

    /// Record absent, or a search matched nothing. Propagated unchanged
    /// from the backend.
    #[error("Not found")]
    NotFound,

    /// Backend transport failure.
    #[error("Database error: {0}")]
    Database(String),
}

impl Error {
    /// HTTP-style status for this error, used at the transport boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::AccessViolation(_) => StatusCode::FORBIDDEN,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Hashing(_) | Error::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable code for JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::AccessViolation(_) => "ACCESS_VIOLATION",
            Error::Validation(_) => "VALIDATION",
            Error::Conflict(_) => "CONFLICT",
            Error::Hashing(_) => "HASHING",
            Error::NotFound => "NOT_FOUND",
            Error::Database(_) => "DB_ERROR",
        }
    }
}
