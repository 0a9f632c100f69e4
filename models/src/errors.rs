// models/src/errors.rs
use std::io;
pub use thiserror::Error;
use serde::{Serialize, Deserialize};
use serde_json::Error as SerdeJsonError;
use uuid::Error as UuidError;
use anyhow::Error as AnyhowError;

/// Error taxonomy shared by every access-control engine.
///
/// The first group maps one-to-one onto decisions surfaced to the caller;
/// the second group covers infrastructure faults underneath them.
#[derive(Debug, Serialize, Deserialize, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid code: {0}")]
    InvalidCode(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Expired: {0}")]
    Expired(String),
    #[error("Too many attempts: {0}")]
    TooManyAttempts(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Delivery failure: {0}")]
    DeliveryFailure(String),

    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("An internal error occurred: {0}")]
    InternalError(String),
}

/// Coarse grouping used by the response layer and by log filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Authorization,
    Expiry,
    State,
    Delivery,
    Infrastructure,
}

impl AccessError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AccessError::Validation(_) | AccessError::InvalidCode(_) => ErrorCategory::Validation,
            AccessError::NotFound(_) => ErrorCategory::NotFound,
            AccessError::Forbidden(_) | AccessError::TooManyAttempts(_) => ErrorCategory::Authorization,
            AccessError::Expired(_) => ErrorCategory::Expiry,
            AccessError::InvalidState(_) => ErrorCategory::State,
            AccessError::DeliveryFailure(_) => ErrorCategory::Delivery,
            AccessError::StorageError(_)
            | AccessError::SerializationError(_)
            | AccessError::ConfigurationError(_)
            | AccessError::InternalError(_) => ErrorCategory::Infrastructure,
        }
    }

    /// HTTP status the outer layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            AccessError::Validation(_) | AccessError::InvalidCode(_) => 400,
            AccessError::Forbidden(_) => 403,
            AccessError::NotFound(_) => 404,
            AccessError::InvalidState(_) => 409,
            AccessError::Expired(_) => 410,
            AccessError::TooManyAttempts(_) => 429,
            AccessError::DeliveryFailure(_) => 502,
            _ => 500,
        }
    }

    /// The bare message without the kind prefix added by `Display`.
    pub fn message(&self) -> &str {
        match self {
            AccessError::Validation(m)
            | AccessError::InvalidCode(m)
            | AccessError::NotFound(m)
            | AccessError::Forbidden(m)
            | AccessError::Expired(m)
            | AccessError::TooManyAttempts(m)
            | AccessError::InvalidState(m)
            | AccessError::DeliveryFailure(m)
            | AccessError::StorageError(m)
            | AccessError::SerializationError(m)
            | AccessError::ConfigurationError(m)
            | AccessError::InternalError(m) => m,
        }
    }
}

impl From<io::Error> for AccessError {
    fn from(err: io::Error) -> Self {
        AccessError::StorageError(err.to_string())
    }
}

impl From<SerdeJsonError> for AccessError {
    fn from(err: SerdeJsonError) -> Self {
        AccessError::SerializationError(err.to_string())
    }
}

impl From<UuidError> for AccessError {
    fn from(err: UuidError) -> Self {
        AccessError::Validation(format!("malformed identifier: {}", err))
    }
}

impl From<AnyhowError> for AccessError {
    fn from(err: AnyhowError) -> Self {
        AccessError::InternalError(err.to_string())
    }
}

#[cfg(feature = "sled-errors")]
impl From<sled::Error> for AccessError {
    fn from(err: sled::Error) -> Self {
        AccessError::StorageError(err.to_string())
    }
}

pub type AccessResult<T> = Result<T, AccessError>;
