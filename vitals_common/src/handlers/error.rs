use thiserror::Error;

use crate::connections::StoreError;

/// Why a payload was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("field '{field}' must be {expected}")]
    InvalidType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("{field} out of range: {value} not within {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("user_id must not be empty")]
    EmptyUserId,
}

/// Failure of a handler or processor run.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to encode reading: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("event type '{actual}' is not handled here, expected '{expected}'")]
    WrongEventType {
        expected: &'static str,
        actual: String,
    },
    #[error("cancelled by shutdown")]
    Cancelled,
}
