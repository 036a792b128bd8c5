use serde::{Deserialize, Serialize};
use std::fmt;

/// Single structured error shape used by the storage and CLI layers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

/// Errors raised by the in-memory record itself. Both kinds are local to one call:
/// the record keeps its previous state and the caller may retry with corrected input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// A field violates a declared constraint (length, nullability, temporal ordering).
    #[error("Validation failed for {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// The operation needs a persisted identity (or the lack of one).
    #[error("Illegal state: {0}")]
    IllegalState(String),
}

impl RecordError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "RECORD_VALIDATION_FAILED",
            Self::IllegalState(_) => "RECORD_ILLEGAL_STATE",
        }
    }
}

impl From<RecordError> for AppError {
    fn from(err: RecordError) -> Self {
        let message = err.to_string();
        match &err {
            RecordError::Validation { field, .. } => {
                AppError::new(err.code(), message).with_details(format!("field={field}"))
            }
            RecordError::IllegalState(_) => AppError::new(err.code(), message),
        }
    }
}
