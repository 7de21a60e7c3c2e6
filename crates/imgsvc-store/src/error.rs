//! # Store Errors
//!
//! Adapters report a [`StoreError`] carrying a coarse [`StoreErrorKind`] and
//! the key involved. The pipeline converts it into a
//! [`PipelineError`](imgsvc_core::PipelineError).

use imgsvc_core::{PipelineError, ValidationError};
use thiserror::Error;

/// Category of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// IO failure, timeout or throttling. Retryable.
    Unavailable,
    /// Stored data could not be decoded.
    Corrupt,
    /// The key is not a legal object key.
    InvalidKey,
}

impl StoreErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::Corrupt => "corrupt",
            Self::InvalidKey => "invalid_key",
        }
    }
}

impl std::fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed store or index operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("store {kind} on {key:?}: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub key: String,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn unavailable(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unavailable, key, message)
    }

    pub fn corrupt(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Corrupt, key, message)
    }

    pub fn invalid_key(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::InvalidKey, key, message)
    }

    pub(crate) fn from_io(key: &str, err: std::io::Error) -> Self {
        Self::unavailable(key, err.to_string())
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err.kind {
            StoreErrorKind::InvalidKey => {
                PipelineError::Validation(ValidationError::InvalidImageId(err.key))
            }
            StoreErrorKind::Unavailable | StoreErrorKind::Corrupt => {
                PipelineError::TransientStore(err.to_string())
            }
        }
    }
}
