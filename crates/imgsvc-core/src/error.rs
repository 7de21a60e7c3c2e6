//! # Pipeline Error Taxonomy
//!
//! All errors use `thiserror` for derive-based `Display` and `Error`
//! implementations.
//!
//! ## Design
//!
//! - Each component reports the most specific kind to its caller.
//! - Only the HTTP boundary maps a kind to a protocol status.
//! - [`PipelineError`] is `Clone` so a single in-flight computation can hand
//!   the same failure to every caller waiting on it.

use thiserror::Error;

/// A request, configuration, or payload failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Image identifier contains forbidden characters or has a bad length.
    #[error("invalid image id {0:?}: expected 1-128 characters from [A-Za-z0-9._-]")]
    InvalidImageId(String),

    /// A transform parameter is missing.
    #[error("missing transform parameter: {0}")]
    MissingParameter(&'static str),

    /// A transform parameter is not recognized.
    #[error("unknown transform parameter: {0}")]
    UnknownParameter(String),

    /// A transform parameter was given twice with different values.
    #[error("conflicting values for transform parameter {0}")]
    ConflictingParameter(&'static str),

    /// A transform parameter could not be parsed.
    #[error("invalid value {value:?} for transform parameter {name}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Offending raw value.
        value: String,
    },

    /// A numeric transform parameter is outside its allowed range.
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        /// Parameter name.
        name: &'static str,
        /// Supplied value.
        value: u64,
        /// Inclusive lower bound.
        min: u64,
        /// Inclusive upper bound.
        max: u64,
    },

    /// A string is not a canonical cfgKey.
    #[error("malformed cfg key {0:?}")]
    MalformedCfgKey(String),

    /// Upload payload is empty.
    #[error("upload payload is empty")]
    EmptyPayload,

    /// Upload payload exceeds the configured maximum.
    #[error("upload payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge {
        /// Payload size in bytes.
        size: u64,
        /// Configured maximum in bytes.
        max: u64,
    },
}

/// Errors reported by the upload, eager and on-demand pipelines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Malformed config, request, or payload. Not retried.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Unknown image identifier or upload ticket. Not retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// Upload ticket expired or already used. Not retried.
    #[error("upload ticket expired: {0}")]
    TicketExpired(String),

    /// The transform function rejected its input. Not retried unless the
    /// caller supplies different input.
    #[error("transform failed: {0}")]
    Transform(String),

    /// The index says a variant is ready but its object is missing, and
    /// self-healing did not succeed.
    #[error("consistency fault: {0}")]
    ConsistencyFault(String),

    /// Timeout, throttling, or IO failure on a store or the index. Retryable.
    #[error("transient store error: {0}")]
    TransientStore(String),

    /// The invocation exceeded its execution budget. Retryable.
    #[error("invocation timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

impl PipelineError {
    /// Whether the invocation's caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStore(_) | Self::TimedOut(_))
    }

    /// Short machine-readable kind, used as a log field and metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::TicketExpired(_) => "ticket_expired",
            Self::Transform(_) => "transform",
            Self::ConsistencyFault(_) => "consistency_fault",
            Self::TransientStore(_) => "transient_store",
            Self::TimedOut(_) => "timed_out",
        }
    }
}
