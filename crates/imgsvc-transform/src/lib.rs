//! # imgsvc-transform: Pixel Transformation
//!
//! The pipeline treats pixel work as a pure function
//! `transform(raw_bytes, config) -> formatted_bytes` behind the [`Transform`]
//! trait. It is synchronous and CPU-bound; async callers run it on the
//! blocking pool.
//!
//! [`ImageTransform`] is the production implementation on top of the `image`
//! crate. Tests substitute counting or failing fakes.

pub mod image_transform;

use imgsvc_core::{PipelineError, TransformConfig};
use thiserror::Error;

pub use image_transform::ImageTransform;

/// Errors from a transform invocation. None are retryable with the same
/// input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// Raw bytes are not a decodable image.
    #[error("failed to decode source image: {0}")]
    Decode(String),

    /// Source dimensions exceed the decoder limits.
    #[error("source image exceeds decoder limits: {0}")]
    LimitsExceeded(String),

    /// Encoding the variant failed.
    #[error("failed to encode {format} output: {reason}")]
    Encode {
        format: &'static str,
        reason: String,
    },
}

impl From<TransformError> for PipelineError {
    fn from(err: TransformError) -> Self {
        PipelineError::Transform(err.to_string())
    }
}

/// Pure, deterministic image transformation.
///
/// Implementations must be `Send + Sync` so one instance can be shared
/// across concurrent invocations.
pub trait Transform: Send + Sync + 'static {
    /// Produce the variant bytes for `config` from `raw`.
    fn transform(&self, raw: &[u8], config: &TransformConfig) -> Result<Vec<u8>, TransformError>;
}

impl<T: Transform + ?Sized> Transform for std::sync::Arc<T> {
    fn transform(&self, raw: &[u8], config: &TransformConfig) -> Result<Vec<u8>, TransformError> {
        (**self).transform(raw, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_error_maps_to_pipeline_transform() {
        let err: PipelineError = TransformError::Decode("not an image".into()).into();
        assert_eq!(err.kind(), "transform");
        assert!(!err.is_retryable());
    }
}
