//! # Image Identifiers
//!
//! [`ImageId`] addresses a raw image in the Raw Store and forms the partition
//! component of every Variant Index key.
//!
//! Identifiers minted by the service are random UUID v4 strings. Identifiers
//! arriving from outside (URL path segments, event payloads) are opaque but
//! must pass [`ImageId::parse`], which keeps them safe to embed in object
//! keys and filesystem paths.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Maximum accepted identifier length.
pub const MAX_IMAGE_ID_LEN: usize = 128;

/// Opaque, unique identifier of an uploaded image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageId(String);

impl ImageId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validate an externally supplied identifier.
    ///
    /// Accepts 1 to 128 characters from `[A-Za-z0-9._-]`, excluding `.` and
    /// `..`, so an id can never escape its object-key prefix.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() || raw.len() > MAX_IMAGE_ID_LEN {
            return Err(ValidationError::InvalidImageId(raw.to_string()));
        }
        if raw == "." || raw == ".." {
            return Err(ValidationError::InvalidImageId(raw.to_string()));
        }
        let valid = raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
        if !valid {
            return Err(ValidationError::InvalidImageId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ImageId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ImageId> for String {
    fn from(id: ImageId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
