//! # Object Store Interface
//!
//! Raw and formatted tiers share one interface. Objects are immutable blobs;
//! a second `put` on the same key replaces the blob (last writer wins), which
//! keeps duplicate variant computations harmless.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Longest accepted object key.
pub const MAX_KEY_LEN: usize = 512;

/// Metadata recorded alongside every object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub key: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An object and its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub meta: ObjectMeta,
    pub bytes: Bytes,
}

/// Durable blob storage addressed by string keys.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Write `bytes` under `key`, returning the recorded metadata.
    ///
    /// Completion means the object is readable by any later `get`.
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: Option<String>,
    ) -> Result<ObjectMeta, StoreError>;

    /// Read an object. `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError>;

    /// Read only an object's metadata.
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError>;

    /// Remove an object. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for std::sync::Arc<T> {
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: Option<String>,
    ) -> Result<ObjectMeta, StoreError> {
        (**self).put(key, bytes, content_type).await
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        (**self).get(key).await
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        (**self).head(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        (**self).delete(key).await
    }
}

/// Check that `key` is a legal object key.
///
/// Keys are `/`-separated segments drawn from `[A-Za-z0-9._-]`. Empty
/// segments and the `.`/`..` segments are rejected so a key always maps to a
/// path strictly below a store root.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(StoreError::invalid_key(key, "key length out of range"));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(StoreError::invalid_key(key, "empty or relative path segment"));
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(StoreError::invalid_key(key, "illegal character"));
        }
    }
    Ok(())
}
