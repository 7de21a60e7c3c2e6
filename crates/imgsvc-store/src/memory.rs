//! # In-Memory Object Store
//!
//! Process-local [`ObjectStore`]. Cloning shares the underlying map, so a
//! test can keep a handle while the pipeline owns another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::object::{validate_key, ObjectMeta, ObjectStore, StoredObject};

/// Thread-safe, cloneable in-memory object store.
///
/// The lock is `parking_lot` and is never held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    puts: Arc<AtomicU64>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed `put` calls since creation.
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    /// Keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: Option<String>,
    ) -> Result<ObjectMeta, StoreError> {
        validate_key(key)?;
        let meta = ObjectMeta {
            key: key.to_string(),
            size_bytes: bytes.len() as u64,
            content_type,
            created_at: Utc::now(),
        };
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                meta: meta.clone(),
                bytes,
            },
        );
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(meta)
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        validate_key(key)?;
        Ok(self.objects.read().get(key).cloned())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        validate_key(key)?;
        Ok(self.objects.read().get(key).map(|o| o.meta.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        Ok(self.objects.write().remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_returns_bytes_and_meta() {
        let store = MemoryObjectStore::new();
        let meta = store
            .put("img-1", Bytes::from_static(b"raw"), Some("image/png".into()))
            .await
            .unwrap();
        assert_eq!(meta.size_bytes, 3);

        let obj = store.get("img-1").await.unwrap().unwrap();
        assert_eq!(obj.bytes, Bytes::from_static(b"raw"));
        assert_eq!(obj.meta.content_type.as_deref(), Some("image/png"));
        assert_eq!(store.head("img-1").await.unwrap(), Some(meta));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let store = MemoryObjectStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
        assert!(store.head("nope").await.unwrap().is_none());
        assert!(!store.delete("nope").await.unwrap());
    }

    #[tokio::test]
    async fn clones_share_contents() {
        let store = MemoryObjectStore::new();
        let handle = store.clone();
        store.put("a/b", Bytes::from_static(b"x"), None).await.unwrap();
        assert!(handle.contains("a/b"));
        assert_eq!(handle.put_count(), 1);
        assert!(handle.delete("a/b").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn invalid_key_is_rejected() {
        let store = MemoryObjectStore::new();
        assert!(store.put("../x", Bytes::new(), None).await.is_err());
        assert_eq!(store.put_count(), 0);
    }
}
