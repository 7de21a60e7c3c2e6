//! # Filesystem Object Store
//!
//! Stores each object as a file below a root directory:
//!
//! ```text
//! {root}/objects/{key}        object bytes
//! {root}/meta/{key}.json      ObjectMeta
//! {root}/tmp/                 staging area for atomic writes
//! ```
//!
//! Both files are staged in `tmp/` and renamed into place. The metadata file
//! is written last and removed first, so an object is visible exactly when
//! its metadata exists.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

use crate::error::StoreError;
use crate::object::{validate_key, ObjectMeta, ObjectStore, StoredObject};

/// [`ObjectStore`] backed by a local directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for dir in ["objects", "meta", "tmp"] {
            let path = root.join(dir);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| StoreError::from_io(&path.to_string_lossy(), e))?;
        }
        tracing::debug!(root = %root.display(), "opened filesystem object store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join("objects").join(key)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join("meta").join(format!("{key}.json"))
    }

    async fn write_atomic(&self, key: &str, dest: &Path, data: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::from_io(key, e))?;
        }
        let staging = self.root.join("tmp").join(Uuid::new_v4().to_string());
        tokio::fs::write(&staging, data)
            .await
            .map_err(|e| StoreError::from_io(key, e))?;
        if let Err(e) = tokio::fs::rename(&staging, dest).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(StoreError::from_io(key, e));
        }
        Ok(())
    }

    async fn read_meta(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        let raw = match tokio::fs::read(self.meta_path(key)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::from_io(key, e)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| StoreError::corrupt(key, format!("unreadable metadata: {e}")))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
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
        let meta_json = serde_json::to_vec(&meta)
            .map_err(|e| StoreError::corrupt(key, format!("metadata encoding: {e}")))?;

        self.write_atomic(key, &self.object_path(key), &bytes).await?;
        self.write_atomic(key, &self.meta_path(key), &meta_json).await?;
        tracing::debug!(key, size_bytes = meta.size_bytes, "object written");
        Ok(meta)
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        validate_key(key)?;
        let Some(meta) = self.read_meta(key).await? else {
            return Ok(None);
        };
        let bytes = match tokio::fs::read(self.object_path(key)).await {
            Ok(bytes) => Bytes::from(bytes),
            // Deleted between the two reads.
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::from_io(key, e)),
        };
        if bytes.len() as u64 != meta.size_bytes {
            return Err(StoreError::corrupt(
                key,
                format!(
                    "object is {} bytes, metadata records {}",
                    bytes.len(),
                    meta.size_bytes
                ),
            ));
        }
        Ok(Some(StoredObject { meta, bytes }))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        validate_key(key)?;
        self.read_meta(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        let existed = match tokio::fs::remove_file(self.meta_path(key)).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(StoreError::from_io(key, e)),
        };
        match tokio::fs::remove_file(self.object_path(key)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::from_io(key, e)),
        }
        Ok(existed)
    }
}
