//! Fakes shared by the pipeline unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use imgsvc_core::{ImageId, ServiceConfig, TransformConfig, Variant, VariantIndexEntry, VariantKey};
use imgsvc_store::{
    ClaimOutcome, MemoryObjectStore, MemoryVariantIndex, ObjectMeta, ObjectStore, StoreError,
    StoredObject, VariantIndex,
};
use imgsvc_transform::{Transform, TransformError};

use crate::Collaborators;

/// Transform that tags the raw bytes with the cfg key and counts calls.
#[derive(Debug, Default)]
pub struct CountingTransform {
    calls: AtomicUsize,
    delay: Option<Duration>,
    /// Only the first `n` calls are delayed. Every call when `None`.
    slow_calls: Option<usize>,
}

impl CountingTransform {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Delay only the first call.
    pub fn slow_first(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            slow_calls: Some(1),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transform for CountingTransform {
    fn transform(&self, raw: &[u8], config: &TransformConfig) -> Result<Vec<u8>, TransformError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            if self.slow_calls.map_or(true, |n| call < n) {
                std::thread::sleep(delay);
            }
        }
        if raw.starts_with(b"corrupt") {
            return Err(TransformError::Decode("unrecognized image".into()));
        }
        let mut out = format!("{}:", config.cfg_key()).into_bytes();
        out.extend_from_slice(raw);
        Ok(out)
    }
}

/// Object store wrapper whose writes and reads can be made to fail.
#[derive(Debug, Clone, Default)]
pub struct FaultyStore {
    pub inner: MemoryObjectStore,
    fail_puts: Arc<AtomicBool>,
    fail_gets: Arc<AtomicBool>,
}

impl FaultyStore {
    pub fn fail_puts(&self, on: bool) {
        self.fail_puts.store(on, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, on: bool) {
        self.fail_gets.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: Option<String>,
    ) -> Result<ObjectMeta, StoreError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(key, "injected put failure"));
        }
        self.inner.put(key, bytes, content_type).await
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(key, "injected get failure"));
        }
        self.inner.get(key).await
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        self.inner.head(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }
}

/// Index wrapper whose `put_ready` can be made to fail.
#[derive(Debug, Clone, Default)]
pub struct FaultyIndex {
    pub inner: MemoryVariantIndex,
    fail_put_ready: Arc<AtomicBool>,
}

impl FaultyIndex {
    pub fn fail_put_ready(&self, on: bool) {
        self.fail_put_ready.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl VariantIndex for FaultyIndex {
    async fn get(&self, key: &VariantKey) -> Result<Option<VariantIndexEntry>, StoreError> {
        self.inner.get(key).await
    }

    async fn try_claim(
        &self,
        key: &VariantKey,
        now: DateTime<Utc>,
        lease: chrono::Duration,
    ) -> Result<ClaimOutcome, StoreError> {
        self.inner.try_claim(key, now, lease).await
    }

    async fn release_claim(&self, key: &VariantKey) -> Result<(), StoreError> {
        self.inner.release_claim(key).await
    }

    async fn put_ready(&self, variant: &Variant) -> Result<(), StoreError> {
        if self.fail_put_ready.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(variant.key().to_string(), "injected index failure"));
        }
        self.inner.put_ready(variant).await
    }

    async fn list_for_image(
        &self,
        image_id: &ImageId,
    ) -> Result<Vec<VariantIndexEntry>, StoreError> {
        self.inner.list_for_image(image_id).await
    }
}

/// Handles onto every collaborator of a test pipeline.
pub struct Fixture {
    pub raw: MemoryObjectStore,
    pub formatted: FaultyStore,
    pub index: FaultyIndex,
    pub transform: Arc<CountingTransform>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_transform(CountingTransform::default())
    }

    pub fn with_transform(transform: CountingTransform) -> Self {
        Self {
            raw: MemoryObjectStore::new(),
            formatted: FaultyStore::default(),
            index: FaultyIndex::default(),
            transform: Arc::new(transform),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            Arc::new(self.raw.clone()),
            Arc::new(self.formatted.clone()),
            Arc::new(self.index.clone()),
            self.transform.clone(),
        )
    }

    pub async fn seed_raw(&self, id: &str, bytes: &'static [u8]) -> ImageId {
        let image_id = ImageId::parse(id).unwrap();
        self.raw
            .put(id, Bytes::from_static(bytes), None)
            .await
            .unwrap();
        image_id
    }
}

pub fn config() -> ServiceConfig {
    ServiceConfig {
        pending_wait_ms: 200,
        pending_poll_ms: 10,
        ..ServiceConfig::default()
    }
}

pub fn cfg(query: &str) -> TransformConfig {
    TransformConfig::from_query(query).unwrap()
}
