//! # Cross-Crate Pipeline Flows
//!
//! Upload, eager and on-demand paths wired over the in-memory stores with
//! the real image transform. Each test names the flow it walks.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use imgsvc_core::{
    ImageId, PipelineError, ServiceConfig, TransformConfig, Variant, VariantIndexEntry,
    VariantKey, VariantState,
};
use imgsvc_pipeline::{
    Collaborators, EagerTransformer, OnDemandTransformer, ServedSource,
    UploadHandler,
};
use imgsvc_store::{
    ClaimOutcome, MemoryObjectStore, MemoryVariantIndex, NotifyingStore, ObjectStore,
    StoreError, VariantIndex,
};
use imgsvc_transform::{ImageTransform, Transform, TransformError};

// =========================================================================
// Fixtures
// =========================================================================

fn png(width: u32, height: u32) -> Bytes {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 7) as u8, (y * 5) as u8, 90])
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    Bytes::from(out.into_inner())
}

fn cfg(query: &str) -> TransformConfig {
    TransformConfig::from_query(query).unwrap()
}

/// The real transform, counting invocations.
#[derive(Debug, Default)]
struct CountingImageTransform {
    inner: ImageTransform,
    calls: AtomicUsize,
}

impl CountingImageTransform {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transform for CountingImageTransform {
    fn transform(&self, raw: &[u8], config: &TransformConfig) -> Result<Vec<u8>, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Widen the window in which concurrent callers overlap.
        std::thread::sleep(std::time::Duration::from_millis(20));
        self.inner.transform(raw, config)
    }
}

/// Index whose `put_ready` can be made to fail.
#[derive(Debug, Clone, Default)]
struct FlakyIndex {
    inner: MemoryVariantIndex,
    fail_put_ready: Arc<AtomicBool>,
}

#[async_trait]
impl VariantIndex for FlakyIndex {
    async fn get(&self, key: &VariantKey) -> Result<Option<VariantIndexEntry>, StoreError> {
        self.inner.get(key).await
    }

    async fn try_claim(
        &self,
        key: &VariantKey,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<ClaimOutcome, StoreError> {
        self.inner.try_claim(key, now, lease).await
    }

    async fn release_claim(&self, key: &VariantKey) -> Result<(), StoreError> {
        self.inner.release_claim(key).await
    }

    async fn put_ready(&self, variant: &Variant) -> Result<(), StoreError> {
        if self.fail_put_ready.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(
                variant.storage_location.clone(),
                "index write rejected",
            ));
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

struct World {
    raw: MemoryObjectStore,
    formatted: MemoryObjectStore,
    index: FlakyIndex,
    transform: Arc<CountingImageTransform>,
}

impl World {
    fn new() -> Self {
        Self {
            raw: MemoryObjectStore::new(),
            formatted: MemoryObjectStore::new(),
            index: FlakyIndex::default(),
            transform: Arc::new(CountingImageTransform::default()),
        }
    }

    fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            Arc::new(self.raw.clone()),
            Arc::new(self.formatted.clone()),
            Arc::new(self.index.clone()),
            self.transform.clone(),
        )
    }

    fn on_demand(&self) -> OnDemandTransformer {
        OnDemandTransformer::new(self.collaborators(), &ServiceConfig::default())
    }

    async fn seed(&self, bytes: Bytes) -> ImageId {
        let id = ImageId::generate();
        self.raw
            .put(id.as_str(), bytes, Some("image/png".into()))
            .await
            .unwrap();
        id
    }

    async fn entry(&self, id: &ImageId, cfg: &TransformConfig) -> Option<VariantIndexEntry> {
        self.index
            .get(&VariantKey::new(id.clone(), cfg.cfg_key()))
            .await
            .unwrap()
    }
}

// =========================================================================
// Flow 1: Upload -> raw-created event -> eager defaults
// =========================================================================

#[tokio::test]
async fn upload_emits_event_and_eager_computes_default_variant() {
    let world = World::new();
    let (raw, mut events) = NotifyingStore::new(world.raw.clone());
    let uploads = UploadHandler::new(Arc::new(raw), &ServiceConfig::default());

    let receipt = uploads
        .upload(png(320, 160), Some("image/png".into()))
        .await
        .unwrap();
    let event = events.recv().await.unwrap();
    assert_eq!(event.image_id, receipt.image_id);
    // The upload path never transforms.
    assert_eq!(world.transform.calls(), 0);

    let eager = EagerTransformer::new(world.collaborators(), &ServiceConfig::default());
    let report = eager.handle(&event).await.unwrap();
    assert_eq!(report.computed(), 1);

    let default = cfg("w=100&h=100&fmt=webp");
    let entry = world.entry(&receipt.image_id, &default).await.unwrap();
    let VariantState::Ready(variant) = entry.state else {
        panic!("expected a ready entry, got {:?}", entry.state);
    };
    assert_eq!(variant.storage_location, format!("{}/100x100-webp", receipt.image_id));
    assert_eq!(variant.content_type, "image/webp");

    let object = world
        .formatted
        .get(&variant.storage_location)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(object.bytes.len() as u64, variant.size_bytes);
    let decoded = image::load_from_memory(&object.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (100, 50));
}

#[tokio::test]
async fn eager_redelivery_is_idempotent() {
    let world = World::new();
    let (raw, mut events) = NotifyingStore::new(world.raw.clone());
    let uploads = UploadHandler::new(Arc::new(raw), &ServiceConfig::default());
    uploads.upload(png(64, 64), None).await.unwrap();
    let event = events.recv().await.unwrap();

    let eager = EagerTransformer::new(world.collaborators(), &ServiceConfig::default());
    assert_eq!(eager.handle(&event).await.unwrap().computed(), 1);
    let writes = world.formatted.put_count();

    let again = eager.handle(&event).await.unwrap();
    assert_eq!(again.computed(), 0);
    assert_eq!(again.skipped(), 1);
    assert_eq!(world.formatted.put_count(), writes);
    assert_eq!(world.transform.calls(), 1);
}

#[tokio::test]
async fn eager_variant_is_served_from_index() {
    let world = World::new();
    let (raw, mut events) = NotifyingStore::new(world.raw.clone());
    let uploads = UploadHandler::new(Arc::new(raw), &ServiceConfig::default());
    let receipt = uploads.upload(png(200, 200), None).await.unwrap();
    let eager = EagerTransformer::new(world.collaborators(), &ServiceConfig::default());
    eager.handle(&events.recv().await.unwrap()).await.unwrap();

    let served = world
        .on_demand()
        .get_or_compute(&receipt.image_id, &cfg("width=100&height=100&format=WEBP"))
        .await
        .unwrap();
    assert_eq!(served.source, ServedSource::Index);
    assert_eq!(world.transform.calls(), 1);
}

// =========================================================================
// Flow 2: On-demand reads
// =========================================================================

#[tokio::test]
async fn on_demand_miss_then_hit() {
    let world = World::new();
    let id = world.seed(png(120, 60)).await;
    let on_demand = world.on_demand();
    let config = cfg("w=50&h=50&fmt=png");

    let first = on_demand.get_or_compute(&id, &config).await.unwrap();
    assert_eq!(first.source, ServedSource::Computed);
    assert_eq!(first.content_type, "image/png");
    let decoded = image::load_from_memory(&first.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (50, 25));

    let second = on_demand.get_or_compute(&id, &config).await.unwrap();
    assert_eq!(second.source, ServedSource::Index);
    assert_eq!(second.bytes, first.bytes);
    assert_eq!(world.transform.calls(), 1);
}

#[tokio::test]
async fn missing_image_is_not_found_and_leaves_no_entry() {
    let world = World::new();
    let id = ImageId::parse("img-missing").unwrap();
    let config = cfg("w=10&h=10");

    let err = world
        .on_demand()
        .get_or_compute(&id, &config)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)), "{err:?}");
    assert!(world.entry(&id, &config).await.is_none());
    assert_eq!(world.transform.calls(), 0);
}

#[tokio::test]
async fn equivalent_queries_share_one_variant() {
    let world = World::new();
    let id = world.seed(png(160, 120)).await;
    let on_demand = world.on_demand();

    let a = cfg("w=80&h=60&fmt=jpg");
    let b = cfg("fmt=JPEG&height=60&width=80&q=85");
    assert_eq!(a.cfg_key(), b.cfg_key());

    let first = on_demand.get_or_compute(&id, &a).await.unwrap();
    let second = on_demand.get_or_compute(&id, &b).await.unwrap();
    assert_eq!(first.source, ServedSource::Computed);
    assert_eq!(second.source, ServedSource::Index);
    assert_eq!(on_demand.variants(&id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn deleted_object_is_healed_on_read() {
    let world = World::new();
    let id = world.seed(png(90, 90)).await;
    let on_demand = world.on_demand();
    let config = cfg("w=30&h=30&fmt=png");

    let first = on_demand.get_or_compute(&id, &config).await.unwrap();
    let location = format!("{id}/30x30-png");
    assert!(world.formatted.delete(&location).await.unwrap());

    let healed = on_demand.get_or_compute(&id, &config).await.unwrap();
    assert_eq!(healed.bytes, first.bytes);
    assert!(world.formatted.contains(&location));
    assert_eq!(world.transform.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_run_one_transform() {
    let world = World::new();
    let id = world.seed(png(256, 256)).await;
    let on_demand = Arc::new(world.on_demand());
    let config = cfg("w=64&h=64&fmt=gif");

    let mut handles = Vec::new();
    for _ in 0..16 {
        let on_demand = on_demand.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            on_demand.get_or_compute(&id, &config).await
        }));
    }
    let mut bodies = Vec::new();
    for handle in handles {
        bodies.push(handle.await.unwrap().unwrap().bytes);
    }

    assert_eq!(world.transform.calls(), 1);
    assert!(bodies.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn index_failure_after_store_leaves_object_unindexed() {
    let world = World::new();
    let id = world.seed(png(40, 40)).await;
    let on_demand = world.on_demand();
    let config = cfg("w=20&h=20&fmt=png");

    world.index.fail_put_ready.store(true, Ordering::SeqCst);
    let err = on_demand.get_or_compute(&id, &config).await.unwrap_err();
    assert!(err.is_retryable(), "{err:?}");
    // The object landed first; the claim was released.
    assert!(world.formatted.contains(&format!("{id}/20x20-png")));
    assert!(world.entry(&id, &config).await.is_none());

    world.index.fail_put_ready.store(false, Ordering::SeqCst);
    let served = on_demand.get_or_compute(&id, &config).await.unwrap();
    assert_eq!(served.source, ServedSource::Computed);
    assert!(world.entry(&id, &config).await.unwrap().is_ready());
}
