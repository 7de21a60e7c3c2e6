//! # Variant Index
//!
//! Key-value index over `(image_id, cfg_key)` recording whether a variant
//! exists and where it lives, plus pending claims for computations in
//! flight.
//!
//! ## Operations
//!
//! Every operation touches a single key. The only conditional writes are
//! single-key:
//!
//! - [`VariantIndex::try_claim`]: put a pending entry if the key is absent,
//!   or replace a pending entry whose lease has expired.
//! - [`VariantIndex::release_claim`]: delete the entry only if it is still
//!   pending.
//!
//! [`VariantIndex::put_ready`] is an unconditional upsert. Callers write the
//! formatted object before calling it, so a ready entry always points at an
//! object that has been stored.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use imgsvc_core::{ImageId, Variant, VariantIndexEntry, VariantKey, VariantState};
use parking_lot::RwLock;

use crate::error::StoreError;

/// Result of [`VariantIndex::try_claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller now holds a pending claim on the key.
    Claimed,
    /// Another entry (ready, or a live pending claim) already exists.
    Existing(VariantIndexEntry),
}

/// Variant Index interface.
#[async_trait]
pub trait VariantIndex: Send + Sync + 'static {
    /// Look up one entry.
    async fn get(&self, key: &VariantKey) -> Result<Option<VariantIndexEntry>, StoreError>;

    /// Claim `key` at `now`, taking over pending claims older than `lease`.
    async fn try_claim(
        &self,
        key: &VariantKey,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Delete the entry for `key` if it is pending. Ready entries are kept.
    async fn release_claim(&self, key: &VariantKey) -> Result<(), StoreError>;

    /// Record a stored variant as ready.
    async fn put_ready(&self, variant: &Variant) -> Result<(), StoreError>;

    /// All entries of one image, ordered by cfg key.
    async fn list_for_image(&self, image_id: &ImageId)
        -> Result<Vec<VariantIndexEntry>, StoreError>;
}

/// The entry that blocks a claim, if any.
fn claim_decision(
    current: Option<&VariantIndexEntry>,
    now: DateTime<Utc>,
    lease: Duration,
) -> Option<VariantIndexEntry> {
    match current {
        None => None,
        Some(entry) if entry.claim_expired(now, lease) => None,
        Some(entry) => Some(entry.clone()),
    }
}

// -- In-memory adapter --------------------------------------------------------

/// Thread-safe, cloneable in-memory Variant Index.
///
/// A `BTreeMap` keeps entries of one image contiguous, so listing is a range
/// scan.
#[derive(Debug, Clone, Default)]
pub struct MemoryVariantIndex {
    entries: Arc<RwLock<BTreeMap<VariantKey, VariantIndexEntry>>>,
}

impl MemoryVariantIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry, ordered by key.
    pub fn snapshot(&self) -> Vec<VariantIndexEntry> {
        self.entries.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VariantIndex for MemoryVariantIndex {
    async fn get(&self, key: &VariantKey) -> Result<Option<VariantIndexEntry>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn try_claim(
        &self,
        key: &VariantKey,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut guard = self.entries.write();
        if let Some(existing) = claim_decision(guard.get(key), now, lease) {
            return Ok(ClaimOutcome::Existing(existing));
        }
        guard.insert(key.clone(), VariantIndexEntry::pending(key.clone(), now));
        Ok(ClaimOutcome::Claimed)
    }

    async fn release_claim(&self, key: &VariantKey) -> Result<(), StoreError> {
        let mut guard = self.entries.write();
        if matches!(
            guard.get(key).map(|e| &e.state),
            Some(VariantState::Pending { .. })
        ) {
            guard.remove(key);
        }
        Ok(())
    }

    async fn put_ready(&self, variant: &Variant) -> Result<(), StoreError> {
        let entry = VariantIndexEntry::ready(variant.clone());
        self.entries.write().insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn list_for_image(
        &self,
        image_id: &ImageId,
    ) -> Result<Vec<VariantIndexEntry>, StoreError> {
        Ok(self
            .entries
            .read()
            .values()
            .skip_while(|e| &e.key.image_id < image_id)
            .take_while(|e| &e.key.image_id == image_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgsvc_core::{OutputFormat, TransformConfig};

    fn key(image: &str, w: u32) -> VariantKey {
        let cfg = TransformConfig::new(w, w, OutputFormat::Png).unwrap();
        VariantKey::new(ImageId::parse(image).unwrap(), cfg.cfg_key())
    }

    fn variant(k: &VariantKey) -> Variant {
        Variant {
            image_id: k.image_id.clone(),
            cfg_key: k.cfg_key.clone(),
            storage_location: k.object_key(),
            computed_at: Utc::now(),
            size_bytes: 1,
            content_type: "image/png".into(),
            content_digest: imgsvc_core::sha256_hex(b"x"),
        }
    }

    #[tokio::test]
    async fn claim_on_absent_key_succeeds_once() {
        let index = MemoryVariantIndex::new();
        let k = key("img", 10);
        let now = Utc::now();
        let lease = Duration::seconds(60);

        assert_eq!(index.try_claim(&k, now, lease).await.unwrap(), ClaimOutcome::Claimed);
        match index.try_claim(&k, now, lease).await.unwrap() {
            ClaimOutcome::Existing(entry) => assert!(!entry.is_ready()),
            other => panic!("expected existing claim, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn expired_claim_is_taken_over() {
        let index = MemoryVariantIndex::new();
        let k = key("img", 10);
        let then = Utc::now();
        let lease = Duration::seconds(60);
        index.try_claim(&k, then, lease).await.unwrap();

        let later = then + Duration::seconds(61);
        assert_eq!(index.try_claim(&k, later, lease).await.unwrap(), ClaimOutcome::Claimed);
        let entry = index.get(&k).await.unwrap().unwrap();
        assert_eq!(entry.state, VariantState::Pending { claimed_at: later });
    }

    #[tokio::test]
    async fn ready_entry_is_never_claimed() {
        let index = MemoryVariantIndex::new();
        let k = key("img", 10);
        index.put_ready(&variant(&k)).await.unwrap();
        let far_future = Utc::now() + Duration::days(30);
        match index.try_claim(&k, far_future, Duration::seconds(1)).await.unwrap() {
            ClaimOutcome::Existing(entry) => assert!(entry.is_ready()),
            other => panic!("expected ready entry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn release_only_removes_pending() {
        let index = MemoryVariantIndex::new();
        let pending = key("img", 10);
        let ready = key("img", 20);
        index
            .try_claim(&pending, Utc::now(), Duration::seconds(60))
            .await
            .unwrap();
        index.put_ready(&variant(&ready)).await.unwrap();

        index.release_claim(&pending).await.unwrap();
        index.release_claim(&ready).await.unwrap();

        assert!(index.get(&pending).await.unwrap().is_none());
        assert!(index.get(&ready).await.unwrap().unwrap().is_ready());
    }

    #[tokio::test]
    async fn put_ready_replaces_pending() {
        let index = MemoryVariantIndex::new();
        let k = key("img", 10);
        index.try_claim(&k, Utc::now(), Duration::seconds(60)).await.unwrap();
        index.put_ready(&variant(&k)).await.unwrap();
        assert!(index.get(&k).await.unwrap().unwrap().is_ready());
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn list_is_scoped_to_one_image() {
        let index = MemoryVariantIndex::new();
        for (image, w) in [("a", 10), ("b", 10), ("b", 20), ("c", 10)] {
            index.put_ready(&variant(&key(image, w))).await.unwrap();
        }
        let listed = index
            .list_for_image(&ImageId::parse("b").unwrap())
            .await
            .unwrap();
        let keys: Vec<String> = listed.iter().map(|e| e.key.cfg_key.to_string()).collect();
        assert_eq!(keys, vec!["10x10-png", "20x20-png"]);
        assert!(index
            .list_for_image(&ImageId::parse("zzz").unwrap())
            .await
            .unwrap()
            .is_empty());
    }
}
