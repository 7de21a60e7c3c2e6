//! # Variants and Variant Index Entries
//!
//! A [`Variant`] is a computed blob derived from exactly one
//! (image, transform config) pair. The Variant Index records one
//! [`VariantIndexEntry`] per [`VariantKey`].
//!
//! ## Index Invariant
//!
//! An entry exists if and only if the variant's formatted object exists, or
//! a computation for that key is in flight. Entries move
//! `Pending -> Ready` and never back; a pending claim is deleted when its
//! computation fails.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::ImageId;
use crate::transform_config::CfgKey;

/// Composite Variant Index key: `image_id` partitions, `cfg_key` sorts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantKey {
    pub image_id: ImageId,
    pub cfg_key: CfgKey,
}

impl VariantKey {
    pub fn new(image_id: ImageId, cfg_key: CfgKey) -> Self {
        Self { image_id, cfg_key }
    }

    /// Object key of this variant in the Formatted Store.
    pub fn object_key(&self) -> String {
        format!("{}/{}", self.image_id, self.cfg_key)
    }
}

impl std::fmt::Display for VariantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.image_id, self.cfg_key)
    }
}

/// A computed variant that has landed in the Formatted Store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub image_id: ImageId,
    pub cfg_key: CfgKey,
    /// Formatted Store object key holding the bytes.
    pub storage_location: String,
    pub computed_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub content_type: String,
    /// Lowercase hex SHA-256 of the variant bytes.
    pub content_digest: String,
}

impl Variant {
    /// The index key this variant is recorded under.
    pub fn key(&self) -> VariantKey {
        VariantKey::new(self.image_id.clone(), self.cfg_key.clone())
    }
}

/// Lifecycle state of an index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VariantState {
    /// A worker has claimed the key and is computing the variant.
    Pending { claimed_at: DateTime<Utc> },
    /// The variant exists in the Formatted Store.
    Ready(Variant),
}

/// One record of the Variant Index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantIndexEntry {
    pub key: VariantKey,
    #[serde(flatten)]
    pub state: VariantState,
}

impl VariantIndexEntry {
    /// A fresh pending claim.
    pub fn pending(key: VariantKey, claimed_at: DateTime<Utc>) -> Self {
        Self {
            key,
            state: VariantState::Pending { claimed_at },
        }
    }

    /// A ready entry for a stored variant.
    pub fn ready(variant: Variant) -> Self {
        Self {
            key: variant.key(),
            state: VariantState::Ready(variant),
        }
    }

    /// The variant, if the entry is ready.
    pub fn as_ready(&self) -> Option<&Variant> {
        match &self.state {
            VariantState::Ready(v) => Some(v),
            VariantState::Pending { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.as_ready().is_some()
    }

    /// Whether this is a pending claim older than `lease` at `now`.
    ///
    /// Ready entries never expire.
    pub fn claim_expired(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        match &self.state {
            VariantState::Pending { claimed_at } => now - *claimed_at >= lease,
            VariantState::Ready(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform_config::{OutputFormat, TransformConfig};

    fn key() -> VariantKey {
        let cfg = TransformConfig::new(100, 100, OutputFormat::Webp).unwrap();
        VariantKey::new(ImageId::parse("img-001").unwrap(), cfg.cfg_key())
    }

    fn variant() -> Variant {
        let k = key();
        Variant {
            storage_location: k.object_key(),
            image_id: k.image_id,
            cfg_key: k.cfg_key,
            computed_at: Utc::now(),
            size_bytes: 3,
            content_type: "image/webp".to_string(),
            content_digest: crate::sha256_hex(b"abc"),
        }
    }

    #[test]
    fn object_key_nests_cfg_under_image() {
        assert_eq!(key().object_key(), "img-001/100x100-webp");
        assert_eq!(key().to_string(), "img-001:100x100-webp");
    }

    #[test]
    fn ready_entry_exposes_variant() {
        let entry = VariantIndexEntry::ready(variant());
        assert!(entry.is_ready());
        assert_eq!(entry.key, key());
        assert_eq!(entry.as_ready().unwrap().size_bytes, 3);
    }

    #[test]
    fn pending_claim_expires_after_lease() {
        let claimed_at = Utc::now();
        let entry = VariantIndexEntry::pending(key(), claimed_at);
        assert!(!entry.is_ready());
        let lease = Duration::seconds(60);
        assert!(!entry.claim_expired(claimed_at + Duration::seconds(59), lease));
        assert!(entry.claim_expired(claimed_at + Duration::seconds(60), lease));
    }

    #[test]
    fn ready_entries_never_expire() {
        let entry = VariantIndexEntry::ready(variant());
        assert!(!entry.claim_expired(Utc::now() + Duration::days(365), Duration::seconds(1)));
    }

    #[test]
    fn entry_serializes_with_state_tag() {
        let entry = VariantIndexEntry::pending(key(), Utc::now());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["state"], "pending");
        assert_eq!(json["key"]["cfg_key"], "100x100-webp");

        let ready = VariantIndexEntry::ready(variant());
        let json = serde_json::to_string(&ready).unwrap();
        let back: VariantIndexEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ready);
    }
}
