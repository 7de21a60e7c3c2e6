//! Variant Index persistence on the `variant_index` table.
//!
//! Claims are single-statement conditional upserts, so concurrent replicas
//! racing for one key see exactly one `Claimed`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use imgsvc_core::{CfgKey, ImageId, Variant, VariantIndexEntry, VariantKey, VariantState};
use imgsvc_store::{ClaimOutcome, StoreError, VariantIndex};
use sqlx::PgPool;

/// Claim attempts before giving up on a key that keeps changing under us.
const CLAIM_ATTEMPTS: usize = 3;

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    image_id: String,
    cfg_key: String,
    state: String,
    claimed_at: Option<DateTime<Utc>>,
    storage_location: Option<String>,
    size_bytes: Option<i64>,
    content_type: Option<String>,
    content_digest: Option<String>,
    computed_at: Option<DateTime<Utc>>,
}

impl VariantRow {
    fn into_entry(self) -> Result<VariantIndexEntry, StoreError> {
        let row_key = format!("{}/{}", self.image_id, self.cfg_key);
        let corrupt = |what: &str| StoreError::corrupt(row_key.clone(), what.to_string());

        let image_id = ImageId::parse(&self.image_id).map_err(|e| corrupt(&e.to_string()))?;
        let cfg_key = CfgKey::parse(&self.cfg_key).map_err(|e| corrupt(&e.to_string()))?;
        let key = VariantKey::new(image_id, cfg_key);

        match self.state.as_str() {
            "pending" => {
                let claimed_at = self.claimed_at.ok_or_else(|| corrupt("pending row without claimed_at"))?;
                Ok(VariantIndexEntry::pending(key, claimed_at))
            }
            "ready" => {
                let size = self.size_bytes.ok_or_else(|| corrupt("ready row without size_bytes"))?;
                let variant = Variant {
                    storage_location: self
                        .storage_location
                        .ok_or_else(|| corrupt("ready row without storage_location"))?,
                    size_bytes: u64::try_from(size).map_err(|_| corrupt("negative size_bytes"))?,
                    content_type: self
                        .content_type
                        .ok_or_else(|| corrupt("ready row without content_type"))?,
                    content_digest: self
                        .content_digest
                        .ok_or_else(|| corrupt("ready row without content_digest"))?,
                    computed_at: self
                        .computed_at
                        .ok_or_else(|| corrupt("ready row without computed_at"))?,
                    image_id: key.image_id,
                    cfg_key: key.cfg_key,
                };
                Ok(VariantIndexEntry {
                    key: variant.key(),
                    state: VariantState::Ready(variant),
                })
            }
            other => Err(corrupt(&format!("unknown state {other:?}"))),
        }
    }
}

fn unavailable(key: &VariantKey, err: sqlx::Error) -> StoreError {
    tracing::warn!(image_id = %key.image_id, cfg_key = %key.cfg_key, error = %err, "variant index query failed");
    StoreError::unavailable(key.object_key(), err.to_string())
}

/// Postgres-backed [`VariantIndex`].
#[derive(Debug, Clone)]
pub struct PgVariantIndex {
    pool: PgPool,
}

impl PgVariantIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = "SELECT image_id, cfg_key, state, claimed_at, storage_location, \
     size_bytes, content_type, content_digest, computed_at FROM variant_index";

#[async_trait]
impl VariantIndex for PgVariantIndex {
    async fn get(&self, key: &VariantKey) -> Result<Option<VariantIndexEntry>, StoreError> {
        let row = sqlx::query_as::<_, VariantRow>(&format!(
            "{SELECT_COLUMNS} WHERE image_id = $1 AND cfg_key = $2"
        ))
        .bind(key.image_id.as_str())
        .bind(key.cfg_key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unavailable(key, e))?;
        row.map(VariantRow::into_entry).transpose()
    }

    async fn try_claim(
        &self,
        key: &VariantKey,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<ClaimOutcome, StoreError> {
        for _ in 0..CLAIM_ATTEMPTS {
            // Insert a pending row, or take over a pending row whose lease ran out.
            let claimed = sqlx::query(
                "INSERT INTO variant_index (image_id, cfg_key, state, claimed_at)
                 VALUES ($1, $2, 'pending', $3)
                 ON CONFLICT (image_id, cfg_key) DO UPDATE SET claimed_at = EXCLUDED.claimed_at
                 WHERE variant_index.state = 'pending' AND variant_index.claimed_at <= $4
                 RETURNING image_id",
            )
            .bind(key.image_id.as_str())
            .bind(key.cfg_key.as_str())
            .bind(now)
            .bind(now - lease)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unavailable(key, e))?;

            if claimed.is_some() {
                return Ok(ClaimOutcome::Claimed);
            }
            // The blocking row may have been released since; try again.
            if let Some(existing) = self.get(key).await? {
                return Ok(ClaimOutcome::Existing(existing));
            }
        }
        Err(StoreError::unavailable(
            key.object_key(),
            "claim contended on every attempt",
        ))
    }

    async fn release_claim(&self, key: &VariantKey) -> Result<(), StoreError> {
        sqlx::query(
            "DELETE FROM variant_index
             WHERE image_id = $1 AND cfg_key = $2 AND state = 'pending'",
        )
        .bind(key.image_id.as_str())
        .bind(key.cfg_key.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable(key, e))?;
        Ok(())
    }

    async fn put_ready(&self, variant: &Variant) -> Result<(), StoreError> {
        let key = variant.key();
        let size = i64::try_from(variant.size_bytes)
            .map_err(|_| StoreError::corrupt(key.object_key(), "size_bytes exceeds BIGINT"))?;
        sqlx::query(
            "INSERT INTO variant_index
                 (image_id, cfg_key, state, claimed_at, storage_location, size_bytes,
                  content_type, content_digest, computed_at)
             VALUES ($1, $2, 'ready', NULL, $3, $4, $5, $6, $7)
             ON CONFLICT (image_id, cfg_key) DO UPDATE SET
                 state = 'ready',
                 claimed_at = NULL,
                 storage_location = EXCLUDED.storage_location,
                 size_bytes = EXCLUDED.size_bytes,
                 content_type = EXCLUDED.content_type,
                 content_digest = EXCLUDED.content_digest,
                 computed_at = EXCLUDED.computed_at",
        )
        .bind(key.image_id.as_str())
        .bind(key.cfg_key.as_str())
        .bind(&variant.storage_location)
        .bind(size)
        .bind(&variant.content_type)
        .bind(&variant.content_digest)
        .bind(variant.computed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable(&key, e))?;
        Ok(())
    }

    async fn list_for_image(
        &self,
        image_id: &ImageId,
    ) -> Result<Vec<VariantIndexEntry>, StoreError> {
        let rows = sqlx::query_as::<_, VariantRow>(&format!(
            "{SELECT_COLUMNS} WHERE image_id = $1 ORDER BY cfg_key"
        ))
        .bind(image_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::unavailable(image_id.as_str(), e.to_string()))?;
        rows.into_iter().map(VariantRow::into_entry).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(state: &str) -> VariantRow {
        VariantRow {
            image_id: "img-1".into(),
            cfg_key: "100x100-webp".into(),
            state: state.into(),
            claimed_at: None,
            storage_location: None,
            size_bytes: None,
            content_type: None,
            content_digest: None,
            computed_at: None,
        }
    }

    #[test]
    fn pending_row_maps_to_pending_entry() {
        let claimed_at = Utc::now();
        let entry = VariantRow {
            claimed_at: Some(claimed_at),
            ..row("pending")
        }
        .into_entry()
        .unwrap();
        assert_eq!(entry.state, VariantState::Pending { claimed_at });
        assert_eq!(entry.key.object_key(), "img-1/100x100-webp");
    }

    #[test]
    fn ready_row_maps_to_variant() {
        let computed_at = Utc::now();
        let entry = VariantRow {
            storage_location: Some("img-1/100x100-webp".into()),
            size_bytes: Some(42),
            content_type: Some("image/webp".into()),
            content_digest: Some("ab".repeat(32)),
            computed_at: Some(computed_at),
            ..row("ready")
        }
        .into_entry()
        .unwrap();
        let variant = entry.as_ready().unwrap();
        assert_eq!(variant.size_bytes, 42);
        assert_eq!(variant.storage_location, "img-1/100x100-webp");
    }

    #[test]
    fn incomplete_rows_are_corrupt() {
        let err = row("ready").into_entry().unwrap_err();
        assert_eq!(err.kind, imgsvc_store::StoreErrorKind::Corrupt);
        let err = row("pending").into_entry().unwrap_err();
        assert_eq!(err.kind, imgsvc_store::StoreErrorKind::Corrupt);
        let err = row("evicted").into_entry().unwrap_err();
        assert!(err.message.contains("evicted"));
    }

    #[test]
    fn bad_keys_are_corrupt() {
        let err = VariantRow {
            cfg_key: "not a key".into(),
            claimed_at: Some(Utc::now()),
            ..row("pending")
        }
        .into_entry()
        .unwrap_err();
        assert_eq!(err.kind, imgsvc_store::StoreErrorKind::Corrupt);
    }
}
