//! Shared variant materialization: read raw, transform, write the formatted
//! object, then record the index entry.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use imgsvc_core::{sha256_hex, ImageId, PipelineError, TransformConfig, Variant, VariantKey};
use imgsvc_store::{ClaimOutcome, VariantIndex};

use crate::collaborators::Collaborators;
use crate::metrics::{record_transform, Trigger};

#[derive(Debug, Clone)]
pub(crate) struct Materializer {
    deps: Collaborators,
}

impl Materializer {
    pub(crate) fn new(deps: Collaborators) -> Self {
        Self { deps }
    }

    pub(crate) fn deps(&self) -> &Collaborators {
        &self.deps
    }

    /// Read the raw image bytes. `NotFound` when the image was never stored.
    pub(crate) async fn read_raw(&self, image_id: &ImageId) -> Result<Bytes, PipelineError> {
        match self.deps.raw.get(image_id.as_str()).await? {
            Some(obj) => Ok(obj.bytes),
            None => Err(PipelineError::NotFound(format!("image {image_id}"))),
        }
    }

    /// Run the transform on the blocking pool.
    pub(crate) async fn run_transform(
        &self,
        raw: Bytes,
        cfg: TransformConfig,
        trigger: Trigger,
    ) -> Result<Bytes, PipelineError> {
        record_transform(trigger);
        let transform = self.deps.transform.clone();
        let out = tokio::task::spawn_blocking(move || transform.transform(&raw, &cfg))
            .await
            .map_err(|e| PipelineError::Transform(format!("transform task failed: {e}")))??;
        Ok(Bytes::from(out))
    }

    /// Write the formatted object, then mark the index entry ready.
    pub(crate) async fn store_variant(
        &self,
        key: &VariantKey,
        cfg: &TransformConfig,
        bytes: Bytes,
    ) -> Result<Variant, PipelineError> {
        let location = key.object_key();
        let content_type = cfg.format().content_type().to_string();
        let variant = Variant {
            image_id: key.image_id.clone(),
            cfg_key: key.cfg_key.clone(),
            storage_location: location.clone(),
            computed_at: Utc::now(),
            size_bytes: bytes.len() as u64,
            content_type: content_type.clone(),
            content_digest: sha256_hex(&bytes),
        };
        self.deps
            .formatted
            .put(&location, bytes, Some(content_type))
            .await?;
        self.deps.index.put_ready(&variant).await?;
        Ok(variant)
    }

    /// Transform `raw` and store the result.
    pub(crate) async fn compute(
        &self,
        key: &VariantKey,
        cfg: &TransformConfig,
        raw: Bytes,
        trigger: Trigger,
    ) -> Result<(Variant, Bytes), PipelineError> {
        let bytes = self.run_transform(raw, *cfg, trigger).await?;
        let variant = self.store_variant(key, cfg, bytes.clone()).await?;
        tracing::info!(
            image_id = %key.image_id,
            cfg_key = %key.cfg_key,
            size_bytes = variant.size_bytes,
            trigger = trigger.as_str(),
            "variant computed"
        );
        Ok((variant, bytes))
    }

    /// Claim `key` at the current time. `None` when an entry already
    /// exists (ready, or a live pending claim).
    pub(crate) async fn claim(
        &self,
        key: &VariantKey,
        lease: chrono::Duration,
    ) -> Result<Option<ClaimGuard>, PipelineError> {
        match self.deps.index.try_claim(key, Utc::now(), lease).await? {
            ClaimOutcome::Existing(_) => Ok(None),
            ClaimOutcome::Claimed => Ok(Some(ClaimGuard {
                index: self.deps.index.clone(),
                key: key.clone(),
                armed: true,
            })),
        }
    }
}

/// A pending claim held by one computation.
///
/// The holder either [`disarm`](Self::disarm)s it once the variant is ready
/// or [`release`](Self::release)s it after a failure. Dropping an armed
/// guard (the invocation budget cancelled the computation) releases the
/// claim from a spawned task, so a redelivered event or the next reader can
/// claim the key immediately instead of waiting out the lease.
#[must_use = "an unheld claim is released on drop"]
pub(crate) struct ClaimGuard {
    index: Arc<dyn VariantIndex>,
    key: VariantKey,
    armed: bool,
}

impl ClaimGuard {
    /// The variant is ready; keep the entry.
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }

    /// Release the claim after a failed computation.
    pub(crate) async fn release(mut self) {
        self.armed = false;
        release_claim(self.index.as_ref(), &self.key).await;
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let index = self.index.clone();
        let key = self.key.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::debug!(
                    image_id = %key.image_id,
                    cfg_key = %key.cfg_key,
                    "computation cancelled; releasing pending claim"
                );
                runtime.spawn(async move { release_claim(index.as_ref(), &key).await });
            }
            Err(_) => tracing::warn!(
                image_id = %key.image_id,
                cfg_key = %key.cfg_key,
                "no runtime to release cancelled claim; it expires with its lease"
            ),
        }
    }
}

/// Delete a pending claim. A failed release leaves the claim to expire with
/// its lease.
async fn release_claim(index: &dyn VariantIndex, key: &VariantKey) {
    if let Err(e) = index.release_claim(key).await {
        tracing::warn!(
            image_id = %key.image_id,
            cfg_key = %key.cfg_key,
            error = %e,
            "failed to release pending claim"
        );
    }
}
