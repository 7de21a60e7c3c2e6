//! # On-Demand Transformer
//!
//! Serves `(image_id, config)` requests:
//!
//! 1. Derive the cfg key and look up the Variant Index.
//! 2. **Ready**: read the formatted object. If it is missing the index is
//!    inconsistent; the fault is logged and counted, and the variant is
//!    recomputed and rewritten (object, then index).
//! 3. **Absent**: read the raw image (missing raw is `NotFound` and no index
//!    entry is created), claim the key, transform, store, index, return.
//! 4. **Pending** (claimed by another worker): poll until it becomes ready or
//!    the wait budget elapses, then compute anyway. Duplicate computation is
//!    harmless because writes are idempotent. Expired claims are taken over.
//!
//! Concurrent callers for one key in this process share a single computation
//! through [`SingleFlight`].

use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use imgsvc_core::{
    CfgKey, ImageId, PipelineError, ServiceConfig, TransformConfig, Variant,
    VariantIndexEntry, VariantKey, VariantState,
};
use tokio::time::Instant;

use crate::budget::{to_chrono, with_budget};
use crate::collaborators::Collaborators;
use crate::materialize::Materializer;
use crate::metrics::{record_consistency_fault, record_lookup, Trigger};
use crate::single_flight::SingleFlight;

/// Where served bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedSource {
    /// An existing ready variant.
    Index,
    /// Computed by this request.
    Computed,
}

/// A variant ready to be returned to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub bytes: Bytes,
    pub content_type: String,
    pub cfg_key: CfgKey,
    pub source: ServedSource,
}

type FlightResult = Result<Served, PipelineError>;

/// Read-path transformer with caching and single-flight deduplication.
#[derive(Debug)]
pub struct OnDemandTransformer {
    materializer: Materializer,
    flights: SingleFlight<VariantKey, FlightResult>,
    lease: chrono::Duration,
    pending_wait: Duration,
    poll_interval: Duration,
    budget: Duration,
}

impl OnDemandTransformer {
    pub fn new(deps: Collaborators, config: &ServiceConfig) -> Self {
        Self {
            materializer: Materializer::new(deps),
            flights: SingleFlight::new(),
            lease: to_chrono(config.pending_lease()),
            pending_wait: config.pending_wait(),
            poll_interval: config.pending_poll_interval(),
            budget: config.invocation_timeout(),
        }
    }

    /// Serve the variant of `image_id` described by `cfg`.
    pub async fn get_or_compute(
        &self,
        image_id: &ImageId,
        cfg: &TransformConfig,
    ) -> Result<Served, PipelineError> {
        let key = VariantKey::new(image_id.clone(), cfg.cfg_key());
        with_budget(self.budget, async {
            let (result, led) = self
                .flights
                .run(key.clone(), || self.resolve(&key, cfg))
                .await;
            if !led {
                tracing::debug!(image_id = %key.image_id, cfg_key = %key.cfg_key, "joined in-flight computation");
            }
            result
        })
        .await
    }

    /// List the index entries of one image.
    pub async fn variants(
        &self,
        image_id: &ImageId,
    ) -> Result<Vec<VariantIndexEntry>, PipelineError> {
        with_budget(self.budget, async {
            Ok(self
                .materializer
                .deps()
                .index
                .list_for_image(image_id)
                .await?)
        })
        .await
    }

    async fn resolve(&self, key: &VariantKey, cfg: &TransformConfig) -> FlightResult {
        let index = &self.materializer.deps().index;
        let started = Instant::now();
        let mut waited = false;

        loop {
            let Some(entry) = index.get(key).await? else {
                match self.claim_and_compute(key, cfg).await? {
                    Some(served) => return Ok(served),
                    None => continue,
                }
            };
            // An expired claim belongs to a worker that died; take it over.
            if entry.claim_expired(Utc::now(), self.lease) {
                match self.claim_and_compute(key, cfg).await? {
                    Some(served) => return Ok(served),
                    None => continue,
                }
            }
            if let VariantState::Ready(variant) = entry.state {
                return self.serve_ready(key, cfg, variant).await;
            }

            if started.elapsed() >= self.pending_wait {
                tracing::warn!(
                    image_id = %key.image_id,
                    cfg_key = %key.cfg_key,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "pending variant did not become ready; computing anyway"
                );
                let raw = self.materializer.read_raw(&key.image_id).await?;
                let (_, bytes) = self
                    .materializer
                    .compute(key, cfg, raw, Trigger::OnDemand)
                    .await?;
                return Ok(served(key, cfg, bytes, ServedSource::Computed));
            }
            if !waited {
                record_lookup("pending_wait");
                waited = true;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Claim the key and compute. `None` when another worker claimed it
    /// first; the caller re-reads the index.
    async fn claim_and_compute(
        &self,
        key: &VariantKey,
        cfg: &TransformConfig,
    ) -> Result<Option<Served>, PipelineError> {
        let raw = self.materializer.read_raw(&key.image_id).await?;
        let Some(claim) = self.materializer.claim(key, self.lease).await? else {
            return Ok(None);
        };
        record_lookup("miss");

        match self
            .materializer
            .compute(key, cfg, raw, Trigger::OnDemand)
            .await
        {
            Ok((_, bytes)) => {
                claim.disarm();
                Ok(Some(served(key, cfg, bytes, ServedSource::Computed)))
            }
            Err(e) => {
                claim.release().await;
                Err(e)
            }
        }
    }

    async fn serve_ready(
        &self,
        key: &VariantKey,
        cfg: &TransformConfig,
        variant: Variant,
    ) -> FlightResult {
        let formatted = &self.materializer.deps().formatted;
        if let Some(obj) = formatted.get(&variant.storage_location).await? {
            record_lookup("hit");
            return Ok(Served {
                bytes: obj.bytes,
                content_type: variant.content_type,
                cfg_key: key.cfg_key.clone(),
                source: ServedSource::Index,
            });
        }

        record_lookup("consistency_fault");
        record_consistency_fault();
        tracing::error!(
            fault = "consistency",
            image_id = %key.image_id,
            cfg_key = %key.cfg_key,
            storage_location = %variant.storage_location,
            "ready index entry points at a missing formatted object; recomputing"
        );
        self.heal(key, cfg).await
    }

    async fn heal(&self, key: &VariantKey, cfg: &TransformConfig) -> FlightResult {
        let attempt = async {
            let raw = self.materializer.read_raw(&key.image_id).await?;
            self.materializer
                .compute(key, cfg, raw, Trigger::SelfHeal)
                .await
        };
        match attempt.await {
            Ok((_, bytes)) => {
                tracing::info!(image_id = %key.image_id, cfg_key = %key.cfg_key, "consistency fault healed");
                Ok(served(key, cfg, bytes, ServedSource::Computed))
            }
            Err(e) if e.is_retryable() => Err(e),
            Err(e) => Err(PipelineError::ConsistencyFault(format!(
                "variant {key} is indexed but its object is missing, and recomputing failed: {e}"
            ))),
        }
    }
}

fn served(key: &VariantKey, cfg: &TransformConfig, bytes: Bytes, source: ServedSource) -> Served {
    Served {
        bytes,
        content_type: cfg.format().content_type().to_string(),
        cfg_key: key.cfg_key.clone(),
        source,
    }
}
