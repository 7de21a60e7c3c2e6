//! # Eager Transformer
//!
//! Reacts to a raw-created event by computing every configured default
//! variant. Delivery is at-least-once, so handling is idempotent: a variant
//! whose index entry already exists (ready, or claimed by a live worker) is
//! skipped without a transform call or a formatted write.
//!
//! Each config is processed independently. A failing config is recorded in
//! the [`EagerReport`] and the remaining configs still run.

use std::collections::HashSet;
use std::time::Duration;

use bytes::Bytes;
use imgsvc_core::{CfgKey, ImageId, PipelineError, ServiceConfig, TransformConfig, VariantKey};
use imgsvc_store::RawCreatedEvent;

use crate::budget::{to_chrono, with_budget};
use crate::collaborators::Collaborators;
use crate::materialize::Materializer;
use crate::metrics::Trigger;

/// What happened to one default config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EagerOutcome {
    /// The variant was computed, stored and indexed.
    Computed,
    /// An index entry already existed.
    Skipped,
    /// Computing this variant failed.
    Failed(PipelineError),
}

/// Per-config results of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EagerReport {
    pub image_id: ImageId,
    pub outcomes: Vec<(CfgKey, EagerOutcome)>,
}

impl EagerReport {
    fn new(image_id: ImageId) -> Self {
        Self {
            image_id,
            outcomes: Vec::new(),
        }
    }

    pub fn computed(&self) -> usize {
        self.count(|o| matches!(o, EagerOutcome::Computed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, EagerOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, EagerOutcome::Failed(_)))
    }

    /// Whether redelivering the event could make progress.
    pub fn has_retryable_failures(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, o)| matches!(o, EagerOutcome::Failed(e) if e.is_retryable()))
    }

    /// Outcome recorded for `cfg_key`.
    pub fn outcome(&self, cfg_key: &CfgKey) -> Option<&EagerOutcome> {
        self.outcomes
            .iter()
            .find(|(k, _)| k == cfg_key)
            .map(|(_, o)| o)
    }

    fn count(&self, pred: impl Fn(&EagerOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Computes the default variants for newly uploaded images.
#[derive(Debug)]
pub struct EagerTransformer {
    materializer: Materializer,
    defaults: Vec<TransformConfig>,
    lease: chrono::Duration,
    budget: Duration,
}

impl EagerTransformer {
    pub fn new(deps: Collaborators, config: &ServiceConfig) -> Self {
        // Equal configs share a cfg key; compute each once.
        let mut seen = HashSet::new();
        let defaults = config
            .default_transformations
            .iter()
            .filter(|c| seen.insert(c.cfg_key()))
            .copied()
            .collect();
        Self {
            materializer: Materializer::new(deps),
            defaults,
            lease: to_chrono(config.pending_lease()),
            budget: config.invocation_timeout(),
        }
    }

    pub fn defaults(&self) -> &[TransformConfig] {
        &self.defaults
    }

    /// Handle one raw-created event.
    ///
    /// Fails as a whole only when the raw image cannot be read; per-config
    /// failures are reported in the returned [`EagerReport`].
    pub async fn handle(&self, event: &RawCreatedEvent) -> Result<EagerReport, PipelineError> {
        with_budget(self.budget, self.handle_inner(event)).await
    }

    async fn handle_inner(&self, event: &RawCreatedEvent) -> Result<EagerReport, PipelineError> {
        let image_id = &event.image_id;
        let raw = self.materializer.read_raw(image_id).await?;

        let mut report = EagerReport::new(image_id.clone());
        for cfg in &self.defaults {
            let key = VariantKey::new(image_id.clone(), cfg.cfg_key());
            let outcome = match self.process(&key, cfg, raw.clone()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(
                        image_id = %key.image_id,
                        cfg_key = %key.cfg_key,
                        error = %e,
                        kind = e.kind(),
                        "eager variant failed"
                    );
                    EagerOutcome::Failed(e)
                }
            };
            report.outcomes.push((key.cfg_key, outcome));
        }

        tracing::info!(
            image_id = %image_id,
            computed = report.computed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "eager transform finished"
        );
        Ok(report)
    }

    async fn process(
        &self,
        key: &VariantKey,
        cfg: &TransformConfig,
        raw: Bytes,
    ) -> Result<EagerOutcome, PipelineError> {
        let Some(claim) = self.materializer.claim(key, self.lease).await? else {
            tracing::debug!(image_id = %key.image_id, cfg_key = %key.cfg_key, "variant already indexed");
            return Ok(EagerOutcome::Skipped);
        };

        match self.materializer.compute(key, cfg, raw, Trigger::Eager).await {
            Ok(_) => {
                claim.disarm();
                Ok(EagerOutcome::Computed)
            }
            Err(e) => {
                claim.release().await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{cfg, config, CountingTransform, Fixture};
    use chrono::Utc;
    use imgsvc_core::VariantState;
    use imgsvc_store::VariantIndex;

    fn transformer(fx: &Fixture, defaults: &[&str]) -> EagerTransformer {
        let config = ServiceConfig {
            default_transformations: defaults.iter().map(|q| cfg(q)).collect(),
            ..config()
        };
        EagerTransformer::new(fx.collaborators(), &config)
    }

    fn event(image_id: &ImageId) -> RawCreatedEvent {
        RawCreatedEvent {
            image_id: image_id.clone(),
            key: image_id.to_string(),
        }
    }

    #[tokio::test]
    async fn computes_default_variants() {
        let fx = Fixture::new();
        let id = fx.seed_raw("img-1", b"raw").await;
        let eager = transformer(&fx, &["w=100&h=100&fmt=webp"]);

        let report = eager.handle(&event(&id)).await.unwrap();

        assert_eq!(report.computed(), 1);
        assert!(fx.formatted.inner.contains("img-1/100x100-webp"));
        let key = VariantKey::new(id, cfg("w=100&h=100&fmt=webp").cfg_key());
        let entry = fx.index.get(&key).await.unwrap().unwrap();
        let variant = entry.as_ready().unwrap();
        assert_eq!(variant.storage_location, "img-1/100x100-webp");
        assert_eq!(variant.content_type, "image/webp");
        assert_eq!(variant.size_bytes, b"100x100-webp:raw".len() as u64);
    }

    #[tokio::test]
    async fn redelivery_is_idempotent() {
        let fx = Fixture::new();
        let id = fx.seed_raw("img-1", b"raw").await;
        let eager = transformer(&fx, &["w=100&h=100&fmt=webp", "w=50&h=50"]);

        eager.handle(&event(&id)).await.unwrap();
        let entries_after_first = fx.index.inner.snapshot();
        let writes_after_first = fx.formatted.inner.put_count();

        let second = eager.handle(&event(&id)).await.unwrap();

        assert_eq!(second.skipped(), 2);
        assert_eq!(second.computed(), 0);
        assert_eq!(fx.transform.calls(), 2);
        assert_eq!(fx.formatted.inner.put_count(), writes_after_first);
        assert_eq!(fx.index.inner.snapshot(), entries_after_first);
    }

    #[tokio::test]
    async fn duplicate_defaults_are_computed_once() {
        let fx = Fixture::new();
        let id = fx.seed_raw("img-1", b"raw").await;
        let eager = transformer(&fx, &["w=10&h=10&fmt=jpg", "fmt=JPEG&q=85&h=10&w=10"]);
        assert_eq!(eager.defaults().len(), 1);

        let report = eager.handle(&event(&id)).await.unwrap();
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(fx.transform.calls(), 1);
    }

    #[tokio::test]
    async fn missing_raw_fails_the_event() {
        let fx = Fixture::new();
        let eager = transformer(&fx, &["w=10&h=10"]);
        let err = eager
            .handle(&event(&ImageId::parse("img-missing").unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
        assert!(fx.index.inner.is_empty());
        assert_eq!(fx.transform.calls(), 0);
    }

    #[tokio::test]
    async fn failing_config_does_not_block_others() {
        let fx = Fixture::new();
        let id = fx.seed_raw("img-1", b"raw").await;
        let eager = transformer(&fx, &["w=10&h=10", "w=20&h=20"]);

        let k10 = cfg("w=10&h=10").cfg_key();
        let k20 = cfg("w=20&h=20").cfg_key();
        fx.formatted.fail_puts(true);
        let report = eager.handle(&event(&id)).await.unwrap();
        assert_eq!(report.failed(), 2);
        assert!(report.has_retryable_failures());
        // Failed claims are released, leaving no index entries.
        assert!(fx.index.inner.is_empty());

        fx.formatted.fail_puts(false);
        let retry = eager.handle(&event(&id)).await.unwrap();
        assert_eq!(retry.outcome(&k10), Some(&EagerOutcome::Computed));
        assert_eq!(retry.outcome(&k20), Some(&EagerOutcome::Computed));
    }

    #[tokio::test]
    async fn undecodable_raw_is_reported_per_config() {
        let fx = Fixture::new();
        let id = fx.seed_raw("img-bad", b"corrupt bytes").await;
        let eager = transformer(&fx, &["w=10&h=10"]);
        let report = eager.handle(&event(&id)).await.unwrap();
        match &report.outcomes[0].1 {
            EagerOutcome::Failed(PipelineError::Transform(_)) => {}
            other => panic!("expected transform failure, got {other:?}"),
        }
        assert!(!report.has_retryable_failures());
        assert!(fx.index.inner.is_empty());
    }

    #[tokio::test]
    async fn index_failure_after_store_leaves_no_ready_entry() {
        let fx = Fixture::new();
        let id = fx.seed_raw("img-1", b"raw").await;
        let eager = transformer(&fx, &["w=10&h=10"]);

        fx.index.fail_put_ready(true);
        let report = eager.handle(&event(&id)).await.unwrap();
        assert_eq!(report.failed(), 1);

        // The object landed, the ready entry did not, and the claim was released.
        assert!(fx.formatted.inner.contains("img-1/10x10-png"));
        let key = VariantKey::new(id.clone(), cfg("w=10&h=10").cfg_key());
        assert!(fx.index.get(&key).await.unwrap().is_none());

        fx.index.fail_put_ready(false);
        eager.handle(&event(&id)).await.unwrap();
        let entry = fx.index.get(&key).await.unwrap().unwrap();
        assert!(matches!(entry.state, VariantState::Ready(_)));
    }

    #[tokio::test]
    async fn live_pending_claim_is_skipped() {
        let fx = Fixture::new();
        let id = fx.seed_raw("img-1", b"raw").await;
        let eager = transformer(&fx, &["w=10&h=10"]);
        let key = VariantKey::new(id.clone(), cfg("w=10&h=10").cfg_key());
        fx.index
            .try_claim(&key, Utc::now(), chrono::Duration::seconds(60))
            .await
            .unwrap();

        let report = eager.handle(&event(&id)).await.unwrap();
        assert_eq!(report.skipped(), 1);
        assert_eq!(fx.transform.calls(), 0);
    }

    #[tokio::test]
    async fn expired_claim_is_recomputed() {
        let fx = Fixture::new();
        let id = fx.seed_raw("img-1", b"raw").await;
        let eager = transformer(&fx, &["w=10&h=10"]);
        let key = VariantKey::new(id.clone(), cfg("w=10&h=10").cfg_key());
        fx.index
            .try_claim(
                &key,
                Utc::now() - chrono::Duration::minutes(5),
                chrono::Duration::seconds(60),
            )
            .await
            .unwrap();

        let report = eager.handle(&event(&id)).await.unwrap();
        assert_eq!(report.computed(), 1);
    }

    #[tokio::test]
    async fn timed_out_event_releases_its_claim() {
        let fx = Fixture::with_transform(CountingTransform::slow_first(Duration::from_millis(1500)));
        let id = fx.seed_raw("img-1", b"raw").await;
        let config = ServiceConfig {
            default_transformations: vec![cfg("w=10&h=10")],
            invocation_timeout_secs: 1,
            ..config()
        };
        let eager = EagerTransformer::new(fx.collaborators(), &config);

        let err = eager.handle(&event(&id)).await.unwrap_err();
        assert_eq!(err, PipelineError::TimedOut(Duration::from_secs(1)));
        // The release runs on a spawned task.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let key = VariantKey::new(id.clone(), cfg("w=10&h=10").cfg_key());
        assert!(fx.index.get(&key).await.unwrap().is_none());

        let redelivered = eager.handle(&event(&id)).await.unwrap();
        assert_eq!(redelivered.computed(), 1);
        assert_eq!(fx.formatted.inner.keys(), vec!["img-1/10x10-png"]);
    }
}
