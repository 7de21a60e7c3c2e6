//! # Eager Worker
//!
//! Drains raw-created events and hands each to the [`EagerTransformer`] as
//! an independent task. Whole-event failures that are retryable, and reports
//! containing retryable per-config failures, are redelivered with
//! exponential backoff. Permanent failures are logged and dropped.

use std::sync::Arc;

use imgsvc_core::PipelineError;
use imgsvc_store::RawCreatedEvent;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::eager::{EagerReport, EagerTransformer};
use crate::retry::RetryPolicy;

/// Consumes the raw-created notification channel.
#[derive(Debug, Clone)]
pub struct EagerWorker {
    transformer: Arc<EagerTransformer>,
    retry: RetryPolicy,
}

impl EagerWorker {
    pub fn new(transformer: Arc<EagerTransformer>, retry: RetryPolicy) -> Self {
        Self { transformer, retry }
    }

    /// Run on a background task until the channel closes.
    pub fn spawn(self, events: mpsc::UnboundedReceiver<RawCreatedEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    /// Process events until every sender is dropped, then wait for the
    /// in-flight ones to finish.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<RawCreatedEvent>) {
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        let worker = self.clone();
                        tasks.spawn(async move {
                            let _ = worker.process(event).await;
                        });
                    }
                    None => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "eager task panicked");
                    }
                }
            }
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "eager task panicked");
            }
        }
        tracing::info!("raw-created channel closed; eager worker stopped");
    }

    /// Handle one event with retries.
    pub async fn process(&self, event: RawCreatedEvent) -> Result<EagerReport, PipelineError> {
        let result = self
            .retry
            .run(|attempt| {
                let event = event.clone();
                async move {
                    let report = self.transformer.handle(&event).await?;
                    if report.has_retryable_failures() && attempt < self.retry.max_attempts {
                        return Err(PipelineError::TransientStore(format!(
                            "{} of {} variants failed transiently",
                            report.failed(),
                            report.outcomes.len()
                        )));
                    }
                    Ok(report)
                }
            })
            .await;

        if let Err(e) = &result {
            tracing::error!(
                image_id = %event.image_id,
                kind = e.kind(),
                error = %e,
                "eager transform abandoned"
            );
        }
        result
    }
}
