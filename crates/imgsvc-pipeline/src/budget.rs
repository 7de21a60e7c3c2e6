//! # Invocation Budget
//!
//! Upload, eager and on-demand invocations each run under a wall-clock
//! budget. Exceeding it drops the in-flight work and reports
//! [`PipelineError::TimedOut`], which callers may retry.

use std::future::Future;
use std::time::Duration;

use imgsvc_core::PipelineError;

/// Run `fut` to completion or fail with `TimedOut` after `budget`.
pub async fn with_budget<T, F>(budget: Duration, fut: F) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(budget_ms = budget.as_millis() as u64, "invocation budget exceeded");
            Err(PipelineError::TimedOut(budget))
        }
    }
}

/// Convert a configured duration for timestamp arithmetic, saturating at
/// ten years.
pub(crate) fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d)
        .ok()
        .filter(|d| *d <= chrono::Duration::days(3650))
        .unwrap_or_else(|| chrono::Duration::days(3650))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_within_budget() {
        let out = with_budget(Duration::from_secs(1), async { Ok::<_, PipelineError>(7) }).await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_work_times_out() {
        let out = with_budget(Duration::from_millis(100), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, PipelineError>(())
        })
        .await;
        assert_eq!(out, Err(PipelineError::TimedOut(Duration::from_millis(100))));
    }

    #[tokio::test]
    async fn inner_error_passes_through() {
        let out: Result<(), _> = with_budget(Duration::from_secs(1), async {
            Err(PipelineError::NotFound("img".into()))
        })
        .await;
        assert_eq!(out, Err(PipelineError::NotFound("img".into())));
    }
}
