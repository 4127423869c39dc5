//! Delivers committed units to the publisher, oldest first, and retires them.

use skyrelay_core::{
    truncate_summary, CoreError, ErrorExt, GlobalConfig, PublishRequest, Publisher, RetryPolicy,
    Unit,
};
use std::sync::Arc;
use tracing::{debug, info, warn};
use unit_store::UnitStore;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub published: usize,
    pub corrupt: usize,
    pub failed: usize,
    /// Units left for a later run because the run stopped early.
    pub deferred: usize,
}

pub struct PublishPipeline {
    publisher: Arc<dyn Publisher>,
    store: Arc<dyn UnitStore>,
    retry: RetryPolicy,
    summary_max_chars: usize,
    max_per_run: Option<usize>,
}

impl PublishPipeline {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        store: Arc<dyn UnitStore>,
        retry: RetryPolicy,
        summary_max_chars: usize,
        max_per_run: Option<usize>,
    ) -> Self {
        Self {
            publisher,
            store,
            retry,
            summary_max_chars,
            max_per_run,
        }
    }

    pub fn from_config(
        publisher: Arc<dyn Publisher>,
        store: Arc<dyn UnitStore>,
        config: &GlobalConfig,
    ) -> Self {
        Self::new(
            publisher,
            store,
            RetryPolicy::from_config(config),
            config.summary_max_chars,
            config.max_posts_per_publish_run,
        )
    }

    fn request_for(&self, unit: Unit) -> PublishRequest {
        let text = unit
            .summary
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| truncate_summary(&unit.title, self.summary_max_chars));
        PublishRequest {
            unit_id: unit.unit_id,
            text,
            media: unit.media,
        }
    }

    /// Publishes pending units one at a time in creation order.
    ///
    /// A unit is deleted only after the publisher confirms it. Once a
    /// transient failure outlives its retries the run stops, so nothing newer
    /// overtakes it; a permanent failure leaves the unit in place and moves on.
    pub async fn publish_pending(&self) -> Result<PublishReport, CoreError> {
        let pending = self.store.list_pending().await?;
        info!("{} units pending publication", pending.len());

        let mut report = PublishReport::default();
        for (position, unit_id) in pending.iter().enumerate() {
            if self.max_per_run.is_some_and(|max| report.published >= max) {
                report.deferred = pending.len() - position;
                info!("Publish cap reached, {} units wait for the next run", report.deferred);
                break;
            }

            let unit = match self.store.open(unit_id).await {
                Ok(unit) => unit,
                Err(e) => {
                    warn!("Skipping unreadable unit {}: {} (left for inspection)", unit_id, e);
                    report.corrupt += 1;
                    continue;
                }
            };

            let request = self.request_for(unit);
            let operation = format!("publish {}", unit_id);
            match self
                .retry
                .execute(&operation, || self.publisher.publish(&request))
                .await
            {
                Ok(receipt) => {
                    debug!("{} published at {}", unit_id, receipt.uri);
                    self.store.delete(unit_id).await?;
                    report.published += 1;
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        "Publishing {} failed after {} attempts: {}; stopping this run",
                        unit_id,
                        self.retry.max_attempts(),
                        e
                    );
                    report.failed += 1;
                    report.deferred = pending.len() - position - 1;
                    break;
                }
                Err(e) => {
                    warn!("Publishing {} was refused: {}; leaving it pending", unit_id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Publish run finished: {} published, {} failed, {} corrupt",
            report.published, report.failed, report.corrupt
        );
        Ok(report)
    }
}
