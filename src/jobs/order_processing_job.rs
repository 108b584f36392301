use super::scheduler::{LockOptions, ScheduledJob, SweepReport};
use crate::{config::JobConfig, error::Result, services::OrderService};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Orders younger than this may still be completing inline
const STALE_AFTER_MINUTES: i64 = 5;

/// Finishes paid orders whose grant never completed
pub struct OrderProcessingJob {
    order_service: Arc<OrderService>,
    config: JobConfig,
}

impl OrderProcessingJob {
    pub fn new(order_service: Arc<OrderService>, config: JobConfig) -> Self {
        Self {
            order_service,
            config,
        }
    }
}

#[async_trait]
impl ScheduledJob for OrderProcessingJob {
    fn name(&self) -> &'static str {
        "order_processing"
    }

    fn spec(&self) -> &str {
        &self.config.spec
    }

    fn lock_opts(&self) -> LockOptions {
        self.config.lock_options()
    }

    async fn run(&self) -> Result<SweepReport> {
        let stale_before =
            time::OffsetDateTime::now_utc() - time::Duration::minutes(STALE_AFTER_MINUTES);
        let orders = self
            .order_service
            .get_unfinished_list(stale_before, self.config.batch_size)
            .await?;

        let mut report = SweepReport::default();
        for order in orders {
            let outcome = self.order_service.do_order_processing_handler(order.id).await;
            if let Err(e) = &outcome {
                warn!(order_id = %order.id, "Failed to finish order: {}", e);
            }
            report.record(&outcome);
        }
        Ok(report)
    }
}
