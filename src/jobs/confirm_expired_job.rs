use super::scheduler::{LockOptions, ScheduledJob, SweepReport};
use crate::{config::JobConfig, error::Result, services::CreditPaymentService};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Confirms payment sessions whose confirmation window passed without a decision
pub struct ConfirmExpiredJob {
    credit_payment_service: Arc<CreditPaymentService>,
    config: JobConfig,
}

impl ConfirmExpiredJob {
    pub fn new(credit_payment_service: Arc<CreditPaymentService>, config: JobConfig) -> Self {
        Self {
            credit_payment_service,
            config,
        }
    }
}

#[async_trait]
impl ScheduledJob for ConfirmExpiredJob {
    fn name(&self) -> &'static str {
        "credit_pay_confirm_expired"
    }

    fn spec(&self) -> &str {
        &self.config.spec
    }

    fn lock_opts(&self) -> LockOptions {
        self.config.lock_options()
    }

    async fn run(&self) -> Result<SweepReport> {
        // Outbox rows left unapplied by a crash move their sessions first
        match self
            .credit_payment_service
            .redeliver_pending(None, self.config.batch_size)
            .await
        {
            Ok(0) => {}
            Ok(applied) => info!(applied, "Applied pending credit pay events"),
            Err(e) => warn!("Outbox redelivery failed: {}", e),
        }

        let records = self
            .credit_payment_service
            .get_confirm_expired_list(self.config.batch_size)
            .await?;

        let mut report = SweepReport::default();
        for record in records {
            let outcome = self.credit_payment_service.confirm(Some(record.id)).await;
            if let Err(e) = &outcome {
                warn!(record_id = %record.id, "Failed to confirm expired session: {}", e);
            }
            report.record(&outcome);
        }
        Ok(report)
    }
}
