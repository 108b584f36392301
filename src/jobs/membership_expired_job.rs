use super::scheduler::{LockOptions, ScheduledJob, SweepReport};
use crate::{config::JobConfig, error::Result, services::MembershipService};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Renews elapsed memberships on the free plan
pub struct MembershipExpiredJob {
    membership_service: Arc<MembershipService>,
    config: JobConfig,
}

impl MembershipExpiredJob {
    pub fn new(membership_service: Arc<MembershipService>, config: JobConfig) -> Self {
        Self {
            membership_service,
            config,
        }
    }
}

#[async_trait]
impl ScheduledJob for MembershipExpiredJob {
    fn name(&self) -> &'static str {
        "membership_expired"
    }

    fn spec(&self) -> &str {
        &self.config.spec
    }

    fn lock_opts(&self) -> LockOptions {
        self.config.lock_options()
    }

    async fn run(&self) -> Result<SweepReport> {
        let memberships = self
            .membership_service
            .get_account_expired_list(self.config.membership_type, self.config.batch_size)
            .await?;

        let mut report = SweepReport::default();
        for membership in memberships {
            let outcome = self
                .membership_service
                .handle_account_expired(membership.id, membership.user_id)
                .await;
            if let Err(e) = &outcome {
                warn!(
                    membership_id = %membership.id,
                    user_id = %membership.user_id,
                    "Failed to renew expired membership: {}",
                    e
                );
            }
            report.record(&outcome);
        }
        Ok(report)
    }
}
