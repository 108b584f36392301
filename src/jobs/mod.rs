// Scheduled reconciliation
pub mod confirm_expired_job;
pub mod lock;
pub mod membership_expired_job;
pub mod order_processing_job;
pub mod scheduler;

pub use confirm_expired_job::ConfirmExpiredJob;
pub use lock::{JobLock, LocalJobLock, RedisJobLock};
pub use membership_expired_job::MembershipExpiredJob;
pub use order_processing_job::OrderProcessingJob;
pub use scheduler::{run_once, LockOptions, ScheduledJob, Scheduler, SweepReport};

use crate::config::JobConfig;
use std::time::Duration;

impl JobConfig {
    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            key: self.lock_key.clone(),
            expiry: Duration::from_secs(self.lock_expiry_secs),
        }
    }
}
