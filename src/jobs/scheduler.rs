use super::lock::JobLock;
use crate::error::{ApiError, Result};
use async_trait::async_trait;
use chrono::Utc;
use cron::Schedule;
use futures::FutureExt;
use std::{panic::AssertUnwindSafe, str::FromStr, sync::Arc, time::Duration};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, info_span, warn, Instrument};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    pub key: String,
    pub expiry: Duration,
}

/// Outcome of one sweep over a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl SweepReport {
    pub fn record<T>(&mut self, outcome: &Result<T>) {
        self.scanned += 1;
        match outcome {
            Ok(_) => self.succeeded += 1,
            Err(_) => self.failed += 1,
        }
    }
}

#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &'static str;

    /// Six-field cron expression, seconds first
    fn spec(&self) -> &str;

    fn lock_opts(&self) -> LockOptions;

    async fn run(&self) -> Result<SweepReport>;
}

/// Runs each registered job on its cron schedule, one instance at a time
pub struct Scheduler {
    lock: Arc<dyn JobLock>,
    jobs: Vec<(Arc<dyn ScheduledJob>, Schedule)>,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(lock: Arc<dyn JobLock>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            lock,
            jobs: Vec::new(),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&mut self, job: Arc<dyn ScheduledJob>) -> Result<()> {
        let schedule = Schedule::from_str(job.spec()).map_err(|e| {
            ApiError::Internal(anyhow::anyhow!(
                "Invalid cron spec {:?} for job {}: {}",
                job.spec(),
                job.name(),
                e
            ))
        })?;
        info!(job = job.name(), spec = job.spec(), "Registered job");
        self.jobs.push((job, schedule));
        Ok(())
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Spawn one task per job
    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        for (job, schedule) in &self.jobs {
            let job = job.clone();
            let schedule = schedule.clone();
            let lock = self.lock.clone();
            let mut shutdown_rx = self.shutdown_tx.subscribe();

            let span = info_span!("job", job = job.name());
            handles.push(tokio::spawn(
                async move {
                    loop {
                        let Some(next) = schedule.upcoming(Utc).next() else {
                            warn!("Schedule has no upcoming fire time");
                            break;
                        };
                        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

                        tokio::select! {
                            _ = tokio::time::sleep(wait) => {
                                if let Err(e) = run_once(lock.as_ref(), job.as_ref()).await {
                                    error!("Job tick failed: {}", e);
                                }
                            }
                            _ = shutdown_rx.changed() => break,
                        }
                    }
                    debug!("Job task stopped");
                }
                .instrument(span),
            ));
        }
        info!(jobs = handles.len(), "Scheduler started");
    }

    /// Signal every job task and wait for in-flight runs
    pub async fn shutdown(&self) {
        // send_replace does not fail when no task is listening
        self.shutdown_tx.send_replace(true);

        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, futures::future::join_all(handles)).await {
            Ok(_) => info!("Scheduler stopped"),
            Err(_) => warn!(
                timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                "Scheduler shutdown timed out"
            ),
        }
    }
}

/// One lock-guarded run. `Ok(None)` when another holder has the lock.
pub async fn run_once(lock: &dyn JobLock, job: &dyn ScheduledJob) -> Result<Option<SweepReport>> {
    let opts = job.lock_opts();
    let Some(token) = lock.try_acquire(&opts.key, opts.expiry).await? else {
        debug!(job = job.name(), key = %opts.key, "Lock held elsewhere, skipping tick");
        return Ok(None);
    };

    let outcome = AssertUnwindSafe(job.run()).catch_unwind().await;

    if let Err(e) = lock.release(&opts.key, &token).await {
        warn!(job = job.name(), "Failed to release job lock: {}", e);
    }

    match outcome {
        Ok(Ok(report)) => {
            info!(
                job = job.name(),
                scanned = report.scanned,
                succeeded = report.succeeded,
                failed = report.failed,
                "Job run finished"
            );
            Ok(Some(report))
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(ApiError::Internal(anyhow::anyhow!(
            "Job {} panicked",
            job.name()
        ))),
    }
}
