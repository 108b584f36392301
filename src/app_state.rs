use crate::{
    config::Config,
    jobs::{
        ConfirmExpiredJob, JobLock, MembershipExpiredJob, OrderProcessingJob, RedisJobLock,
        Scheduler,
    },
    services::Services,
};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, DatabaseConnection};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub services: Services,
    pub scheduler: Arc<Scheduler>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        // Connect to database
        let mut options = ConnectOptions::new(config.database.url.clone());
        if let Some(max_connections) = config.database.max_connections {
            options.max_connections(max_connections);
        }
        options.sqlx_logging(false);
        let db = sea_orm::Database::connect(options).await?;

        if config.database.run_migrations {
            Migrator::up(&db, None).await?;
            tracing::info!("Database migrations applied");
        }

        // Job locks live in Redis so only one instance sweeps at a time
        let redis = Arc::new(redis::Client::open(config.redis.url.as_str())?);
        let lock: Arc<dyn JobLock> = Arc::new(RedisJobLock::new(redis));

        Self::with_connection(db, config, lock).await
    }

    /// Build services and the scheduler on an existing connection
    pub async fn with_connection(
        db: DatabaseConnection,
        config: Config,
        lock: Arc<dyn JobLock>,
    ) -> Result<Self, anyhow::Error> {
        let services = Services::build(db.clone(), &config).await;

        let mut scheduler = Scheduler::new(lock);
        let jobs = &config.jobs;
        if jobs.credit_pay_confirm_expired.enabled {
            scheduler.register(Arc::new(ConfirmExpiredJob::new(
                services.credit_payment.clone(),
                jobs.credit_pay_confirm_expired.clone(),
            )))?;
        }
        if jobs.membership_expired.enabled {
            scheduler.register(Arc::new(MembershipExpiredJob::new(
                services.membership.clone(),
                jobs.membership_expired.clone(),
            )))?;
        }
        if jobs.order_processing.enabled {
            scheduler.register(Arc::new(OrderProcessingJob::new(
                services.order.clone(),
                jobs.order_processing.clone(),
            )))?;
        }

        Ok(Self {
            db,
            services,
            scheduler: Arc::new(scheduler),
            config: Arc::new(config),
        })
    }
}
