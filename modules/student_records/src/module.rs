use std::sync::Arc;

use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;
use tracing::{debug, info};

use crate::config::StudentRecordsConfig;
use crate::contract::client::StudentRecordsApi;
use crate::domain::clock::{Clock, SystemClock};
use crate::domain::events::{StudentDomainEvent, TracingEventPublisher};
use crate::domain::ports::{AdminDirectory, EventPublisher};
use crate::domain::protection::AdminAccountGuard;
use crate::domain::purge::{RetentionPurgeScheduler, StopReason};
use crate::domain::repo::StudentsRepository;
use crate::domain::service::{LifecycleEngine, ServiceConfig};
use crate::gateways::local::StudentRecordsLocalClient;
use crate::infra::storage::{Migrator, SeaOrmAdminDirectory, SeaOrmStudentsRepository};

/// Wired student_records module: engine, local client and purge scheduler.
pub struct StudentRecords {
    config: StudentRecordsConfig,
    engine: LifecycleEngine,
    client: Arc<StudentRecordsLocalClient>,
    scheduler: RetentionPurgeScheduler,
}

impl StudentRecords {
    /// Create or upgrade the module's tables.
    pub async fn migrate(db: &DatabaseConnection) -> anyhow::Result<()> {
        info!("Running student_records database migrations");
        Migrator::up(db, None).await?;
        info!("student_records migrations completed");
        Ok(())
    }

    /// Wire the module against a SeaORM connection.
    pub fn build(db: DatabaseConnection, config: StudentRecordsConfig) -> anyhow::Result<Self> {
        let repo = SeaOrmStudentsRepository::new(db.clone());
        let admins = SeaOrmAdminDirectory::new(db);
        Self::from_parts(
            Arc::new(repo),
            Arc::new(admins),
            Arc::new(SystemClock),
            Arc::new(TracingEventPublisher),
            config,
        )
    }

    /// Wire the module from arbitrary port implementations.
    pub fn from_parts(
        repo: Arc<dyn StudentsRepository>,
        admins: Arc<dyn AdminDirectory>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventPublisher<StudentDomainEvent>>,
        config: StudentRecordsConfig,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        debug!(
            retention_days = config.retention_days,
            purge_interval = ?config.purge_interval,
            scheduler_enabled = config.scheduler_enabled,
            "Loaded student_records config"
        );

        let guard = Arc::new(AdminAccountGuard::new(admins));
        let engine = LifecycleEngine::new(
            repo,
            guard,
            events,
            clock,
            ServiceConfig {
                retention_days: config.retention_days,
                deleted_listing_limit: config.deleted_listing_limit,
            },
        );
        let client = Arc::new(StudentRecordsLocalClient::new(engine.clone()));
        let scheduler = RetentionPurgeScheduler::new(engine.clone(), config.purge_interval);

        Ok(Self {
            config,
            engine,
            client,
            scheduler,
        })
    }

    pub fn config(&self) -> &StudentRecordsConfig {
        &self.config
    }

    pub fn engine(&self) -> &LifecycleEngine {
        &self.engine
    }

    pub fn client(&self) -> Arc<dyn StudentRecordsApi> {
        self.client.clone()
    }

    pub fn scheduler(&self) -> &RetentionPurgeScheduler {
        &self.scheduler
    }

    /// Start background work. A no-op when the scheduler is disabled.
    pub fn start(&self) -> anyhow::Result<()> {
        if !self.config.scheduler_enabled {
            info!("purge scheduler disabled by configuration");
            return Ok(());
        }
        self.scheduler.start()?;
        Ok(())
    }

    pub async fn stop(&self) -> StopReason {
        self.scheduler.stop(self.config.scheduler_stop_timeout).await
    }
}
