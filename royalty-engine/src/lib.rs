//! royalty-engine library interface
//!
//! Settles royalty statements from performing-rights organizations into
//! per-writer ledger entries and credits writer balances when a statement
//! is paid.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::config::SettlementSettings;
pub use crate::error::{EngineError, EngineResult, PreconditionViolation};

use chrono::{DateTime, Utc};
use royalty_common::db::PoolSettings;
use royalty_common::events::EventBus;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;

use crate::services::{
    Catalog, EventBusNotifier, Notifier, PaymentProcessor, PolicyAdmin, PublishOrchestrator, WriterResolver,
};

/// Event bus capacity for settlement events
pub const EVENT_BUS_CAPACITY: usize = 100;

/// Engine state shared by every entry point
pub struct RoyaltyEngine {
    /// Database connection pool
    pub db: SqlitePool,
    pub settings: SettlementSettings,
    /// Settlement events (publish, queue, payment, writer notifications)
    pub event_bus: EventBus,
    pub publisher: PublishOrchestrator,
    pub payments: PaymentProcessor,
    pub commission: PolicyAdmin,
    pub catalog: Catalog,
    pub startup_time: DateTime<Utc>,
}

impl RoyaltyEngine {
    /// Wire services over an open pool, notifying through the event bus
    pub fn new(db: SqlitePool, settings: SettlementSettings, event_bus: EventBus) -> Self {
        let notifier: Arc<dyn Notifier> = Arc::new(EventBusNotifier::new(event_bus.clone()));
        Self::with_notifier(db, settings, event_bus, notifier)
    }

    /// Wire services with a custom post-commit notifier
    pub fn with_notifier(
        db: SqlitePool,
        settings: SettlementSettings,
        event_bus: EventBus,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let resolver = WriterResolver::sqlite(db.clone(), &settings.platform_publisher_ipis);
        Self {
            publisher: PublishOrchestrator::new(db.clone(), settings.clone(), resolver, event_bus.clone()),
            payments: PaymentProcessor::new(db.clone(), settings.clone(), notifier, event_bus.clone()),
            commission: PolicyAdmin::new(db.clone()),
            catalog: Catalog::new(db.clone()),
            db,
            settings,
            event_bus,
            startup_time: Utc::now(),
        }
    }

    /// Open (or create) the database at `db_path` and wire the engine
    pub async fn open(db_path: &Path, settings: SettlementSettings) -> EngineResult<Self> {
        settings.validate()?;
        let pool = db::init_database_pool(db_path, &PoolSettings::default()).await?;
        Ok(Self::new(pool, settings, EventBus::new(EVENT_BUS_CAPACITY)))
    }
}
