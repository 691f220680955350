//! Database initialization
//!
//! Opens (or creates) the SQLite database and creates every settlement table
//! idempotently. Safe to call on every startup.
//!
//! Monetary columns are stored as canonical decimal TEXT and parsed into
//! `rust_decimal::Decimal` on read; REAL is never used for money.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Current schema version recorded in `schema_version`
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// Pool tuning for `init_database`
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub busy_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            busy_timeout: Duration::from_millis(250),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Open or create the database and create tables if needed
pub async fn init_database(db_path: &Path, settings: &PoolSettings) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Per-connection pragmas go through connect options so every pooled
    // connection gets them, not only the first one.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(settings.busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all settlement tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_writers_table(pool).await?;
    create_placements_tables(pool).await?;
    create_commission_tables(pool).await?;
    create_statements_table(pool).await?;
    create_statement_items_table(pool).await?;
    create_balance_tables(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(CURRENT_SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Writer identities plus the balance fields only payment may mutate
async fn create_writers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS writers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            writer_ipi TEXT,
            publisher_ipi TEXT,
            pro_affiliation TEXT,
            commission_override_rate TEXT,
            available_balance TEXT NOT NULL DEFAULT '0',
            lifetime_earnings TEXT NOT NULL DEFAULT '0',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_writers_pro ON writers(pro_affiliation)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Authoritative placement registry (read-only for the engine)
async fn create_placements_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS placements (
            id TEXT PRIMARY KEY,
            work_title TEXT NOT NULL,
            normalized_title TEXT NOT NULL,
            publisher_ipi TEXT,
            dsp_name TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_placements_title ON placements(normalized_title)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS placement_credits (
            placement_id TEXT NOT NULL REFERENCES placements(id) ON DELETE CASCADE,
            writer_id TEXT NOT NULL REFERENCES writers(id),
            split_percentage TEXT NOT NULL,
            writer_ipi TEXT,
            PRIMARY KEY (placement_id, writer_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_commission_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS commission_policies (
            id TEXT PRIMARY KEY,
            rate TEXT NOT NULL,
            effective_from TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS commission_redemptions (
            id TEXT PRIMARY KEY,
            writer_id TEXT NOT NULL REFERENCES writers(id),
            reduced_rate TEXT NOT NULL,
            status TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            expires_at TEXT NOT NULL,
            consumed_statement_id TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_redemptions_writer ON commission_redemptions(writer_id, is_active)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_statements_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS statements (
            id TEXT PRIMARY KEY,
            pro_type TEXT NOT NULL,
            period TEXT,
            status TEXT NOT NULL,
            payment_status TEXT NOT NULL,
            total_revenue TEXT NOT NULL DEFAULT '0',
            total_commission TEXT NOT NULL DEFAULT '0',
            total_net TEXT NOT NULL DEFAULT '0',
            row_count INTEGER NOT NULL DEFAULT 0,
            metadata TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            published_at TEXT,
            paid_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Ledger entries; cascade with their statement
async fn create_statement_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS statement_items (
            id TEXT PRIMARY KEY,
            statement_id TEXT NOT NULL REFERENCES statements(id) ON DELETE CASCADE,
            row_index INTEGER NOT NULL,
            work_key TEXT NOT NULL,
            work_title TEXT NOT NULL,
            writer_id TEXT NOT NULL REFERENCES writers(id),
            performances INTEGER NOT NULL DEFAULT 0,
            revenue TEXT NOT NULL,
            split_percentage TEXT NOT NULL,
            commission_rate TEXT NOT NULL,
            commission_amount TEXT NOT NULL,
            net_revenue TEXT NOT NULL,
            is_visible_to_writer INTEGER NOT NULL DEFAULT 0,
            paid_at TEXT,
            created_at TEXT NOT NULL,
            UNIQUE (statement_id, row_index, writer_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_statement_items_writer ON statement_items(writer_id, statement_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Audit trail for balance credits and commission refunds
async fn create_balance_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS balance_transactions (
            id TEXT PRIMARY KEY,
            writer_id TEXT NOT NULL REFERENCES writers(id),
            statement_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            amount TEXT NOT NULL,
            balance_after TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (writer_id, statement_id, kind)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS commission_refunds (
            id TEXT PRIMARY KEY,
            statement_id TEXT NOT NULL,
            writer_id TEXT NOT NULL REFERENCES writers(id),
            redemption_id TEXT NOT NULL REFERENCES commission_redemptions(id),
            amount TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
