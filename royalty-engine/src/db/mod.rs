//! Database access for royalty-engine
//!
//! Single-statement helpers take any `SqliteExecutor` so they run against
//! the pool or inside a transaction. Helpers that issue several statements
//! take `&mut SqliteConnection` and are called with a transaction's
//! connection.

pub mod balances;
pub mod commission;
pub mod ledger_entries;
pub mod placements;
pub mod statements;
pub mod writers;

use chrono::{DateTime, SecondsFormat, Utc};
use royalty_common::db::PoolSettings;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// Open the settlement database, creating tables if needed
pub async fn init_database_pool(db_path: &Path, settings: &PoolSettings) -> EngineResult<SqlitePool> {
    tracing::debug!("Connecting to database: {}", db_path.display());
    let pool = royalty_common::db::init_database(db_path, settings).await?;
    Ok(pool)
}

/// Canonical timestamp text (UTC, `Z` suffix) so string order is time order
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn corrupt(column: &str, detail: impl std::fmt::Display) -> EngineError {
    EngineError::Common(royalty_common::Error::Internal(format!(
        "Corrupt value in column {}: {}",
        column, detail
    )))
}

pub(crate) fn decimal_col(row: &SqliteRow, column: &str) -> EngineResult<Decimal> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| corrupt(column, e))
}

pub(crate) fn opt_decimal_col(row: &SqliteRow, column: &str) -> EngineResult<Option<Decimal>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| Decimal::from_str(&s).map_err(|e| corrupt(column, e)))
        .transpose()
}

pub(crate) fn uuid_col(row: &SqliteRow, column: &str) -> EngineResult<Uuid> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).map_err(|e| corrupt(column, e))
}

pub(crate) fn opt_uuid_col(row: &SqliteRow, column: &str) -> EngineResult<Option<Uuid>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| Uuid::parse_str(&s).map_err(|e| corrupt(column, e)))
        .transpose()
}

pub(crate) fn ts_col(row: &SqliteRow, column: &str) -> EngineResult<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    parse_ts(&raw).map_err(|e| corrupt(column, e))
}

pub(crate) fn opt_ts_col(row: &SqliteRow, column: &str) -> EngineResult<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| parse_ts(&s).map_err(|e| corrupt(column, e)))
        .transpose()
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}
