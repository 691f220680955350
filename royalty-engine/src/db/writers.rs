//! Writer identity and override persistence
//!
//! Balance columns are written only by `db::balances`.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};
use std::collections::HashMap;
use uuid::Uuid;

use super::{decimal_col, format_ts, opt_decimal_col, uuid_col};
use crate::error::EngineResult;
use crate::models::{ProType, WriterBalance, WriterRecord};

const WRITER_COLUMNS: &str =
    "id, name, writer_ipi, publisher_ipi, pro_affiliation, commission_override_rate";

fn writer_from_row(row: &SqliteRow) -> EngineResult<WriterRecord> {
    let pro_affiliation: Option<String> = row.try_get("pro_affiliation")?;
    Ok(WriterRecord {
        id: uuid_col(row, "id")?,
        name: row.try_get("name")?,
        writer_ipi: row.try_get("writer_ipi")?,
        publisher_ipi: row.try_get("publisher_ipi")?,
        // Unknown affiliations load as None and fail the PRO gate
        pro_affiliation: pro_affiliation.and_then(|p| p.parse::<ProType>().ok()),
        commission_override_rate: opt_decimal_col(row, "commission_override_rate")?,
    })
}

/// Insert or update a writer's identity fields (balances untouched)
pub async fn upsert_writer<'e, E: SqliteExecutor<'e>>(
    executor: E,
    writer: &WriterRecord,
) -> EngineResult<()> {
    let now = format_ts(Utc::now());
    sqlx::query(
        r#"
        INSERT INTO writers (
            id, name, writer_ipi, publisher_ipi, pro_affiliation,
            commission_override_rate, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            writer_ipi = excluded.writer_ipi,
            publisher_ipi = excluded.publisher_ipi,
            pro_affiliation = excluded.pro_affiliation,
            commission_override_rate = excluded.commission_override_rate,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(writer.id.to_string())
    .bind(&writer.name)
    .bind(&writer.writer_ipi)
    .bind(&writer.publisher_ipi)
    .bind(writer.pro_affiliation.map(|p| p.as_str()))
    .bind(writer.commission_override_rate.map(|r| r.to_string()))
    .bind(&now)
    .bind(&now)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn load_writer<'e, E: SqliteExecutor<'e>>(
    executor: E,
    writer_id: Uuid,
) -> EngineResult<Option<WriterRecord>> {
    let sql = format!("SELECT {} FROM writers WHERE id = ?", WRITER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(writer_id.to_string())
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(writer_from_row).transpose()
}

/// Writers declaring the given PRO affiliation (fuzzy-match candidate pool)
pub async fn list_by_affiliation<'e, E: SqliteExecutor<'e>>(
    executor: E,
    pro_type: ProType,
) -> EngineResult<Vec<WriterRecord>> {
    let sql = format!(
        "SELECT {} FROM writers WHERE pro_affiliation = ? ORDER BY name, id",
        WRITER_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(pro_type.as_str())
        .fetch_all(executor)
        .await?;

    rows.iter().map(writer_from_row).collect()
}

/// All writer ids currently on file
pub async fn existing_ids<'e, E: SqliteExecutor<'e>>(executor: E) -> EngineResult<Vec<Uuid>> {
    let rows = sqlx::query("SELECT id FROM writers")
        .fetch_all(executor)
        .await?;
    rows.iter().map(|r| uuid_col(r, "id")).collect()
}

/// Writer id → display name
pub async fn names<'e, E: SqliteExecutor<'e>>(executor: E) -> EngineResult<HashMap<Uuid, String>> {
    let rows = sqlx::query("SELECT id, name FROM writers")
        .fetch_all(executor)
        .await?;
    rows.iter()
        .map(|r| Ok((uuid_col(r, "id")?, r.try_get::<String, _>("name")?)))
        .collect()
}

/// Set or clear the per-writer commission override
pub async fn set_commission_override<'e, E: SqliteExecutor<'e>>(
    executor: E,
    writer_id: Uuid,
    rate: Option<Decimal>,
) -> EngineResult<bool> {
    let result = sqlx::query(
        "UPDATE writers SET commission_override_rate = ?, updated_at = ? WHERE id = ?",
    )
    .bind(rate.map(|r| r.to_string()))
    .bind(format_ts(Utc::now()))
    .bind(writer_id.to_string())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Snapshot of every per-writer override
pub async fn load_overrides<'e, E: SqliteExecutor<'e>>(
    executor: E,
) -> EngineResult<HashMap<Uuid, Decimal>> {
    let rows = sqlx::query(
        "SELECT id, commission_override_rate FROM writers WHERE commission_override_rate IS NOT NULL",
    )
    .fetch_all(executor)
    .await?;

    rows.iter()
        .map(|r| Ok((uuid_col(r, "id")?, decimal_col(r, "commission_override_rate")?)))
        .collect()
}

pub async fn load_balance<'e, E: SqliteExecutor<'e>>(
    executor: E,
    writer_id: Uuid,
) -> EngineResult<Option<WriterBalance>> {
    let row = sqlx::query(
        "SELECT id, available_balance, lifetime_earnings FROM writers WHERE id = ?",
    )
    .bind(writer_id.to_string())
    .fetch_optional(executor)
    .await?;

    row.map(|r| {
        Ok(WriterBalance {
            writer_id: uuid_col(&r, "id")?,
            available_balance: decimal_col(&r, "available_balance")?,
            lifetime_earnings: decimal_col(&r, "lifetime_earnings")?,
        })
    })
    .transpose()
}
