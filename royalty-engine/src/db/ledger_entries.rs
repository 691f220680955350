//! Ledger entry (statement item) persistence
//!
//! A statement's entries are replaced as a whole on every publish; nothing
//! here patches individual entries except the visibility and paid stamps.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteExecutor};
use uuid::Uuid;

use super::{decimal_col, format_ts, opt_ts_col, ts_col, uuid_col};
use crate::error::EngineResult;
use crate::models::LedgerEntry;

fn entry_from_row(row: &SqliteRow) -> EngineResult<LedgerEntry> {
    let row_index: i64 = row.try_get("row_index")?;
    let visible: i64 = row.try_get("is_visible_to_writer")?;
    Ok(LedgerEntry {
        id: uuid_col(row, "id")?,
        statement_id: uuid_col(row, "statement_id")?,
        row_index: row_index as usize,
        work_key: row.try_get("work_key")?,
        work_title: row.try_get("work_title")?,
        writer_id: uuid_col(row, "writer_id")?,
        performances: row.try_get("performances")?,
        revenue: decimal_col(row, "revenue")?,
        split_percentage: decimal_col(row, "split_percentage")?,
        commission_rate: decimal_col(row, "commission_rate")?,
        commission_amount: decimal_col(row, "commission_amount")?,
        net_revenue: decimal_col(row, "net_revenue")?,
        is_visible_to_writer: visible != 0,
        paid_at: opt_ts_col(row, "paid_at")?,
        created_at: ts_col(row, "created_at")?,
    })
}

/// Remove the previous generation of entries
pub async fn delete_for_statement<'e, E: SqliteExecutor<'e>>(
    executor: E,
    statement_id: Uuid,
) -> EngineResult<u64> {
    let result = sqlx::query("DELETE FROM statement_items WHERE statement_id = ?")
        .bind(statement_id.to_string())
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

/// Insert one batch as a single multi-row statement
///
/// Callers chunk the entry set; the chunk size bounds bind parameters
/// (15 per entry) well under SQLite's limit.
pub async fn insert_batch<'e, E: SqliteExecutor<'e>>(
    executor: E,
    entries: &[LedgerEntry],
) -> EngineResult<u64> {
    if entries.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        r#"INSERT INTO statement_items (
            id, statement_id, row_index, work_key, work_title, writer_id,
            performances, revenue, split_percentage, commission_rate,
            commission_amount, net_revenue, is_visible_to_writer, paid_at, created_at
        ) "#,
    );

    builder.push_values(entries, |mut b, entry| {
        b.push_bind(entry.id.to_string())
            .push_bind(entry.statement_id.to_string())
            .push_bind(entry.row_index as i64)
            .push_bind(entry.work_key.clone())
            .push_bind(entry.work_title.clone())
            .push_bind(entry.writer_id.to_string())
            .push_bind(entry.performances)
            .push_bind(entry.revenue.to_string())
            .push_bind(entry.split_percentage.to_string())
            .push_bind(entry.commission_rate.to_string())
            .push_bind(entry.commission_amount.to_string())
            .push_bind(entry.net_revenue.to_string())
            .push_bind(entry.is_visible_to_writer as i64)
            .push_bind(entry.paid_at.map(format_ts))
            .push_bind(format_ts(entry.created_at));
    });

    let result = builder.build().execute(executor).await?;
    Ok(result.rows_affected())
}

/// Entries in row order, then writer id
pub async fn load_for_statement<'e, E: SqliteExecutor<'e>>(
    executor: E,
    statement_id: Uuid,
) -> EngineResult<Vec<LedgerEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, statement_id, row_index, work_key, work_title, writer_id,
               performances, revenue, split_percentage, commission_rate,
               commission_amount, net_revenue, is_visible_to_writer, paid_at, created_at
        FROM statement_items
        WHERE statement_id = ?
        ORDER BY row_index, writer_id
        "#,
    )
    .bind(statement_id.to_string())
    .fetch_all(executor)
    .await?;

    rows.iter().map(entry_from_row).collect()
}

pub async fn count_for_statement<'e, E: SqliteExecutor<'e>>(
    executor: E,
    statement_id: Uuid,
) -> EngineResult<u64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM statement_items WHERE statement_id = ?")
        .bind(statement_id.to_string())
        .fetch_one(executor)
        .await?;

    Ok(count as u64)
}

/// Make every entry of the statement visible to its writer
pub async fn set_visible<'e, E: SqliteExecutor<'e>>(
    executor: E,
    statement_id: Uuid,
) -> EngineResult<u64> {
    let result = sqlx::query(
        "UPDATE statement_items SET is_visible_to_writer = 1 WHERE statement_id = ?",
    )
    .bind(statement_id.to_string())
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Visible and stamped with the payment time
pub async fn mark_paid<'e, E: SqliteExecutor<'e>>(
    executor: E,
    statement_id: Uuid,
    paid_at: DateTime<Utc>,
) -> EngineResult<u64> {
    let result = sqlx::query(
        "UPDATE statement_items SET is_visible_to_writer = 1, paid_at = ? WHERE statement_id = ?",
    )
    .bind(format_ts(paid_at))
    .bind(statement_id.to_string())
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}
