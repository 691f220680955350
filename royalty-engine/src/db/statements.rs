//! Statement persistence
//!
//! Status transitions are written with guarded `UPDATE ... WHERE` clauses so a
//! concurrent caller that lost the race sees `rows_affected() == 0` instead of
//! silently overwriting state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};
use uuid::Uuid;

use super::{decimal_col, format_ts, opt_ts_col, ts_col, uuid_col};
use crate::error::EngineResult;
use crate::models::{PaymentStatus, ProType, Statement, StatementMetadata, StatementStatus};

const STATEMENT_COLUMNS: &str = r#"
    id, pro_type, period, status, payment_status, total_revenue,
    total_commission, total_net, metadata, created_at, updated_at,
    published_at, paid_at
"#;

fn statement_from_row(row: &SqliteRow) -> EngineResult<Statement> {
    let pro_type: String = row.try_get("pro_type")?;
    let status: String = row.try_get("status")?;
    let payment_status: String = row.try_get("payment_status")?;
    let metadata: String = row.try_get("metadata")?;

    Ok(Statement {
        id: uuid_col(row, "id")?,
        pro_type: pro_type.parse::<ProType>()?,
        period: row.try_get("period")?,
        status: status.parse::<StatementStatus>()?,
        payment_status: payment_status.parse::<PaymentStatus>()?,
        total_revenue: decimal_col(row, "total_revenue")?,
        total_commission: decimal_col(row, "total_commission")?,
        total_net: decimal_col(row, "total_net")?,
        metadata: StatementMetadata::decode(&metadata)?,
        created_at: ts_col(row, "created_at")?,
        updated_at: ts_col(row, "updated_at")?,
        published_at: opt_ts_col(row, "published_at")?,
        paid_at: opt_ts_col(row, "paid_at")?,
    })
}

pub async fn insert_statement<'e, E: SqliteExecutor<'e>>(
    executor: E,
    statement: &Statement,
) -> EngineResult<()> {
    let metadata = statement.metadata.encode()?;

    sqlx::query(
        r#"
        INSERT INTO statements (
            id, pro_type, period, status, payment_status, total_revenue,
            total_commission, total_net, row_count, metadata, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(statement.id.to_string())
    .bind(statement.pro_type.as_str())
    .bind(&statement.period)
    .bind(statement.status.as_str())
    .bind(statement.payment_status.as_str())
    .bind(statement.total_revenue.to_string())
    .bind(statement.total_commission.to_string())
    .bind(statement.total_net.to_string())
    .bind(statement.metadata.rows.len() as i64)
    .bind(metadata)
    .bind(format_ts(statement.created_at))
    .bind(format_ts(statement.updated_at))
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn load_statement<'e, E: SqliteExecutor<'e>>(
    executor: E,
    statement_id: Uuid,
) -> EngineResult<Option<Statement>> {
    let sql = format!("SELECT {} FROM statements WHERE id = ?", STATEMENT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(statement_id.to_string())
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(statement_from_row).transpose()
}

/// Replace metadata and processing status in one write
pub async fn update_metadata<'e, E: SqliteExecutor<'e>>(
    executor: E,
    statement_id: Uuid,
    metadata: &StatementMetadata,
    status: StatementStatus,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE statements
        SET metadata = ?, status = ?, updated_at = ?
        WHERE id = ? AND payment_status = 'UNPAID'
        "#,
    )
    .bind(metadata.encode()?)
    .bind(status.as_str())
    .bind(format_ts(Utc::now()))
    .bind(statement_id.to_string())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Record a completed publish: totals, metadata snapshot, PUBLISHED
pub async fn mark_published<'e, E: SqliteExecutor<'e>>(
    executor: E,
    statement_id: Uuid,
    metadata: &StatementMetadata,
    total_commission: Decimal,
    total_net: Decimal,
    published_at: DateTime<Utc>,
) -> EngineResult<bool> {
    let ts = format_ts(published_at);
    let result = sqlx::query(
        r#"
        UPDATE statements
        SET status = 'PUBLISHED', metadata = ?, total_commission = ?,
            total_net = ?, published_at = ?, updated_at = ?
        WHERE id = ? AND payment_status = 'UNPAID'
        "#,
    )
    .bind(metadata.encode()?)
    .bind(total_commission.to_string())
    .bind(total_net.to_string())
    .bind(&ts)
    .bind(&ts)
    .bind(statement_id.to_string())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Claim a published statement for a payment run (UNPAID → PENDING)
///
/// Returns false when another run holds the claim or the statement is paid.
pub async fn claim_for_payment<'e, E: SqliteExecutor<'e>>(
    executor: E,
    statement_id: Uuid,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE statements
        SET payment_status = 'PENDING', updated_at = ?
        WHERE id = ? AND status = 'PUBLISHED' AND payment_status = 'UNPAID'
        "#,
    )
    .bind(format_ts(Utc::now()))
    .bind(statement_id.to_string())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// PENDING → PAID
pub async fn mark_paid<'e, E: SqliteExecutor<'e>>(
    executor: E,
    statement_id: Uuid,
    paid_at: DateTime<Utc>,
) -> EngineResult<bool> {
    let ts = format_ts(paid_at);
    let result = sqlx::query(
        r#"
        UPDATE statements
        SET payment_status = 'PAID', paid_at = ?, updated_at = ?
        WHERE id = ? AND payment_status = 'PENDING'
        "#,
    )
    .bind(&ts)
    .bind(&ts)
    .bind(statement_id.to_string())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Delete an unpaid statement; ledger entries cascade
pub async fn delete_statement<'e, E: SqliteExecutor<'e>>(
    executor: E,
    statement_id: Uuid,
) -> EngineResult<bool> {
    let result = sqlx::query("DELETE FROM statements WHERE id = ? AND payment_status = 'UNPAID'")
        .bind(statement_id.to_string())
        .execute(executor)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Lightweight listing row
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatementListing {
    pub id: Uuid,
    pub pro_type: String,
    pub period: Option<String>,
    pub status: String,
    pub payment_status: String,
    pub row_count: i64,
    pub total_revenue: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Newest first
pub async fn list_statements<'e, E: SqliteExecutor<'e>>(
    executor: E,
) -> EngineResult<Vec<StatementListing>> {
    let rows = sqlx::query(
        r#"
        SELECT id, pro_type, period, status, payment_status, row_count,
               total_revenue, created_at
        FROM statements
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(executor)
    .await?;

    rows.iter()
        .map(|r| {
            Ok(StatementListing {
                id: uuid_col(r, "id")?,
                pro_type: r.try_get("pro_type")?,
                period: r.try_get("period")?,
                status: r.try_get("status")?,
                payment_status: r.try_get("payment_status")?,
                row_count: r.try_get("row_count")?,
                total_revenue: decimal_col(r, "total_revenue")?,
                created_at: ts_col(r, "created_at")?,
            })
        })
        .collect()
}
