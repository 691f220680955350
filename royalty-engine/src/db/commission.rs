//! Commission policy, redemption, and refund persistence

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};
use uuid::Uuid;

use super::{decimal_col, format_ts, opt_uuid_col, ts_col, uuid_col};
use crate::error::EngineResult;
use crate::models::{CommissionPolicy, CommissionRedemption, RedemptionStatus};

pub async fn insert_policy<'e, E: SqliteExecutor<'e>>(
    executor: E,
    policy: &CommissionPolicy,
) -> EngineResult<()> {
    sqlx::query(
        "INSERT INTO commission_policies (id, rate, effective_from, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(policy.id.to_string())
    .bind(policy.rate.to_string())
    .bind(format_ts(policy.effective_from))
    .bind(format_ts(policy.created_at))
    .execute(executor)
    .await?;

    Ok(())
}

/// Most recently effective policy at `at`, if any
pub async fn active_policy<'e, E: SqliteExecutor<'e>>(
    executor: E,
    at: DateTime<Utc>,
) -> EngineResult<Option<CommissionPolicy>> {
    let row = sqlx::query(
        r#"
        SELECT id, rate, effective_from, created_at
        FROM commission_policies
        WHERE effective_from <= ?
        ORDER BY effective_from DESC, created_at DESC
        LIMIT 1
        "#,
    )
    .bind(format_ts(at))
    .fetch_optional(executor)
    .await?;

    row.map(|r| {
        Ok(CommissionPolicy {
            id: uuid_col(&r, "id")?,
            rate: decimal_col(&r, "rate")?,
            effective_from: ts_col(&r, "effective_from")?,
            created_at: ts_col(&r, "created_at")?,
        })
    })
    .transpose()
}

fn redemption_from_row(row: &SqliteRow) -> EngineResult<CommissionRedemption> {
    let status: String = row.try_get("status")?;
    let is_active: i64 = row.try_get("is_active")?;
    Ok(CommissionRedemption {
        id: uuid_col(row, "id")?,
        writer_id: uuid_col(row, "writer_id")?,
        reduced_rate: decimal_col(row, "reduced_rate")?,
        status: status.parse::<RedemptionStatus>()?,
        is_active: is_active != 0,
        expires_at: ts_col(row, "expires_at")?,
        consumed_statement_id: opt_uuid_col(row, "consumed_statement_id")?,
        created_at: ts_col(row, "created_at")?,
    })
}

pub async fn insert_redemption<'e, E: SqliteExecutor<'e>>(
    executor: E,
    redemption: &CommissionRedemption,
) -> EngineResult<()> {
    sqlx::query(
        r#"
        INSERT INTO commission_redemptions (
            id, writer_id, reduced_rate, status, is_active, expires_at,
            consumed_statement_id, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(redemption.id.to_string())
    .bind(redemption.writer_id.to_string())
    .bind(redemption.reduced_rate.to_string())
    .bind(redemption.status.as_str())
    .bind(redemption.is_active as i64)
    .bind(format_ts(redemption.expires_at))
    .bind(redemption.consumed_statement_id.map(|id| id.to_string()))
    .bind(format_ts(redemption.created_at))
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn load_redemption<'e, E: SqliteExecutor<'e>>(
    executor: E,
    redemption_id: Uuid,
) -> EngineResult<Option<CommissionRedemption>> {
    let row = sqlx::query(
        r#"
        SELECT id, writer_id, reduced_rate, status, is_active, expires_at,
               consumed_statement_id, created_at
        FROM commission_redemptions
        WHERE id = ?
        "#,
    )
    .bind(redemption_id.to_string())
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(redemption_from_row).transpose()
}

/// Decide a pending redemption; only PENDING rows change
pub async fn set_redemption_status<'e, E: SqliteExecutor<'e>>(
    executor: E,
    redemption_id: Uuid,
    status: RedemptionStatus,
) -> EngineResult<bool> {
    let result = sqlx::query(
        "UPDATE commission_redemptions SET status = ? WHERE id = ? AND status = 'PENDING'",
    )
    .bind(status.as_str())
    .bind(redemption_id.to_string())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Every approved, active, unexpired redemption in one query
pub async fn load_redeemable<'e, E: SqliteExecutor<'e>>(
    executor: E,
    now: DateTime<Utc>,
) -> EngineResult<Vec<CommissionRedemption>> {
    let rows = sqlx::query(
        r#"
        SELECT id, writer_id, reduced_rate, status, is_active, expires_at,
               consumed_statement_id, created_at
        FROM commission_redemptions
        WHERE status = 'APPROVED' AND is_active = 1 AND expires_at > ?
        ORDER BY writer_id, reduced_rate, created_at
        "#,
    )
    .bind(format_ts(now))
    .fetch_all(executor)
    .await?;

    rows.iter().map(redemption_from_row).collect()
}

/// Deactivate a redemption and record the statement that used it
pub async fn consume_redemption<'e, E: SqliteExecutor<'e>>(
    executor: E,
    redemption_id: Uuid,
    statement_id: Uuid,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE commission_redemptions
        SET is_active = 0, consumed_statement_id = ?
        WHERE id = ? AND is_active = 1
        "#,
    )
    .bind(statement_id.to_string())
    .bind(redemption_id.to_string())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn insert_refund<'e, E: SqliteExecutor<'e>>(
    executor: E,
    statement_id: Uuid,
    writer_id: Uuid,
    redemption_id: Uuid,
    amount: Decimal,
) -> EngineResult<()> {
    sqlx::query(
        r#"
        INSERT INTO commission_refunds (id, statement_id, writer_id, redemption_id, amount, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(statement_id.to_string())
    .bind(writer_id.to_string())
    .bind(redemption_id.to_string())
    .bind(amount.to_string())
    .bind(format_ts(Utc::now()))
    .execute(executor)
    .await?;

    Ok(())
}

/// Refund recorded per writer for a statement
pub async fn refunds_for_statement<'e, E: SqliteExecutor<'e>>(
    executor: E,
    statement_id: Uuid,
) -> EngineResult<Vec<(Uuid, Decimal)>> {
    let rows = sqlx::query(
        "SELECT writer_id, amount FROM commission_refunds WHERE statement_id = ? ORDER BY writer_id",
    )
    .bind(statement_id.to_string())
    .fetch_all(executor)
    .await?;

    rows.iter()
        .map(|r| Ok((uuid_col(r, "writer_id")?, decimal_col(r, "amount")?)))
        .collect()
}
