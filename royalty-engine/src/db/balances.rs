//! Writer balance updates and their audit trail
//!
//! The only writer of `available_balance` / `lifetime_earnings`. Callers run
//! inside the payment transaction.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{decimal_col, format_ts, uuid_col};
use crate::error::{EngineError, EngineResult};
use crate::models::WriterBalance;

/// Audit kind for statement earnings credits
pub const KIND_STATEMENT_CREDIT: &str = "STATEMENT_CREDIT";

/// Add `amount` to both balance fields and record the credit
///
/// Returns the balance after the update. Fails if the writer does not exist
/// or this statement already credited this writer.
pub async fn credit(
    conn: &mut SqliteConnection,
    writer_id: Uuid,
    statement_id: Uuid,
    amount: Decimal,
) -> EngineResult<WriterBalance> {
    let row = sqlx::query(
        "SELECT id, available_balance, lifetime_earnings FROM writers WHERE id = ?",
    )
    .bind(writer_id.to_string())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| EngineError::NotFound(format!("Writer {}", writer_id)))?;

    let before = WriterBalance {
        writer_id: uuid_col(&row, "id")?,
        available_balance: decimal_col(&row, "available_balance")?,
        lifetime_earnings: decimal_col(&row, "lifetime_earnings")?,
    };
    let after = WriterBalance {
        writer_id,
        available_balance: before.available_balance + amount,
        lifetime_earnings: before.lifetime_earnings + amount,
    };
    let now = format_ts(Utc::now());

    sqlx::query(
        "UPDATE writers SET available_balance = ?, lifetime_earnings = ?, updated_at = ? WHERE id = ?",
    )
    .bind(after.available_balance.to_string())
    .bind(after.lifetime_earnings.to_string())
    .bind(&now)
    .bind(writer_id.to_string())
    .execute(&mut *conn)
    .await?;

    // UNIQUE(writer_id, statement_id, kind) rejects a second credit
    sqlx::query(
        r#"
        INSERT INTO balance_transactions (id, writer_id, statement_id, kind, amount, balance_after, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(writer_id.to_string())
    .bind(statement_id.to_string())
    .bind(KIND_STATEMENT_CREDIT)
    .bind(amount.to_string())
    .bind(after.available_balance.to_string())
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    Ok(after)
}

/// Credits recorded for a statement: (writer, amount)
pub async fn credits_for_statement(
    conn: &mut SqliteConnection,
    statement_id: Uuid,
) -> EngineResult<Vec<(Uuid, Decimal)>> {
    let rows = sqlx::query(
        r#"
        SELECT writer_id, amount FROM balance_transactions
        WHERE statement_id = ? AND kind = ?
        ORDER BY writer_id
        "#,
    )
    .bind(statement_id.to_string())
    .bind(KIND_STATEMENT_CREDIT)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|r| Ok((uuid_col(r, "writer_id")?, decimal_col(r, "amount")?)))
        .collect()
}
