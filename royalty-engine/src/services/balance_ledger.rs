//! Balance Ledger
//!
//! Folds a payment run's amounts into writer balances. Called only by the
//! payment processor, on the payment transaction's connection, so balance
//! changes commit or roll back together with the statement.

use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::db;
use crate::error::EngineResult;

/// Balance movement caused by one credit
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceChange {
    pub writer_id: Uuid,
    pub amount: Decimal,
    pub available_before: Decimal,
    pub available_after: Decimal,
    pub lifetime_before: Decimal,
    pub lifetime_after: Decimal,
}

/// Credit `amount` to a writer's available and lifetime balances
///
/// The amount must come from the run's freshly summed ledger entries. A
/// second credit for the same (writer, statement) fails on the audit
/// table's unique key and rolls the run back.
pub async fn apply_net(
    conn: &mut SqliteConnection,
    statement_id: Uuid,
    writer_id: Uuid,
    amount: Decimal,
) -> EngineResult<BalanceChange> {
    let after = db::balances::credit(conn, writer_id, statement_id, amount).await?;

    let change = BalanceChange {
        writer_id,
        amount,
        available_before: after.available_balance - amount,
        available_after: after.available_balance,
        lifetime_before: after.lifetime_earnings - amount,
        lifetime_after: after.lifetime_earnings,
    };

    tracing::debug!(
        writer_id = %writer_id,
        statement_id = %statement_id,
        amount = %amount,
        available = %change.available_after,
        "Writer balance credited"
    );

    Ok(change)
}
