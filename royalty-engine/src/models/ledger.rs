//! Ledger entries (statement items) and per-writer aggregates

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// One persisted settlement record: one writer's share of one row
///
/// Amounts keep full precision; rounding happens only on per-writer totals.
/// `net_revenue == revenue - commission_amount` holds exactly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub statement_id: Uuid,
    pub row_index: usize,
    pub work_key: String,
    pub work_title: String,
    pub writer_id: Uuid,
    pub performances: i64,
    /// Writer's gross share of the row
    pub revenue: Decimal,
    pub split_percentage: Decimal,
    pub commission_rate: Decimal,
    pub commission_amount: Decimal,
    pub net_revenue: Decimal,
    pub is_visible_to_writer: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Aggregated amounts for one writer within a statement
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriterTotals {
    pub writer_id: Uuid,
    pub entry_count: usize,
    pub gross: Decimal,
    pub commission: Decimal,
    pub net: Decimal,
}

/// Per-writer line of a payment summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriterPaymentLine {
    pub writer_id: Uuid,
    pub writer_name: Option<String>,
    pub entry_count: usize,
    pub gross: Decimal,
    pub commission: Decimal,
    pub net: Decimal,
    /// Commission refunded through a reduction redemption
    pub refund: Decimal,
    /// Amount credited (or to be credited) to the writer balance
    pub credited: Decimal,
}

/// Per-statement payment summary for reconciliation and export
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSummary {
    pub statement_id: Uuid,
    pub payment_status: super::PaymentStatus,
    pub writers: Vec<WriterPaymentLine>,
    pub total_gross: Decimal,
    pub total_commission: Decimal,
    pub total_net: Decimal,
    pub total_refund: Decimal,
}
