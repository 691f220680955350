//! Settlement Builder
//!
//! Pure computation of ledger entries from statement rows, their work
//! assignments, and a `SettlementContext`:
//!
//! ```text
//! writer_gross   = gross_revenue * split / 100
//! commission     = writer_gross * rate / 100
//! net            = writer_gross - commission
//! ```
//!
//! Entries keep full precision. Smart rounding is applied once, to the
//! per-writer and statement totals.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::commission_resolver::SettlementContext;
use super::rounding::smart_round;
use crate::models::{LedgerEntry, StatementMetadata, StatementRow, WorkAssignment, WriterTotals};

/// Output of one settlement run
#[derive(Debug, Clone)]
pub struct Settlement {
    pub entries: Vec<LedgerEntry>,
    /// Smart-rounded, ordered by writer id
    pub writer_totals: Vec<WriterTotals>,
    /// Sum of allocated writer gross shares (full precision)
    pub allocated_revenue: Decimal,
    /// Smart-rounded sum of entry commissions
    pub total_commission: Decimal,
    /// Smart-rounded sum of entry nets
    pub total_net: Decimal,
    /// Rows without any assigned writer: (row index, work key)
    pub unassigned_rows: Vec<(usize, String)>,
}

/// Builds ledger entries against one context snapshot
pub struct SettlementBuilder<'a> {
    context: &'a SettlementContext,
    created_at: DateTime<Utc>,
}

impl<'a> SettlementBuilder<'a> {
    pub fn new(context: &'a SettlementContext) -> Self {
        Self {
            context,
            created_at: context.taken_at,
        }
    }

    /// Entries for one row, one per distinct assigned writer
    ///
    /// A writer listed twice for the same work has its splits combined.
    /// Splits need not total 100.
    pub fn settle_row(
        &self,
        statement_id: Uuid,
        row_index: usize,
        work_key: &str,
        row: &StatementRow,
        assignment: &WorkAssignment,
    ) -> Vec<LedgerEntry> {
        let mut splits: Vec<(Uuid, Decimal)> = Vec::with_capacity(assignment.writers.len());
        for writer in &assignment.writers {
            match splits.iter_mut().find(|(id, _)| *id == writer.writer_id) {
                Some((_, split)) => *split += writer.split_percentage,
                None => splits.push((writer.writer_id, writer.split_percentage)),
            }
        }

        splits
            .into_iter()
            .map(|(writer_id, split_percentage)| {
                let commission_rate = self.context.publish_rate(writer_id);
                let revenue = row.gross_revenue * split_percentage / Decimal::ONE_HUNDRED;
                let commission_amount = revenue * commission_rate / Decimal::ONE_HUNDRED;
                LedgerEntry {
                    id: Uuid::new_v4(),
                    statement_id,
                    row_index,
                    work_key: work_key.to_string(),
                    work_title: row.work_title.trim().to_string(),
                    writer_id,
                    performances: row.performances,
                    revenue,
                    split_percentage,
                    commission_rate,
                    commission_amount,
                    net_revenue: revenue - commission_amount,
                    is_visible_to_writer: false,
                    paid_at: None,
                    created_at: self.created_at,
                }
            })
            .collect()
    }

    /// Settle every row of a statement
    pub fn build(&self, statement_id: Uuid, metadata: &StatementMetadata) -> Settlement {
        let keys = metadata.work_keys();
        let mut entries = Vec::new();
        let mut unassigned_rows = Vec::new();

        for (row_index, (row, key)) in metadata.rows.iter().zip(keys.iter()).enumerate() {
            match metadata.assignments.get(key) {
                Some(assignment) if !assignment.writers.is_empty() => {
                    entries.extend(self.settle_row(statement_id, row_index, key, row, assignment));
                }
                _ => unassigned_rows.push((row_index, key.clone())),
            }
        }

        let writer_totals = aggregate_by_writer(&entries);
        let allocated_revenue = entries.iter().map(|e| e.revenue).sum();
        let total_commission = smart_round(entries.iter().map(|e| e.commission_amount).sum());
        let total_net = smart_round(entries.iter().map(|e| e.net_revenue).sum());

        Settlement {
            entries,
            writer_totals,
            allocated_revenue,
            total_commission,
            total_net,
            unassigned_rows,
        }
    }
}

/// Sum entries per writer at full precision, then smart-round each total
pub fn aggregate_by_writer(entries: &[LedgerEntry]) -> Vec<WriterTotals> {
    let mut totals: BTreeMap<Uuid, WriterTotals> = BTreeMap::new();
    for entry in entries {
        let total = totals.entry(entry.writer_id).or_insert_with(|| WriterTotals {
            writer_id: entry.writer_id,
            ..Default::default()
        });
        total.entry_count += 1;
        total.gross += entry.revenue;
        total.commission += entry.commission_amount;
        total.net += entry.net_revenue;
    }

    totals
        .into_values()
        .map(|t| WriterTotals {
            gross: smart_round(t.gross),
            commission: smart_round(t.commission),
            net: smart_round(t.net),
            ..t
        })
        .collect()
}
