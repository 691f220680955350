//! Payment processing
//!
//! Pays a published statement in one transaction:
//!
//! 1. claim the statement (UNPAID → PENDING, guarded update)
//! 2. sum each writer's ledger entries and apply any reduction redemption
//! 3. credit balances through the Balance Ledger
//! 4. stamp entries and statement PAID, commit
//!
//! Any failure before commit rolls back the claim with everything else, so
//! the statement returns to UNPAID and can be paid again. Notifications run
//! after commit on a spawned task.

use chrono::{DateTime, Utc};
use royalty_common::events::{EventBus, RoyaltyEvent};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::balance_ledger::{self, BalanceChange};
use super::commission_resolver::{self, SettlementContext};
use super::notifier::{crossed_milestones, deliver_all, Notifier};
use super::rounding::smart_round;
use crate::config::SettlementSettings;
use crate::db;
use crate::error::{EngineError, EngineResult, PreconditionViolation};
use crate::models::{
    LedgerEntry, PaymentStatus, PaymentSummary, Statement, StatementStatus, WriterBalance, WriterPaymentLine,
};
use crate::utils::{begin_monitored, retry_on_lock, with_deadline};

/// One writer's credit for a payment run, before it is applied
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCredit {
    pub line: WriterPaymentLine,
    /// Redemption consumed by this credit (only when it refunds something)
    pub redemption_id: Option<Uuid>,
}

/// Committed payment
#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub statement_id: Uuid,
    pub paid_at: DateTime<Utc>,
    pub writers: Vec<WriterPaymentLine>,
    pub total_credited: Decimal,
    pub total_refund: Decimal,
    pub redemptions_consumed: usize,
}

/// Receipt plus the handle of the post-commit side effects
///
/// Awaiting `side_effects` yields the number of failed deliveries. Dropping
/// it detaches the task.
#[derive(Debug)]
pub struct PaymentOutcome {
    pub receipt: PaymentReceipt,
    pub side_effects: JoinHandle<usize>,
}

/// Group a statement's entries per writer and work out what to credit
///
/// Gross, commission and net are smart-rounded sums of the entries. A writer
/// holding a redeemable reduction gets back the commission withheld above
/// the reduced rate, per entry; the credited amount is the smart-rounded sum
/// of net plus refund.
pub fn plan_payment(entries: &[LedgerEntry], context: &SettlementContext) -> Vec<PlannedCredit> {
    #[derive(Default)]
    struct Sums {
        entries: usize,
        gross: Decimal,
        commission: Decimal,
        net: Decimal,
        refund: Decimal,
    }

    let mut per_writer: BTreeMap<Uuid, Sums> = BTreeMap::new();
    for entry in entries {
        let sums = per_writer.entry(entry.writer_id).or_default();
        sums.entries += 1;
        sums.gross += entry.revenue;
        sums.commission += entry.commission_amount;
        sums.net += entry.net_revenue;

        if let Some(redemption) = context.redemption_for(entry.writer_id) {
            let withheld_above = entry.commission_rate - redemption.reduced_rate;
            if withheld_above > Decimal::ZERO {
                sums.refund += entry.revenue * withheld_above / Decimal::ONE_HUNDRED;
            }
        }
    }

    per_writer
        .into_iter()
        .map(|(writer_id, sums)| {
            let redemption_id = context
                .redemption_for(writer_id)
                .filter(|_| sums.refund > Decimal::ZERO)
                .map(|r| r.id);
            PlannedCredit {
                line: WriterPaymentLine {
                    writer_id,
                    writer_name: None,
                    entry_count: sums.entries,
                    gross: smart_round(sums.gross),
                    commission: smart_round(sums.commission),
                    net: smart_round(sums.net),
                    refund: smart_round(sums.refund),
                    credited: smart_round(sums.net + sums.refund),
                },
                redemption_id,
            }
        })
        .collect()
}

fn summarize(statement_id: Uuid, payment_status: PaymentStatus, writers: Vec<WriterPaymentLine>) -> PaymentSummary {
    PaymentSummary {
        statement_id,
        payment_status,
        total_gross: writers.iter().map(|w| w.gross).sum(),
        total_commission: writers.iter().map(|w| w.commission).sum(),
        total_net: writers.iter().map(|w| w.net).sum(),
        total_refund: writers.iter().map(|w| w.refund).sum(),
        writers,
    }
}

/// Payment Processor
pub struct PaymentProcessor {
    pool: SqlitePool,
    settings: SettlementSettings,
    notifier: Arc<dyn Notifier>,
    event_bus: EventBus,
}

impl PaymentProcessor {
    pub fn new(
        pool: SqlitePool,
        settings: SettlementSettings,
        notifier: Arc<dyn Notifier>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            pool,
            settings,
            notifier,
            event_bus,
        }
    }

    /// Pay a published statement and credit its writers
    pub async fn process_payment(&self, statement_id: Uuid) -> EngineResult<PaymentOutcome> {
        let (receipt, changes) = with_deadline(
            "payment",
            self.settings.transaction_timeout,
            retry_on_lock("payment", self.settings.max_lock_wait_ms, || {
                self.pay_once(statement_id)
            }),
        )
        .await?;

        self.event_bus.emit_lossy(RoyaltyEvent::StatementPaid {
            statement_id,
            writer_count: receipt.writers.len(),
            total_credited: receipt.total_credited,
            timestamp: receipt.paid_at,
        });

        let events = side_effect_events(statement_id, &changes, receipt.paid_at);
        let side_effects = tokio::spawn(deliver_all(
            Arc::clone(&self.notifier),
            events,
            self.settings.side_effect_concurrency,
        ));

        Ok(PaymentOutcome { receipt, side_effects })
    }

    async fn pay_once(&self, statement_id: Uuid) -> EngineResult<(PaymentReceipt, Vec<BalanceChange>)> {
        let mut tx = begin_monitored(&self.pool, "payment_processor::pay").await?;

        let statement = db::statements::load_statement(tx.conn(), statement_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Statement {}", statement_id)))?;
        check_payable(&statement)?;

        if !db::statements::claim_for_payment(tx.conn(), statement_id).await? {
            return Err(PreconditionViolation::PaymentInProgress {
                statement_id,
                payment_status: PaymentStatus::Pending,
            }
            .into());
        }

        let entries = db::ledger_entries::load_for_statement(tx.conn(), statement_id).await?;
        if entries.is_empty() {
            return Err(PreconditionViolation::NoLedgerEntries { statement_id }.into());
        }

        let paid_at = Utc::now();
        let context = commission_resolver::load_context(tx.conn(), paid_at).await?;
        let plan = plan_payment(&entries, &context);

        let mut changes = Vec::with_capacity(plan.len());
        let mut redemptions_consumed = 0;
        for credit in &plan {
            let line = &credit.line;
            if let Some(redemption_id) = credit.redemption_id {
                if db::commission::consume_redemption(tx.conn(), redemption_id, statement_id).await? {
                    db::commission::insert_refund(tx.conn(), statement_id, line.writer_id, redemption_id, line.refund)
                        .await?;
                    redemptions_consumed += 1;
                }
            }
            changes.push(balance_ledger::apply_net(tx.conn(), statement_id, line.writer_id, line.credited).await?);
        }

        db::ledger_entries::mark_paid(tx.conn(), statement_id, paid_at).await?;
        if !db::statements::mark_paid(tx.conn(), statement_id, paid_at).await? {
            return Err(EngineError::Common(royalty_common::Error::Internal(format!(
                "Statement {} lost its payment claim",
                statement_id
            ))));
        }

        tx.commit().await?;

        let writers: Vec<WriterPaymentLine> = plan.into_iter().map(|c| c.line).collect();
        let receipt = PaymentReceipt {
            statement_id,
            paid_at,
            total_credited: writers.iter().map(|w| w.credited).sum(),
            total_refund: writers.iter().map(|w| w.refund).sum(),
            redemptions_consumed,
            writers,
        };

        tracing::info!(
            statement_id = %statement_id,
            writers = receipt.writers.len(),
            entries = entries.len(),
            total_credited = %receipt.total_credited,
            total_refund = %receipt.total_refund,
            redemptions_consumed,
            "Statement paid"
        );

        Ok((receipt, changes))
    }

    /// Per-writer payment breakdown
    ///
    /// Paid statements report the refunds and credits actually recorded;
    /// unpaid ones report what a payment run would credit now.
    pub async fn payment_summary(&self, statement_id: Uuid) -> EngineResult<PaymentSummary> {
        let mut conn = self.pool.acquire().await?;

        let statement = db::statements::load_statement(&mut *conn, statement_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Statement {}", statement_id)))?;
        let entries = db::ledger_entries::load_for_statement(&mut *conn, statement_id).await?;
        let names = db::writers::names(&mut *conn).await?;

        let mut lines: Vec<WriterPaymentLine> = if statement.is_paid() {
            let refunds: HashMap<Uuid, Decimal> = db::commission::refunds_for_statement(&mut *conn, statement_id)
                .await?
                .into_iter()
                .collect();
            let credits: HashMap<Uuid, Decimal> = db::balances::credits_for_statement(&mut conn, statement_id)
                .await?
                .into_iter()
                .collect();
            plan_payment(&entries, &SettlementContext::default())
                .into_iter()
                .map(|c| {
                    let mut line = c.line;
                    line.refund = refunds.get(&line.writer_id).copied().unwrap_or(Decimal::ZERO);
                    line.credited = credits.get(&line.writer_id).copied().unwrap_or(line.credited);
                    line
                })
                .collect()
        } else {
            let context = commission_resolver::load_context(&mut conn, Utc::now()).await?;
            plan_payment(&entries, &context).into_iter().map(|c| c.line).collect()
        };

        for line in &mut lines {
            line.writer_name = names.get(&line.writer_id).cloned();
        }

        Ok(summarize(statement_id, statement.payment_status, lines))
    }

    pub async fn writer_balance(&self, writer_id: Uuid) -> EngineResult<WriterBalance> {
        db::writers::load_balance(&self.pool, writer_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Writer {}", writer_id)))
    }
}

fn check_payable(statement: &Statement) -> EngineResult<()> {
    match statement.payment_status {
        PaymentStatus::Paid => {
            return Err(PreconditionViolation::AlreadyPaid {
                statement_id: statement.id,
            }
            .into())
        }
        PaymentStatus::Pending => {
            return Err(PreconditionViolation::PaymentInProgress {
                statement_id: statement.id,
                payment_status: statement.payment_status,
            }
            .into())
        }
        PaymentStatus::Unpaid => {}
    }
    if statement.status != StatementStatus::Published {
        return Err(PreconditionViolation::WrongStatus {
            statement_id: statement.id,
            status: statement.status,
            expected: StatementStatus::Published,
        }
        .into());
    }
    Ok(())
}

/// Writer notifications for a committed payment
fn side_effect_events(statement_id: Uuid, changes: &[BalanceChange], at: DateTime<Utc>) -> Vec<RoyaltyEvent> {
    let mut events = Vec::with_capacity(changes.len());
    for change in changes {
        events.push(RoyaltyEvent::EarningsCredited {
            writer_id: change.writer_id,
            statement_id,
            amount: change.amount,
            available_balance: change.available_after,
            timestamp: at,
        });
        for milestone in crossed_milestones(change.lifetime_before, change.lifetime_after) {
            events.push(RoyaltyEvent::EarningsMilestone {
                writer_id: change.writer_id,
                milestone,
                lifetime_earnings: change.lifetime_after,
                timestamp: at,
            });
        }
    }
    events
}
