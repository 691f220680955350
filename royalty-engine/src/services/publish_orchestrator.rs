//! Publish Orchestrator
//!
//! Statement lifecycle up to payment:
//!
//! ```text
//! upload ──► UPLOADED ──resolve/assign──► PROCESSED ──publish──► PUBLISHED
//!                                              ▲                   │
//!                                              └──── republish ◄───┘ (while unpaid)
//! ```
//!
//! Publish is an arena-style replace keyed by statement id: one transaction
//! deletes the previous generation of ledger entries, inserts the new one in
//! fixed-size batches, and marks the statement PUBLISHED. A failure or
//! timeout anywhere drops the transaction, so a statement is never left
//! PUBLISHED with a partial entry set. Balances are never touched here.

use chrono::Utc;
use royalty_common::events::{EventBus, RoyaltyEvent};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use super::commission_resolver;
use super::settlement_builder::SettlementBuilder;
use super::writer_resolver::{ResolutionReport, WriterResolver};
use crate::config::SettlementSettings;
use crate::db;
use crate::db::statements::StatementListing;
use crate::error::{EngineError, EngineResult, PreconditionViolation};
use crate::models::{
    AssignedWriter, AssignmentSource, PaymentStatus, ProType, ReviewItem, ReviewStatus, Statement, StatementMetadata,
    StatementRow, StatementStatus, StatementSummary, WorkAssignment, WriterTotals,
};
use crate::utils::{begin_monitored, retry_on_lock, with_deadline};

/// Result of a publish or republish run
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub statement_id: Uuid,
    pub republished: bool,
    pub entry_count: usize,
    pub batches: usize,
    pub replaced_entries: u64,
    pub total_commission: rust_decimal::Decimal,
    pub total_net: rust_decimal::Decimal,
    pub writer_totals: Vec<WriterTotals>,
}

/// Operator review queue for one statement
#[derive(Debug, Clone, Serialize)]
pub struct ReviewQueue {
    pub statement_id: Uuid,
    pub suggested: usize,
    pub unmatched: usize,
    pub conflicting: usize,
    pub items: Vec<ReviewItem>,
}

/// Publish Orchestrator
pub struct PublishOrchestrator {
    pool: SqlitePool,
    settings: SettlementSettings,
    resolver: WriterResolver,
    event_bus: EventBus,
}

impl PublishOrchestrator {
    pub fn new(pool: SqlitePool, settings: SettlementSettings, resolver: WriterResolver, event_bus: EventBus) -> Self {
        Self {
            pool,
            settings,
            resolver,
            event_bus,
        }
    }

    /// Store a new statement from normalized rows (UPLOADED / UNPAID)
    pub async fn upload(
        &self,
        pro_type: ProType,
        rows: Vec<StatementRow>,
        period: Option<String>,
    ) -> EngineResult<Statement> {
        if rows.is_empty() {
            return Err(EngineError::InvalidInput("Statement has no rows".to_string()));
        }
        for (index, row) in rows.iter().enumerate() {
            row.validate(index)?;
        }

        let statement = Statement::new(pro_type, period, StatementMetadata::new(rows));
        db::statements::insert_statement(&self.pool, &statement).await?;

        tracing::info!(
            statement_id = %statement.id,
            pro_type = %statement.pro_type,
            rows = statement.metadata.rows.len(),
            total_revenue = %statement.total_revenue,
            "Statement uploaded"
        );

        Ok(statement)
    }

    /// Load a statement or fail with NotFound
    pub async fn statement(&self, statement_id: Uuid) -> EngineResult<Statement> {
        db::statements::load_statement(&self.pool, statement_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Statement {}", statement_id)))
    }

    /// Run the Writer Resolver over every row and store the results
    ///
    /// Manual assignments survive; earlier automatic assignments are replaced
    /// by this run's. Rows left without an assignment become the review queue.
    pub async fn resolve(&self, statement_id: Uuid) -> EngineResult<ResolutionReport> {
        let statement = self.statement(statement_id).await?;
        ensure_unpaid(&statement)?;

        let report = self
            .resolver
            .resolve_statement(&statement.metadata, statement.pro_type)
            .await?;

        let mut metadata = statement.metadata.clone();
        metadata
            .assignments
            .retain(|_, a| a.source == AssignmentSource::Manual);
        for (key, assignment) in &report.assignments {
            metadata
                .assignments
                .entry(key.clone())
                .or_insert_with(|| assignment.clone());
        }
        metadata.review_queue = report.review_queue.clone();

        let status = next_status(statement.status, &metadata);
        self.store_metadata(statement_id, &metadata, status).await?;

        Ok(report)
    }

    /// Rows waiting on an operator, minus any assigned since the last resolve
    pub async fn review_queue(&self, statement_id: Uuid) -> EngineResult<ReviewQueue> {
        let statement = self.statement(statement_id).await?;
        let assigned: HashSet<&String> = statement
            .metadata
            .assignments
            .iter()
            .filter(|(_, a)| !a.writers.is_empty())
            .map(|(k, _)| k)
            .collect();

        let items: Vec<ReviewItem> = statement
            .metadata
            .review_queue
            .iter()
            .filter(|item| !assigned.contains(&item.work_key))
            .cloned()
            .collect();

        Ok(ReviewQueue {
            statement_id,
            suggested: items.iter().filter(|i| i.status == ReviewStatus::Suggested).count(),
            unmatched: items.iter().filter(|i| i.status == ReviewStatus::Unmatched).count(),
            conflicting: items.iter().filter(|i| i.status == ReviewStatus::Conflict).count(),
            items,
        })
    }

    /// Store operator assignments (work key → writers) and move to PROCESSED
    ///
    /// Every key must belong to the statement, every writer must exist, and
    /// splits must lie in (0, 100]. Keys not mentioned keep their assignment.
    pub async fn assign(
        &self,
        statement_id: Uuid,
        assignments: BTreeMap<String, Vec<AssignedWriter>>,
    ) -> EngineResult<Statement> {
        if assignments.is_empty() {
            return Err(EngineError::InvalidInput("No assignments supplied".to_string()));
        }

        let statement = self.statement(statement_id).await?;
        ensure_unpaid(&statement)?;

        let keys: HashSet<String> = statement.metadata.work_keys().into_iter().collect();
        let known_writers: HashSet<Uuid> = db::writers::existing_ids(&self.pool).await?.into_iter().collect();

        for (key, writers) in &assignments {
            if !keys.contains(key) {
                return Err(EngineError::InvalidInput(format!(
                    "Work key {:?} does not belong to statement {}",
                    key, statement_id
                )));
            }
            if writers.is_empty() {
                return Err(EngineError::InvalidInput(format!("No writers given for {:?}", key)));
            }
            let mut seen = HashSet::new();
            for writer in writers {
                if !known_writers.contains(&writer.writer_id) {
                    return Err(EngineError::NotFound(format!("Writer {}", writer.writer_id)));
                }
                if writer.split_percentage <= rust_decimal::Decimal::ZERO
                    || writer.split_percentage > rust_decimal::Decimal::ONE_HUNDRED
                {
                    return Err(EngineError::InvalidInput(format!(
                        "Split {} for writer {} outside (0, 100]",
                        writer.split_percentage, writer.writer_id
                    )));
                }
                if !seen.insert(writer.writer_id) {
                    return Err(EngineError::InvalidInput(format!(
                        "Writer {} listed twice for {:?}",
                        writer.writer_id, key
                    )));
                }
            }
        }

        let mut metadata = statement.metadata.clone();
        let assigned_keys: Vec<String> = assignments.keys().cloned().collect();
        for (key, writers) in assignments {
            metadata.assignments.insert(key, WorkAssignment::manual(writers));
        }
        metadata
            .review_queue
            .retain(|item| !assigned_keys.contains(&item.work_key));

        let status = next_status(statement.status, &metadata);
        self.store_metadata(statement_id, &metadata, status).await?;

        tracing::info!(
            statement_id = %statement_id,
            keys = assigned_keys.len(),
            remaining_unassigned = metadata.unassigned_rows().len(),
            "Assignments stored"
        );

        self.statement(statement_id).await
    }

    /// Materialize ledger entries from the stored assignments
    pub async fn publish(&self, statement_id: Uuid) -> EngineResult<PublishOutcome> {
        self.run_publish(statement_id, false).await
    }

    /// Recompute ledger entries for an already-published, unpaid statement
    pub async fn republish(&self, statement_id: Uuid) -> EngineResult<PublishOutcome> {
        self.run_publish(statement_id, true).await
    }

    async fn run_publish(&self, statement_id: Uuid, republish: bool) -> EngineResult<PublishOutcome> {
        let operation = if republish { "republish" } else { "publish" };
        let outcome = with_deadline(
            operation,
            self.settings.transaction_timeout,
            retry_on_lock(operation, self.settings.max_lock_wait_ms, || {
                self.publish_once(statement_id, republish)
            }),
        )
        .await?;

        self.event_bus.emit_lossy(RoyaltyEvent::StatementPublished {
            statement_id,
            entry_count: outcome.entry_count,
            total_commission: outcome.total_commission,
            total_net: outcome.total_net,
            republished: republish,
            timestamp: Utc::now(),
        });

        Ok(outcome)
    }

    async fn publish_once(&self, statement_id: Uuid, republish: bool) -> EngineResult<PublishOutcome> {
        let mut tx = begin_monitored(&self.pool, "publish_orchestrator::publish").await?;

        let statement = db::statements::load_statement(tx.conn(), statement_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Statement {}", statement_id)))?;
        ensure_unpaid(&statement)?;
        check_publish_status(&statement, republish)?;

        let unassigned = statement.metadata.unassigned_rows();
        if !unassigned.is_empty() {
            return Err(EngineError::UnassignedRows {
                count: unassigned.len(),
                sample: unassigned
                    .iter()
                    .take(self.settings.unassigned_sample_size)
                    .map(|(index, key)| format!("row {}: {}", index, key))
                    .collect(),
            });
        }

        let known_writers: HashSet<Uuid> = db::writers::existing_ids(tx.conn()).await?.into_iter().collect();
        if let Some(missing) = statement
            .metadata
            .assignments
            .values()
            .flat_map(|a| a.writers.iter())
            .find(|w| !known_writers.contains(&w.writer_id))
        {
            return Err(EngineError::NotFound(format!("Writer {}", missing.writer_id)));
        }

        let now = Utc::now();
        let context = commission_resolver::load_context(tx.conn(), now).await?;
        let settlement = SettlementBuilder::new(&context).build(statement_id, &statement.metadata);

        let replaced_entries = db::ledger_entries::delete_for_statement(tx.conn(), statement_id).await?;

        let mut batches = 0;
        for batch in settlement.entries.chunks(self.settings.batch_size) {
            db::ledger_entries::insert_batch(tx.conn(), batch).await?;
            batches += 1;
            tracing::debug!(
                statement_id = %statement_id,
                batch = batches,
                size = batch.len(),
                "Inserted ledger batch"
            );
        }

        let mut metadata = statement.metadata.clone();
        metadata.commission_snapshot = Some(context.snapshot());
        let marked = db::statements::mark_published(
            tx.conn(),
            statement_id,
            &metadata,
            settlement.total_commission,
            settlement.total_net,
            now,
        )
        .await?;
        if !marked {
            return Err(PreconditionViolation::PaymentInProgress {
                statement_id,
                payment_status: PaymentStatus::Pending,
            }
            .into());
        }

        tx.commit().await?;

        tracing::info!(
            statement_id = %statement_id,
            republish,
            entries = settlement.entries.len(),
            replaced = replaced_entries,
            batches,
            total_commission = %settlement.total_commission,
            total_net = %settlement.total_net,
            "Statement published"
        );

        Ok(PublishOutcome {
            statement_id,
            republished: republish,
            entry_count: settlement.entries.len(),
            batches,
            replaced_entries,
            total_commission: settlement.total_commission,
            total_net: settlement.total_net,
            writer_totals: settlement.writer_totals,
        })
    }

    /// Make a published statement's entries visible to writers
    ///
    /// Payment status stays UNPAID; no money moves.
    pub async fn queue_for_payment(&self, statement_id: Uuid) -> EngineResult<u64> {
        let statement = self.statement(statement_id).await?;
        ensure_unpaid(&statement)?;
        if statement.status != StatementStatus::Published {
            return Err(PreconditionViolation::WrongStatus {
                statement_id,
                status: statement.status,
                expected: StatementStatus::Published,
            }
            .into());
        }

        let visible = db::ledger_entries::set_visible(&self.pool, statement_id).await?;
        if visible == 0 {
            return Err(PreconditionViolation::NoLedgerEntries { statement_id }.into());
        }

        tracing::info!(statement_id = %statement_id, entries = visible, "Statement queued for payment");
        self.event_bus.emit_lossy(RoyaltyEvent::StatementQueued {
            statement_id,
            entry_count: visible,
            timestamp: Utc::now(),
        });

        Ok(visible)
    }

    /// Delete an unpaid statement and its ledger entries
    pub async fn delete(&self, statement_id: Uuid) -> EngineResult<()> {
        let statement = self.statement(statement_id).await?;
        ensure_unpaid(&statement)?;

        if !db::statements::delete_statement(&self.pool, statement_id).await? {
            // Lost a race with a payment run
            return Err(PreconditionViolation::PaymentInProgress {
                statement_id,
                payment_status: PaymentStatus::Pending,
            }
            .into());
        }

        tracing::info!(statement_id = %statement_id, "Statement deleted");
        Ok(())
    }

    pub async fn summary(&self, statement_id: Uuid) -> EngineResult<StatementSummary> {
        let statement = self.statement(statement_id).await?;
        let ledger_entries = db::ledger_entries::count_for_statement(&self.pool, statement_id).await?;
        let row_count = statement.metadata.rows.len();
        let unassigned_rows = statement.metadata.unassigned_rows().len();

        Ok(StatementSummary {
            id: statement.id,
            pro_type: statement.pro_type,
            period: statement.period.clone(),
            status: statement.status,
            payment_status: statement.payment_status,
            row_count,
            assigned_rows: row_count - unassigned_rows,
            unassigned_rows,
            ledger_entries,
            total_revenue: statement.total_revenue,
            total_commission: statement.total_commission,
            total_net: statement.total_net,
        })
    }

    pub async fn list(&self) -> EngineResult<Vec<StatementListing>> {
        db::statements::list_statements(&self.pool).await
    }

    async fn store_metadata(
        &self,
        statement_id: Uuid,
        metadata: &StatementMetadata,
        status: StatementStatus,
    ) -> EngineResult<()> {
        if !db::statements::update_metadata(&self.pool, statement_id, metadata, status).await? {
            return Err(PreconditionViolation::PaymentInProgress {
                statement_id,
                payment_status: PaymentStatus::Pending,
            }
            .into());
        }
        Ok(())
    }
}

fn ensure_unpaid(statement: &Statement) -> EngineResult<()> {
    match statement.payment_status {
        PaymentStatus::Unpaid => Ok(()),
        PaymentStatus::Paid => Err(PreconditionViolation::AlreadyPaid {
            statement_id: statement.id,
        }
        .into()),
        PaymentStatus::Pending => Err(PreconditionViolation::PaymentInProgress {
            statement_id: statement.id,
            payment_status: statement.payment_status,
        }
        .into()),
    }
}

/// Publish needs PROCESSED or PUBLISHED; republish needs PUBLISHED
fn check_publish_status(statement: &Statement, republish: bool) -> EngineResult<()> {
    let allowed = if republish {
        statement.status == StatementStatus::Published
    } else {
        statement.status != StatementStatus::Uploaded
    };
    if allowed {
        return Ok(());
    }
    if !republish && statement.metadata.assignments.is_empty() {
        return Err(PreconditionViolation::NoAssignments {
            statement_id: statement.id,
        }
        .into());
    }
    Err(PreconditionViolation::WrongStatus {
        statement_id: statement.id,
        status: statement.status,
        expected: if republish {
            StatementStatus::Published
        } else {
            StatementStatus::Processed
        },
    }
    .into())
}

/// UPLOADED moves to PROCESSED once any assignment exists; other states stay
fn next_status(current: StatementStatus, metadata: &StatementMetadata) -> StatementStatus {
    let has_assignment = metadata.assignments.values().any(|a| !a.writers.is_empty());
    match current {
        StatementStatus::Uploaded if has_assignment => StatementStatus::Processed,
        other => other,
    }
}
