//! Error types for royalty-engine
//!
//! Taxonomy:
//! - Input errors: rejected before any mutation, fixed by the caller
//! - Precondition violations: typed reasons, no partial mutation
//! - Unassigned rows: publish blocked, count plus a short sample returned
//! - Transient failures: timeouts and lock contention, safe to retry
//!
//! Matching gaps are not errors; they are reported through
//! `ResolutionReport` and the review queue.

use thiserror::Error;
use uuid::Uuid;

use crate::models::{PaymentStatus, StatementStatus};

/// Engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input (missing work title, unsupported PRO type, bad rate)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not permitted in the statement's current state
    #[error("Precondition failed: {0}")]
    Precondition(PreconditionViolation),

    /// Publish blocked because rows have no assignment
    #[error("{count} row(s) have no writer assignment (sample: {})", sample.join(", "))]
    UnassignedRows { count: usize, sample: Vec<String> },

    /// Operation exceeded its transaction timeout and was rolled back
    #[error("{operation} timed out after {seconds}s; no changes were applied")]
    Timeout { operation: &'static str, seconds: u64 },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Statement metadata could not be encoded or decoded
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// royalty-common error
    #[error(transparent)]
    Common(#[from] royalty_common::Error),
}

/// Typed reasons a state transition was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionViolation {
    #[error("statement {statement_id} is already paid")]
    AlreadyPaid { statement_id: Uuid },

    #[error("statement {statement_id} is {status}; expected {expected}")]
    WrongStatus {
        statement_id: Uuid,
        status: StatementStatus,
        expected: StatementStatus,
    },

    #[error("statement {statement_id} has payment status {payment_status}")]
    PaymentInProgress {
        statement_id: Uuid,
        payment_status: PaymentStatus,
    },

    #[error("statement {statement_id} has no ledger entries")]
    NoLedgerEntries { statement_id: Uuid },

    #[error("statement {statement_id} has no assignments")]
    NoAssignments { statement_id: Uuid },
}

impl EngineError {
    /// True when retrying the same call may succeed
    ///
    /// Publish and payment are safe to retry: publish replaces the whole
    /// entry set and payment recomputes balances from ledger state.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Timeout { .. } => true,
            EngineError::Database(sqlx::Error::PoolTimedOut) => true,
            EngineError::Database(err) => err.to_string().contains("database is locked"),
            EngineError::Common(err) => err.is_transient(),
            _ => false,
        }
    }
}

impl EngineError {
    /// SQLite writer-lock contention, worth retrying after a backoff
    pub fn is_lock_contention(&self) -> bool {
        match self {
            EngineError::Database(err) => err.to_string().contains("database is locked"),
            EngineError::Common(royalty_common::Error::Database(err)) => {
                err.to_string().contains("database is locked")
            }
            _ => false,
        }
    }
}

impl From<PreconditionViolation> for EngineError {
    fn from(violation: PreconditionViolation) -> Self {
        EngineError::Precondition(violation)
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
