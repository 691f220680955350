//! Statement aggregate root and its lifecycle states

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{ProType, StatementMetadata};
use crate::error::EngineError;

/// Processing lifecycle: UPLOADED → PROCESSED → PUBLISHED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementStatus {
    Uploaded,
    Processed,
    Published,
}

impl StatementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementStatus::Uploaded => "UPLOADED",
            StatementStatus::Processed => "PROCESSED",
            StatementStatus::Published => "PUBLISHED",
        }
    }
}

impl fmt::Display for StatementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatementStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPLOADED" => Ok(StatementStatus::Uploaded),
            "PROCESSED" => Ok(StatementStatus::Processed),
            "PUBLISHED" => Ok(StatementStatus::Published),
            other => Err(EngineError::InvalidInput(format!("Unknown statement status: {}", other))),
        }
    }
}

/// Payment lifecycle, orthogonal to processing: UNPAID → PENDING → PAID
///
/// PENDING marks a payment run that has claimed the statement; it only
/// exists inside the payment transaction and rolls back with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Unpaid,
    Pending,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNPAID" => Ok(PaymentStatus::Unpaid),
            "PENDING" => Ok(PaymentStatus::Pending),
            "PAID" => Ok(PaymentStatus::Paid),
            other => Err(EngineError::InvalidInput(format!("Unknown payment status: {}", other))),
        }
    }
}

/// Statement record
#[derive(Debug, Clone, Serialize)]
pub struct Statement {
    pub id: Uuid,
    pub pro_type: ProType,
    pub period: Option<String>,
    pub status: StatementStatus,
    pub payment_status: PaymentStatus,
    pub total_revenue: Decimal,
    pub total_commission: Decimal,
    pub total_net: Decimal,
    pub metadata: StatementMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Statement {
    /// New statement in UPLOADED/UNPAID
    pub fn new(pro_type: ProType, period: Option<String>, metadata: StatementMetadata) -> Self {
        let now = Utc::now();
        let total_revenue = metadata.rows.iter().map(|r| r.gross_revenue).sum();
        Self {
            id: Uuid::new_v4(),
            pro_type,
            period,
            status: StatementStatus::Uploaded,
            payment_status: PaymentStatus::Unpaid,
            total_revenue,
            total_commission: Decimal::ZERO,
            total_net: Decimal::ZERO,
            metadata,
            created_at: now,
            updated_at: now,
            published_at: None,
            paid_at: None,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }
}

/// Read-only statement overview for operators and exports
#[derive(Debug, Clone, Serialize)]
pub struct StatementSummary {
    pub id: Uuid,
    pub pro_type: ProType,
    pub period: Option<String>,
    pub status: StatementStatus,
    pub payment_status: PaymentStatus,
    pub row_count: usize,
    pub assigned_rows: usize,
    pub unassigned_rows: usize,
    pub ledger_entries: u64,
    pub total_revenue: Decimal,
    pub total_commission: Decimal,
    pub total_net: Decimal,
}
