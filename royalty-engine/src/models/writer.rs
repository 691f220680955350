//! Writer identities, balances, commission policy, and placements

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ProType;
use crate::error::EngineError;

/// Writer record exposed by the identity collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterRecord {
    pub id: Uuid,
    pub name: String,
    pub writer_ipi: Option<String>,
    pub publisher_ipi: Option<String>,
    pub pro_affiliation: Option<ProType>,
    pub commission_override_rate: Option<Decimal>,
}

impl WriterRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            writer_ipi: None,
            publisher_ipi: None,
            pro_affiliation: None,
            commission_override_rate: None,
        }
    }
}

/// Running balance fields on the writer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriterBalance {
    pub writer_id: Uuid,
    pub available_balance: Decimal,
    pub lifetime_earnings: Decimal,
}

/// Global commission rate, effective from a point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommissionPolicy {
    pub id: Uuid,
    pub rate: Decimal,
    pub effective_from: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RedemptionStatus {
    Pending,
    Approved,
    Rejected,
}

impl RedemptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedemptionStatus::Pending => "PENDING",
            RedemptionStatus::Approved => "APPROVED",
            RedemptionStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RedemptionStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RedemptionStatus::Pending),
            "APPROVED" => Ok(RedemptionStatus::Approved),
            "REJECTED" => Ok(RedemptionStatus::Rejected),
            other => Err(EngineError::InvalidInput(format!("Unknown redemption status: {}", other))),
        }
    }
}

/// Time-boxed commission reduction granted to a writer
///
/// While active, approved and unexpired, the writer pays `reduced_rate`
/// instead of the rate withheld at publish; the difference is refunded at
/// payment time and the redemption is consumed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommissionRedemption {
    pub id: Uuid,
    pub writer_id: Uuid,
    pub reduced_rate: Decimal,
    pub status: RedemptionStatus,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub consumed_statement_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl CommissionRedemption {
    /// Usable for a payment run happening at `now`
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.status == RedemptionStatus::Approved && self.expires_at > now
    }
}

/// Authoritative placement with its credited writers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub id: Uuid,
    pub work_title: String,
    pub publisher_ipi: Option<String>,
    pub dsp_name: Option<String>,
    pub credits: Vec<PlacementCredit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacementCredit {
    pub writer_id: Uuid,
    pub split_percentage: Decimal,
    pub writer_ipi: Option<String>,
}
