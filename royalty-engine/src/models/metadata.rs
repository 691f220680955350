//! Versioned statement metadata
//!
//! Raw rows, work assignments, the operator review queue, and the commission
//! snapshot of the last publish are persisted as one JSON document on the
//! statement. The document carries a `schema_version` tag and is decoded
//! defensively: documents written before versioning (a loose bag of
//! camelCase fields with numeric or string amounts) are upgraded on read so
//! older statements stay replayable.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use super::{work_keys, RowMetadata, StatementRow};
use crate::error::{EngineError, EngineResult};

/// Version written by this build
pub const METADATA_SCHEMA_VERSION: u32 = 2;

/// How an assignment was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentSource {
    /// Stored by an operator
    Manual,
    /// Authoritative placement registry hit
    Placement,
    /// Fuzzy identity match at or above the auto-assign threshold
    Fuzzy,
}

/// One writer's share of a work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedWriter {
    pub writer_id: Uuid,
    pub split_percentage: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer_ipi: Option<String>,
}

/// Resolved mapping from a work key to its writers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkAssignment {
    pub writers: Vec<AssignedWriter>,
    pub source: AssignmentSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
}

impl WorkAssignment {
    pub fn manual(writers: Vec<AssignedWriter>) -> Self {
        Self {
            writers,
            source: AssignmentSource::Manual,
            confidence: None,
        }
    }
}

/// Which evidence produced a writer match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    Placement,
    IpiAndName,
    Ipi,
    Name,
}

/// A candidate writer for a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterMatch {
    pub writer_id: Uuid,
    pub split_percentage: Decimal,
    /// 0..=100
    pub confidence: u8,
    pub matched_by: MatchedBy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer_ipi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher_ipi: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// Candidates at 70..=89 need confirmation
    Suggested,
    /// No usable candidate; manual assignment required
    Unmatched,
    /// Rows under one work key matched different writers automatically
    Conflict,
}

/// Row waiting on an operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub row_index: usize,
    pub work_key: String,
    pub work_title: String,
    pub status: ReviewStatus,
    #[serde(default)]
    pub candidates: Vec<WriterMatch>,
}

/// Commission inputs used by the last publish run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionSnapshot {
    pub global_rate: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_policy_id: Option<Uuid>,
    #[serde(default)]
    pub overrides: BTreeMap<Uuid, Decimal>,
    pub taken_at: DateTime<Utc>,
}

/// Statement metadata document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementMetadata {
    pub schema_version: u32,
    pub rows: Vec<StatementRow>,
    #[serde(default)]
    pub assignments: BTreeMap<String, WorkAssignment>,
    #[serde(default)]
    pub review_queue: Vec<ReviewItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commission_snapshot: Option<CommissionSnapshot>,
}

impl StatementMetadata {
    pub fn new(rows: Vec<StatementRow>) -> Self {
        Self {
            schema_version: METADATA_SCHEMA_VERSION,
            rows,
            assignments: BTreeMap::new(),
            review_queue: Vec::new(),
            commission_snapshot: None,
        }
    }

    /// Assignment key for every row, in row order
    pub fn work_keys(&self) -> Vec<String> {
        work_keys(&self.rows)
    }

    /// Rows (index, key) whose key has no assignment with at least one writer
    pub fn unassigned_rows(&self) -> Vec<(usize, String)> {
        self.work_keys()
            .into_iter()
            .enumerate()
            .filter(|(_, key)| {
                self.assignments
                    .get(key)
                    .map_or(true, |a| a.writers.is_empty())
            })
            .collect()
    }

    pub fn encode(&self) -> EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode any supported metadata version
    pub fn decode(json: &str) -> EngineResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        match value.get("schema_version").and_then(Value::as_u64) {
            Some(v) if v == u64::from(METADATA_SCHEMA_VERSION) => {
                Ok(serde_json::from_value(value)?)
            }
            Some(v) => Err(EngineError::InvalidInput(format!(
                "Unsupported statement metadata version {}",
                v
            ))),
            None => upgrade_legacy(&value),
        }
    }
}

/// Upgrade an unversioned metadata document
///
/// Legacy documents stored rows as `{workTitle|title, grossRevenue|revenue,
/// performances, ...}` with publisher/DSP/writer fields either nested under
/// `metadata` or inlined, and assignments as `title -> [{writerId,
/// splitPercentage, writerIpiNumber?}]`.
fn upgrade_legacy(value: &Value) -> EngineResult<StatementMetadata> {
    let raw_rows = value
        .get("rows")
        .and_then(Value::as_array)
        .ok_or_else(|| EngineError::InvalidInput("Legacy metadata has no rows".to_string()))?;

    let mut rows = Vec::with_capacity(raw_rows.len());
    for (index, raw) in raw_rows.iter().enumerate() {
        let work_title = first_str(raw, &["workTitle", "work_title", "title", "songTitle"])
            .ok_or_else(|| {
                EngineError::InvalidInput(format!("Legacy row {} is missing a work title", index))
            })?;
        let gross_revenue = first_decimal(raw, &["grossRevenue", "gross_revenue", "revenue", "amount"])
            .unwrap_or(Decimal::ZERO);
        let performances = first_i64(raw, &["performances", "performanceCount"]).unwrap_or(0);

        let nested = raw.get("metadata").unwrap_or(raw);
        let metadata = RowMetadata {
            publisher_name: first_str(nested, &["publisherName", "publisher_name", "publisher"]),
            publisher_ipi: first_str(nested, &["publisherIpi", "publisher_ipi", "publisherIPI"]),
            dsp_name: first_str(nested, &["dspName", "dsp_name", "dsp"]),
            territory: first_str(nested, &["territory"]),
            writer_name: first_str(nested, &["writerName", "writer_name"]),
            writer_ipi: first_str(nested, &["writerIpi", "writer_ipi", "writerIpiNumber"]),
            split_percentage: first_decimal(nested, &["splitPercentage", "split_percentage"]),
        };

        rows.push(StatementRow {
            work_title,
            gross_revenue,
            performances,
            metadata,
        });
    }

    let mut assignments = BTreeMap::new();
    if let Some(map) = value.get("assignments").and_then(Value::as_object) {
        for (key, writers) in map {
            let Some(writers) = writers.as_array() else {
                continue;
            };
            let mut assigned = Vec::with_capacity(writers.len());
            for writer in writers {
                let writer_id = first_str(writer, &["writerId", "writer_id", "userId"])
                    .and_then(|s| Uuid::parse_str(&s).ok())
                    .ok_or_else(|| {
                        EngineError::InvalidInput(format!(
                            "Legacy assignment for {:?} has an invalid writer id",
                            key
                        ))
                    })?;
                let split_percentage = first_decimal(writer, &["splitPercentage", "split_percentage", "split"])
                    .unwrap_or(Decimal::ONE_HUNDRED);
                assigned.push(AssignedWriter {
                    writer_id,
                    split_percentage,
                    writer_ipi: first_str(writer, &["writerIpiNumber", "writerIpi", "writer_ipi"]),
                });
            }
            assignments.insert(key.clone(), WorkAssignment::manual(assigned));
        }
    }

    tracing::debug!(
        rows = rows.len(),
        assignments = assignments.len(),
        "Upgraded legacy statement metadata"
    );

    Ok(StatementMetadata {
        schema_version: METADATA_SCHEMA_VERSION,
        rows,
        assignments,
        review_queue: Vec::new(),
        commission_snapshot: None,
    })
}

fn first_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn first_decimal(value: &Value, keys: &[&str]) -> Option<Decimal> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find_map(|v| match v {
            Value::Number(n) => Decimal::from_str(&n.to_string())
                .or_else(|_| Decimal::from_scientific(&n.to_string()))
                .ok(),
            Value::String(s) => Decimal::from_str(s.trim().trim_start_matches('$')).ok(),
            _ => None,
        })
}

fn first_i64(value: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find_map(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
}
