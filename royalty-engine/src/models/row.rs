//! Normalized statement rows, PRO types, and work keys

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Performing-rights organization (or aggregator) a statement comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProType {
    Bmi,
    Ascap,
    Sesac,
    Mlc,
    Gmr,
    Socan,
    Prs,
    Other,
}

impl ProType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProType::Bmi => "BMI",
            ProType::Ascap => "ASCAP",
            ProType::Sesac => "SESAC",
            ProType::Mlc => "MLC",
            ProType::Gmr => "GMR",
            ProType::Socan => "SOCAN",
            ProType::Prs => "PRS",
            ProType::Other => "OTHER",
        }
    }
}

impl fmt::Display for ProType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BMI" => Ok(ProType::Bmi),
            "ASCAP" => Ok(ProType::Ascap),
            "SESAC" => Ok(ProType::Sesac),
            "MLC" => Ok(ProType::Mlc),
            "GMR" => Ok(ProType::Gmr),
            "SOCAN" => Ok(ProType::Socan),
            "PRS" => Ok(ProType::Prs),
            "OTHER" => Ok(ProType::Other),
            other => Err(EngineError::InvalidInput(format!(
                "Unsupported PRO type: {:?}",
                other
            ))),
        }
    }
}

/// Descriptive fields carried alongside each row
///
/// Publisher IPI and DSP name double as disambiguation keys for titles that
/// recur within one statement. Writer name/IPI feed fuzzy matching when no
/// placement exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher_ipi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsp_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub territory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer_ipi: Option<String>,
    /// Writer share reported by the PRO, when the row is per-writer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_percentage: Option<Decimal>,
}

/// One normalized statement row, as produced by the row source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementRow {
    pub work_title: String,
    pub gross_revenue: Decimal,
    #[serde(default)]
    pub performances: i64,
    #[serde(default)]
    pub metadata: RowMetadata,
}

impl StatementRow {
    pub fn new(work_title: impl Into<String>, gross_revenue: Decimal) -> Self {
        Self {
            work_title: work_title.into(),
            gross_revenue,
            performances: 0,
            metadata: RowMetadata::default(),
        }
    }

    pub fn with_publisher_ipi(mut self, ipi: impl Into<String>) -> Self {
        self.metadata.publisher_ipi = Some(ipi.into());
        self
    }

    pub fn with_dsp(mut self, dsp: impl Into<String>) -> Self {
        self.metadata.dsp_name = Some(dsp.into());
        self
    }

    pub fn with_writer(mut self, name: impl Into<String>, ipi: Option<&str>) -> Self {
        self.metadata.writer_name = Some(name.into());
        self.metadata.writer_ipi = ipi.map(str::to_string);
        self
    }

    /// Reject rows that cannot be settled
    pub fn validate(&self, index: usize) -> Result<(), EngineError> {
        if self.work_title.trim().is_empty() {
            return Err(EngineError::InvalidInput(format!(
                "Row {} is missing a work title",
                index
            )));
        }
        if self.performances < 0 {
            return Err(EngineError::InvalidInput(format!(
                "Row {} has negative performances",
                index
            )));
        }
        if let Some(split) = self.metadata.split_percentage {
            if split <= Decimal::ZERO || split > Decimal::ONE_HUNDRED {
                return Err(EngineError::InvalidInput(format!(
                    "Row {} has split percentage {} outside (0, 100]",
                    index, split
                )));
            }
        }
        Ok(())
    }

    fn disambiguator(&self) -> (String, String) {
        (
            self.metadata
                .publisher_ipi
                .as_deref()
                .map(normalize_ipi)
                .unwrap_or_default(),
            self.metadata
                .dsp_name
                .as_deref()
                .map(|d| d.trim().to_lowercase())
                .unwrap_or_default(),
        )
    }
}

/// Compute the assignment key for every row of a statement
///
/// A title that appears under more than one (publisher IPI, DSP) pair is
/// ambiguous; its rows are keyed `title|publisher_ipi|dsp` so each variant is
/// assigned independently. Rows sharing the full key share one assignment.
pub fn work_keys(rows: &[StatementRow]) -> Vec<String> {
    // First spelling seen for a normalized title is used in every key
    let mut display: HashMap<String, String> = HashMap::new();
    let mut variants: HashMap<String, HashSet<(String, String)>> = HashMap::new();
    for row in rows {
        let normalized = normalize_title(&row.work_title);
        display
            .entry(normalized.clone())
            .or_insert_with(|| row.work_title.trim().to_string());
        variants.entry(normalized).or_default().insert(row.disambiguator());
    }

    rows.iter()
        .map(|row| {
            let normalized = normalize_title(&row.work_title);
            let title = display
                .get(&normalized)
                .map(String::as_str)
                .unwrap_or_else(|| row.work_title.trim());
            let ambiguous = variants.get(&normalized).is_some_and(|v| v.len() > 1);
            if ambiguous {
                let (ipi, dsp) = row.disambiguator();
                format!("{}|{}|{}", title, ipi, dsp)
            } else {
                title.to_string()
            }
        })
        .collect()
}

/// Normalize an IPI number for comparison
///
/// Drops separators (spaces, dashes, dots, slashes) and leading zeros and
/// upper-cases any letters, so `00-123.456` and `123456` compare equal.
pub fn normalize_ipi(ipi: &str) -> String {
    let cleaned: String = ipi
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    cleaned.trim_start_matches('0').to_string()
}

/// Normalize a work title for exact registry lookups
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
