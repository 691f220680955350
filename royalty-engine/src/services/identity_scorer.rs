//! Identity Scorer
//!
//! Pure, side-effect-free fuzzy scoring of known writers against the writer
//! identity reported on a statement row. Produces a ranked candidate list and
//! a decision; persistence and placement lookups live in `writer_resolver`.
//!
//! Gates (a failing gate disqualifies the candidate outright):
//! - the writer's PRO affiliation must equal the statement's PRO type
//! - when the platform represents specific publishers, the writer's
//!   publisher IPI must be one of them (normalized comparison)
//!
//! Scores (0..=100):
//! - IPI equal and name similarity >= 0.80: 100
//! - IPI equal, name dissimilar or missing: 95
//! - name only: similarity * 100, capped just below the auto threshold, so
//!   a name alone never assigns without review
//!
//! A best score shared by two candidates is never auto-assigned.

use rust_decimal::Decimal;
use std::collections::HashSet;

use crate::models::{normalize_ipi, MatchedBy, ProType, StatementRow, WriterMatch, WriterRecord};

/// Decision for a row's best candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Confidence >= 90 with a single best candidate
    AutoAssign,
    /// Confidence 70..=89, operator confirms one of the top candidates
    Suggest,
    /// Confidence < 70 or no candidate
    Unmatched,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::AutoAssign => "auto_assign",
            Decision::Suggest => "suggest",
            Decision::Unmatched => "unmatched",
        }
    }
}

/// Scored outcome for one row
#[derive(Debug, Clone)]
pub struct ScoredRow {
    pub decision: Decision,
    /// AutoAssign: the best match only. Suggest: up to `max_suggestions`
    /// candidates at or above the suggest threshold. Unmatched: empty.
    pub matches: Vec<WriterMatch>,
}

/// Fuzzy identity scorer
#[derive(Debug, Clone)]
pub struct IdentityScorer {
    /// Minimum confidence for auto-assignment (default 90)
    auto_threshold: u8,
    /// Minimum confidence for a suggestion (default 70)
    suggest_threshold: u8,
    /// Name similarity that upgrades an IPI match to 100 (default 0.80)
    name_agreement: f64,
    /// Candidates kept for review (default 3)
    max_suggestions: usize,
    /// Normalized publisher IPIs the platform represents; empty disables the gate
    platform_publisher_ipis: HashSet<String>,
}

impl Default for IdentityScorer {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl IdentityScorer {
    pub fn new(platform_publisher_ipis: &[String]) -> Self {
        Self {
            auto_threshold: 90,
            suggest_threshold: 70,
            name_agreement: 0.80,
            max_suggestions: 3,
            platform_publisher_ipis: platform_publisher_ipis
                .iter()
                .map(|ipi| normalize_ipi(ipi))
                .filter(|ipi| !ipi.is_empty())
                .collect(),
        }
    }

    pub fn decision_for(&self, confidence: u8) -> Decision {
        if confidence >= self.auto_threshold {
            Decision::AutoAssign
        } else if confidence >= self.suggest_threshold {
            Decision::Suggest
        } else {
            Decision::Unmatched
        }
    }

    /// Candidate passes the PRO and publisher gates
    pub fn passes_gates(&self, writer: &WriterRecord, pro_type: ProType) -> bool {
        if writer.pro_affiliation != Some(pro_type) {
            return false;
        }
        if self.platform_publisher_ipis.is_empty() {
            return true;
        }
        writer
            .publisher_ipi
            .as_deref()
            .map(normalize_ipi)
            .is_some_and(|ipi| self.platform_publisher_ipis.contains(&ipi))
    }

    /// Score one candidate against the row's reported writer identity
    ///
    /// Returns None when the row carries no comparable identity or the
    /// candidate shares neither IPI nor any name similarity.
    pub fn score(&self, row: &StatementRow, writer: &WriterRecord) -> Option<(u8, MatchedBy)> {
        let row_ipi = row
            .metadata
            .writer_ipi
            .as_deref()
            .map(normalize_ipi)
            .filter(|ipi| !ipi.is_empty());
        let writer_ipi = writer
            .writer_ipi
            .as_deref()
            .map(normalize_ipi)
            .filter(|ipi| !ipi.is_empty());
        let ipi_equal = matches!((&row_ipi, &writer_ipi), (Some(a), Some(b)) if a == b);

        let similarity = row
            .metadata
            .writer_name
            .as_deref()
            .map(|name| name_similarity(name, &writer.name));

        match (ipi_equal, similarity) {
            (true, Some(sim)) if sim >= self.name_agreement => Some((100, MatchedBy::IpiAndName)),
            (true, _) => Some((95, MatchedBy::Ipi)),
            (false, Some(sim)) if sim > 0.0 => {
                let cap = f64::from(self.auto_threshold.saturating_sub(1));
                let confidence = (sim * 100.0).round().clamp(0.0, cap) as u8;
                Some((confidence, MatchedBy::Name))
            }
            _ => None,
        }
    }

    /// Rank every gated candidate, best first
    ///
    /// Ties break on writer name then id so results are deterministic.
    pub fn rank(&self, row: &StatementRow, pro_type: ProType, candidates: &[WriterRecord]) -> Vec<WriterMatch> {
        let split = row.metadata.split_percentage.unwrap_or(Decimal::ONE_HUNDRED);

        let mut scored: Vec<(&WriterRecord, u8, MatchedBy)> = candidates
            .iter()
            .filter(|writer| self.passes_gates(writer, pro_type))
            .filter_map(|writer| {
                self.score(row, writer)
                    .map(|(confidence, matched_by)| (writer, confidence, matched_by))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| a.0.name.cmp(&b.0.name))
                .then_with(|| a.0.id.cmp(&b.0.id))
        });

        scored
            .into_iter()
            .map(|(writer, confidence, matched_by)| WriterMatch {
                writer_id: writer.id,
                split_percentage: split,
                confidence,
                matched_by,
                writer_ipi: writer.writer_ipi.clone(),
                publisher_ipi: writer.publisher_ipi.clone(),
            })
            .collect()
    }

    /// Rank and decide
    pub fn assess(&self, row: &StatementRow, pro_type: ProType, candidates: &[WriterRecord]) -> ScoredRow {
        let ranked = self.rank(row, pro_type, candidates);

        let decision = match ranked.as_slice() {
            [] => Decision::Unmatched,
            [best, runner_up, ..] if best.confidence == runner_up.confidence => {
                match self.decision_for(best.confidence) {
                    Decision::AutoAssign => Decision::Suggest,
                    other => other,
                }
            }
            [best, ..] => self.decision_for(best.confidence),
        };

        let matches = match decision {
            Decision::AutoAssign => ranked.into_iter().take(1).collect(),
            Decision::Suggest => ranked
                .into_iter()
                .filter(|m| m.confidence >= self.suggest_threshold)
                .take(self.max_suggestions)
                .collect(),
            Decision::Unmatched => Vec::new(),
        };

        ScoredRow { decision, matches }
    }
}

/// Jaro-Winkler similarity over case-folded, punctuation-free, token-sorted
/// names, so "Doe, Jane" and "jane doe" compare equal
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = name_tokens(a);
    let b = name_tokens(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::jaro_winkler(&a, &b)
}

fn name_tokens(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect();
    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn writer(name: &str, pro: ProType, writer_ipi: Option<&str>, publisher_ipi: Option<&str>) -> WriterRecord {
        WriterRecord {
            writer_ipi: writer_ipi.map(str::to_string),
            publisher_ipi: publisher_ipi.map(str::to_string),
            pro_affiliation: Some(pro),
            ..WriterRecord::new(name)
        }
    }

    #[test]
    fn test_name_similarity_ignores_order_and_punctuation() {
        assert_eq!(name_similarity("Doe, Jane", "jane doe"), 1.0);
        assert!(name_similarity("Jane Doe", "Jane Do") > 0.9);
        assert_eq!(name_similarity("", "Jane"), 0.0);
    }

    #[test]
    fn test_affiliation_gate_excludes_other_pro() {
        let scorer = IdentityScorer::new(&["00-555.123".to_string()]);
        let bmi = writer("Jane Doe", ProType::Bmi, None, Some("555123"));
        let ascap = writer("Jane Doe", ProType::Ascap, None, Some("555123"));
        let no_publisher = writer("Jane Doe", ProType::Bmi, None, None);

        assert!(scorer.passes_gates(&bmi, ProType::Bmi));
        assert!(!scorer.passes_gates(&ascap, ProType::Bmi));
        assert!(!scorer.passes_gates(&no_publisher, ProType::Bmi));

        let row = StatementRow::new("Song", dec!(1)).with_writer("Jane Doe", None);
        let ranked = scorer.rank(&row, ProType::Bmi, &[bmi.clone(), ascap]);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].writer_id, bmi.id);
    }

    #[test]
    fn test_publisher_gate_disabled_when_unconfigured() {
        let scorer = IdentityScorer::default();
        assert!(scorer.passes_gates(&writer("A", ProType::Mlc, None, None), ProType::Mlc));
    }

    #[test]
    fn test_ipi_scores() {
        let scorer = IdentityScorer::default();
        let jane = writer("Jane Doe", ProType::Bmi, Some("00012345678"), None);

        let both = StatementRow::new("S", dec!(1)).with_writer("DOE JANE", Some("12345678"));
        assert_eq!(scorer.score(&both, &jane), Some((100, MatchedBy::IpiAndName)));

        let ipi_only = StatementRow::new("S", dec!(1)).with_writer("Someone Else", Some("123-456-78"));
        assert_eq!(scorer.score(&ipi_only, &jane), Some((95, MatchedBy::Ipi)));

        let name_only = StatementRow::new("S", dec!(1)).with_writer("Jane Doe", None);
        assert_eq!(scorer.score(&name_only, &jane), Some((89, MatchedBy::Name)));

        let nothing = StatementRow::new("S", dec!(1));
        assert_eq!(scorer.score(&nothing, &jane), None);
    }

    #[test]
    fn test_assess_thresholds() {
        let scorer = IdentityScorer::default();
        assert_eq!(scorer.decision_for(90), Decision::AutoAssign);
        assert_eq!(scorer.decision_for(89), Decision::Suggest);
        assert_eq!(scorer.decision_for(70), Decision::Suggest);
        assert_eq!(scorer.decision_for(69), Decision::Unmatched);

        let jane = writer("Jane Doe", ProType::Bmi, Some("111"), None);
        let row = StatementRow::new("S", dec!(1)).with_writer("Jane Doe", Some("111"));
        let scored = scorer.assess(&row, ProType::Bmi, &[jane.clone()]);
        assert_eq!(scored.decision, Decision::AutoAssign);
        assert_eq!(scored.matches[0].writer_id, jane.id);
        assert_eq!(scored.matches[0].split_percentage, dec!(100));

        let empty = scorer.assess(&row, ProType::Ascap, &[jane]);
        assert_eq!(empty.decision, Decision::Unmatched);
        assert!(empty.matches.is_empty());
    }

    #[test]
    fn test_ranked_candidates_sorted_and_capped() {
        let scorer = IdentityScorer::default();
        let candidates: Vec<WriterRecord> = ["John Smith", "Jon Smyth", "Joan Smith", "Jon Smithe"]
            .iter()
            .map(|n| writer(n, ProType::Sesac, None, None))
            .collect();
        let row = StatementRow::new("S", dec!(1)).with_writer("Jon Smith", None);

        let ranked = scorer.rank(&row, ProType::Sesac, &candidates);
        assert!(ranked.windows(2).all(|w| w[0].confidence >= w[1].confidence));

        let scored = scorer.assess(&row, ProType::Sesac, &candidates);
        assert!(scored.matches.len() <= 3);
        assert!(scored.matches.iter().all(|m| m.matched_by == MatchedBy::Name));
    }

    #[test]
    fn test_name_alone_never_auto_assigns() {
        let scorer = IdentityScorer::default();
        let john = writer("John Smith", ProType::Bmi, Some("222"), None);

        let row = StatementRow::new("S", dec!(1)).with_writer("Jon Smyth", None);
        let scored = scorer.assess(&row, ProType::Bmi, &[john.clone()]);
        assert_eq!(scored.decision, Decision::Suggest);
        assert_eq!(scored.matches[0].writer_id, john.id);
        assert!(scored.matches[0].confidence < 90);

        let exact = StatementRow::new("S", dec!(1)).with_writer("John Smith", None);
        assert_eq!(scorer.assess(&exact, ProType::Bmi, &[john]).decision, Decision::Suggest);
    }

    #[test]
    fn test_tied_best_candidates_need_review() {
        let scorer = IdentityScorer::default();
        let first = writer("Jane Doe", ProType::Bmi, Some("111"), None);
        let second = writer("Jane Doe", ProType::Bmi, Some("111"), None);

        // Same IPI and name on two records: 100 each
        let row = StatementRow::new("S", dec!(1)).with_writer("Jane Doe", Some("111"));
        let scored = scorer.assess(&row, ProType::Bmi, &[first.clone(), second.clone()]);
        assert_eq!(scored.decision, Decision::Suggest);
        assert_eq!(scored.matches.len(), 2);

        // A distinct IPI breaks the tie
        let other = writer("Jane Doe", ProType::Bmi, Some("999"), None);
        let scored = scorer.assess(&row, ProType::Bmi, &[first.clone(), other]);
        assert_eq!(scored.decision, Decision::AutoAssign);
        assert_eq!(scored.matches.len(), 1);
        assert_eq!(scored.matches[0].writer_id, first.id);
        assert_eq!(Decision::Suggest.as_str(), "suggest");
    }
}
