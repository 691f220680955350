//! Writer Resolver
//!
//! Resolves statement rows to writers. Each row is resolved on its own:
//! first against the authoritative placement registry (confidence 100), then,
//! only when no placement exists, by fuzzy identity scoring.
//!
//! "No match" is a normal outcome reported through `ResolutionReport`; the
//! only error a row can raise is malformed input. Rows sharing a work key
//! whose automatic matches disagree are never merged: the key goes to the
//! review queue as a conflict.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use super::identity_scorer::{Decision, IdentityScorer};
use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    normalize_ipi, normalize_title, AssignedWriter, AssignmentSource, MatchedBy, Placement, ProType, ReviewItem,
    ReviewStatus, StatementMetadata, StatementRow, WorkAssignment, WriterMatch, WriterRecord,
};

/// Authoritative placement lookups (read-only)
#[async_trait]
pub trait PlacementRegistry: Send + Sync {
    /// Every placement registered under the title
    async fn placements_for_title(&self, work_title: &str) -> EngineResult<Vec<Placement>>;

    /// Placements for a set of normalized titles, keyed by normalized title
    async fn placements_for_titles(&self, normalized_titles: &[String]) -> EngineResult<HashMap<String, Vec<Placement>>> {
        let mut by_title = HashMap::with_capacity(normalized_titles.len());
        for title in normalized_titles {
            by_title.insert(title.clone(), self.placements_for_title(title).await?);
        }
        Ok(by_title)
    }
}

/// Known writer identities
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Writers that could match rows of a statement from `pro_type`
    async fn candidates(&self, pro_type: ProType) -> EngineResult<Vec<WriterRecord>>;
}

/// Placement registry backed by the `placements` tables
pub struct SqlitePlacementRegistry {
    pool: SqlitePool,
}

impl SqlitePlacementRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlacementRegistry for SqlitePlacementRegistry {
    async fn placements_for_title(&self, work_title: &str) -> EngineResult<Vec<Placement>> {
        let mut conn = self.pool.acquire().await?;
        db::placements::find_by_title(&mut conn, work_title).await
    }

    async fn placements_for_titles(&self, normalized_titles: &[String]) -> EngineResult<HashMap<String, Vec<Placement>>> {
        let mut conn = self.pool.acquire().await?;
        db::placements::find_by_titles(&mut conn, normalized_titles).await
    }
}

/// Identity directory backed by the `writers` table
pub struct SqliteIdentityDirectory {
    pool: SqlitePool,
}

impl SqliteIdentityDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityDirectory for SqliteIdentityDirectory {
    async fn candidates(&self, pro_type: ProType) -> EngineResult<Vec<WriterRecord>> {
        db::writers::list_by_affiliation(&self.pool, pro_type).await
    }
}

/// Pick the most specific placement compatible with the row
///
/// A placement constrains the match only on the fields it sets: a publisher
/// IPI must equal the row's (normalized), a DSP name must equal the row's
/// (case-insensitive). Among compatible placements the one setting the most
/// fields wins; ties keep registry order.
pub fn select_placement<'p>(placements: &'p [Placement], row: &StatementRow) -> Option<&'p Placement> {
    let row_ipi = row.metadata.publisher_ipi.as_deref().map(normalize_ipi);
    let row_dsp = row.metadata.dsp_name.as_deref().map(|d| d.trim().to_lowercase());

    let mut best: Option<(&Placement, usize)> = None;
    for placement in placements {
        let ipi_ok = match placement.publisher_ipi.as_deref() {
            None => true,
            Some(ipi) => row_ipi.as_deref() == Some(normalize_ipi(ipi).as_str()),
        };
        let dsp_ok = match placement.dsp_name.as_deref() {
            None => true,
            Some(dsp) => row_dsp.as_deref() == Some(dsp.trim().to_lowercase().as_str()),
        };
        if !(ipi_ok && dsp_ok) || placement.credits.is_empty() {
            continue;
        }
        let specificity =
            usize::from(placement.publisher_ipi.is_some()) + usize::from(placement.dsp_name.is_some());
        if best.map_or(true, |(_, s)| specificity > s) {
            best = Some((placement, specificity));
        }
    }
    best.map(|(p, _)| p)
}

/// How a single row resolved
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Authoritative(Vec<WriterMatch>),
    AutoMatched(WriterMatch),
    Suggested(Vec<WriterMatch>),
    Unmatched,
}

impl RowOutcome {
    /// Matches in ranked order (empty when unmatched)
    pub fn matches(&self) -> Vec<WriterMatch> {
        match self {
            RowOutcome::Authoritative(m) | RowOutcome::Suggested(m) => m.clone(),
            RowOutcome::AutoMatched(m) => vec![m.clone()],
            RowOutcome::Unmatched => Vec::new(),
        }
    }

    /// Assignment when the outcome needs no review
    fn assignment(&self) -> Option<WorkAssignment> {
        let (matches, source) = match self {
            RowOutcome::Authoritative(m) => (m.as_slice(), AssignmentSource::Placement),
            RowOutcome::AutoMatched(m) => (std::slice::from_ref(m), AssignmentSource::Fuzzy),
            _ => return None,
        };
        Some(WorkAssignment {
            writers: matches
                .iter()
                .map(|m| AssignedWriter {
                    writer_id: m.writer_id,
                    split_percentage: m.split_percentage,
                    writer_ipi: m.writer_ipi.clone(),
                })
                .collect(),
            source,
            confidence: matches.iter().map(|m| m.confidence).min(),
        })
    }
}

/// Statement-wide resolution result
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ResolutionReport {
    pub total_rows: usize,
    /// Rows whose key already had an operator assignment (left untouched)
    pub manual_rows: usize,
    pub authoritative_rows: usize,
    pub auto_matched_rows: usize,
    pub suggested_rows: usize,
    pub unmatched_rows: usize,
    /// Rows under a work key whose automatic matches disagree
    pub conflicting_rows: usize,
    /// Automatic assignments by work key
    #[serde(skip)]
    pub assignments: BTreeMap<String, WorkAssignment>,
    pub review_queue: Vec<ReviewItem>,
}

impl ResolutionReport {
    /// Rows still needing an operator
    pub fn pending_rows(&self) -> usize {
        self.review_queue.len()
    }
}

/// Writer Resolver
pub struct WriterResolver {
    registry: Arc<dyn PlacementRegistry>,
    directory: Arc<dyn IdentityDirectory>,
    scorer: IdentityScorer,
}

impl WriterResolver {
    pub fn new(
        registry: Arc<dyn PlacementRegistry>,
        directory: Arc<dyn IdentityDirectory>,
        scorer: IdentityScorer,
    ) -> Self {
        Self {
            registry,
            directory,
            scorer,
        }
    }

    /// Resolver over the engine database
    pub fn sqlite(pool: SqlitePool, platform_publisher_ipis: &[String]) -> Self {
        Self::new(
            Arc::new(SqlitePlacementRegistry::new(pool.clone())),
            Arc::new(SqliteIdentityDirectory::new(pool)),
            IdentityScorer::new(platform_publisher_ipis),
        )
    }

    /// Ranked matches for one row
    ///
    /// Authoritative placements come back alone at confidence 100. Otherwise
    /// the fuzzy candidates are returned (best match only when
    /// auto-assignable, top suggestions when in the review band).
    pub async fn resolve(&self, row: &StatementRow, pro_type: ProType) -> EngineResult<Vec<WriterMatch>> {
        let candidates = self.directory.candidates(pro_type).await?;
        let placements = self.registry.placements_for_title(&row.work_title).await?;
        Ok(self.resolve_row(row, pro_type, &placements, &candidates)?.matches())
    }

    fn resolve_row(
        &self,
        row: &StatementRow,
        pro_type: ProType,
        placements: &[Placement],
        candidates: &[WriterRecord],
    ) -> EngineResult<RowOutcome> {
        if row.work_title.trim().is_empty() {
            return Err(EngineError::InvalidInput("Row is missing a work title".to_string()));
        }

        if let Some(placement) = select_placement(placements, row) {
            let matches = placement
                .credits
                .iter()
                .map(|credit| WriterMatch {
                    writer_id: credit.writer_id,
                    split_percentage: credit.split_percentage,
                    confidence: 100,
                    matched_by: MatchedBy::Placement,
                    writer_ipi: credit.writer_ipi.clone(),
                    publisher_ipi: placement.publisher_ipi.clone(),
                })
                .collect();
            return Ok(RowOutcome::Authoritative(matches));
        }

        let scored = self.scorer.assess(row, pro_type, candidates);
        tracing::trace!(
            work_title = %row.work_title,
            decision = scored.decision.as_str(),
            candidates = scored.matches.len(),
            "Scored row"
        );
        Ok(match scored.decision {
            Decision::AutoAssign => match scored.matches.into_iter().next() {
                Some(best) => RowOutcome::AutoMatched(best),
                None => RowOutcome::Unmatched,
            },
            Decision::Suggest => RowOutcome::Suggested(scored.matches),
            Decision::Unmatched => RowOutcome::Unmatched,
        })
    }

    /// Resolve every row of a statement
    ///
    /// Keys holding a manual assignment are skipped. Rows sharing a work key
    /// are the same work: when their automatic assignments agree the key
    /// takes it, when they disagree every row of the key goes to the review
    /// queue as a conflict and the key stays unassigned. Rows whose key
    /// stays unassigned go to the review queue with their own candidates.
    pub async fn resolve_statement(
        &self,
        metadata: &StatementMetadata,
        pro_type: ProType,
    ) -> EngineResult<ResolutionReport> {
        let candidates = self.directory.candidates(pro_type).await?;
        let titles: Vec<String> = metadata
            .rows
            .iter()
            .map(|row| normalize_title(&row.work_title))
            .filter(|title| !title.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let placements = self.registry.placements_for_titles(&titles).await?;

        let keys = metadata.work_keys();
        let mut report = ResolutionReport {
            total_rows: metadata.rows.len(),
            ..Default::default()
        };
        let mut outcomes: Vec<(usize, RowOutcome)> = Vec::new();
        let mut conflicted: BTreeSet<String> = BTreeSet::new();

        for (index, (row, key)) in metadata.rows.iter().zip(keys.iter()).enumerate() {
            let is_manual = metadata
                .assignments
                .get(key)
                .is_some_and(|a| a.source == AssignmentSource::Manual && !a.writers.is_empty());
            if is_manual {
                report.manual_rows += 1;
                continue;
            }

            let known = placements
                .get(&normalize_title(&row.work_title))
                .map(Vec::as_slice)
                .unwrap_or_default();
            let outcome = self
                .resolve_row(row, pro_type, known, &candidates)
                .map_err(|e| match e {
                    EngineError::InvalidInput(msg) => EngineError::InvalidInput(format!("Row {}: {}", index, msg)),
                    other => other,
                })?;

            match &outcome {
                RowOutcome::Authoritative(_) => report.authoritative_rows += 1,
                RowOutcome::AutoMatched(_) => report.auto_matched_rows += 1,
                RowOutcome::Suggested(_) => report.suggested_rows += 1,
                RowOutcome::Unmatched => report.unmatched_rows += 1,
            }

            if let Some(assignment) = outcome.assignment() {
                let agrees = report
                    .assignments
                    .get(key)
                    .map(|existing| same_writers(existing, &assignment));
                match agrees {
                    None => {
                        report.assignments.insert(key.clone(), assignment);
                    }
                    Some(true) => {}
                    Some(false) => {
                        conflicted.insert(key.clone());
                    }
                }
            }
            outcomes.push((index, outcome));
        }

        for key in &conflicted {
            report.assignments.remove(key);
            tracing::warn!(work_key = %key, "Rows under one work key matched different writers");
        }

        for (index, outcome) in outcomes {
            let key = &keys[index];
            let status = if conflicted.contains(key) {
                report.conflicting_rows += 1;
                ReviewStatus::Conflict
            } else if report.assignments.contains_key(key) {
                continue;
            } else if matches!(outcome, RowOutcome::Suggested(_)) {
                ReviewStatus::Suggested
            } else {
                ReviewStatus::Unmatched
            };
            report.review_queue.push(ReviewItem {
                row_index: index,
                work_key: key.clone(),
                work_title: metadata.rows[index].work_title.trim().to_string(),
                status,
                candidates: outcome.matches(),
            });
        }

        tracing::info!(
            rows = report.total_rows,
            titles = titles.len(),
            manual = report.manual_rows,
            authoritative = report.authoritative_rows,
            auto_matched = report.auto_matched_rows,
            suggested = report.suggested_rows,
            unmatched = report.unmatched_rows,
            conflicting = report.conflicting_rows,
            pending = report.pending_rows(),
            "Resolved statement rows"
        );

        Ok(report)
    }
}

/// Same writers at the same splits, in any order
fn same_writers(a: &WorkAssignment, b: &WorkAssignment) -> bool {
    let shares = |w: &WorkAssignment| {
        let mut shares: Vec<_> = w.writers.iter().map(|x| (x.writer_id, x.split_percentage)).collect();
        shares.sort();
        shares
    };
    shares(a) == shares(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlacementCredit;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use uuid::Uuid;

    #[derive(Default)]
    struct MemoryRegistry {
        by_title: HashMap<String, Vec<Placement>>,
    }

    #[async_trait]
    impl PlacementRegistry for MemoryRegistry {
        async fn placements_for_title(&self, work_title: &str) -> EngineResult<Vec<Placement>> {
            Ok(self
                .by_title
                .get(&crate::models::normalize_title(work_title))
                .cloned()
                .unwrap_or_default())
        }
    }

    struct MemoryDirectory(Vec<WriterRecord>);

    #[async_trait]
    impl IdentityDirectory for MemoryDirectory {
        async fn candidates(&self, pro_type: ProType) -> EngineResult<Vec<WriterRecord>> {
            Ok(self
                .0
                .iter()
                .filter(|w| w.pro_affiliation == Some(pro_type))
                .cloned()
                .collect())
        }
    }

    fn placement(title: &str, ipi: Option<&str>, writers: &[(Uuid, rust_decimal::Decimal)]) -> Placement {
        Placement {
            id: Uuid::new_v4(),
            work_title: title.to_string(),
            publisher_ipi: ipi.map(str::to_string),
            dsp_name: None,
            credits: writers
                .iter()
                .map(|(id, split)| PlacementCredit {
                    writer_id: *id,
                    split_percentage: *split,
                    writer_ipi: None,
                })
                .collect(),
        }
    }

    fn bmi_writer(name: &str, ipi: &str) -> WriterRecord {
        WriterRecord {
            writer_ipi: Some(ipi.to_string()),
            pro_affiliation: Some(ProType::Bmi),
            ..WriterRecord::new(name)
        }
    }

    #[test]
    fn test_select_placement_prefers_specific_compatible() {
        let generic = placement("Song A", None, &[(Uuid::new_v4(), dec!(100))]);
        let p2 = placement("Song A", Some("00-P2"), &[(Uuid::new_v4(), dec!(100))]);
        let p3 = placement("Song A", Some("P3"), &[(Uuid::new_v4(), dec!(100))]);
        let all = vec![generic.clone(), p2.clone(), p3];

        let row_p2 = StatementRow::new("Song A", dec!(1)).with_publisher_ipi("P2");
        assert_eq!(select_placement(&all, &row_p2).map(|p| p.id), Some(p2.id));

        let row_plain = StatementRow::new("Song A", dec!(1));
        assert_eq!(select_placement(&all, &row_plain).map(|p| p.id), Some(generic.id));

        let row_other = StatementRow::new("Song A", dec!(1)).with_publisher_ipi("P9");
        assert_eq!(select_placement(&all[1..], &row_other), None);
    }

    #[tokio::test]
    async fn test_rows_resolved_independently() {
        let (w1, w2) = (Uuid::new_v4(), Uuid::new_v4());
        let jane = bmi_writer("Jane Doe", "111");
        let mut registry = MemoryRegistry::default();
        registry.by_title.insert(
            "song a".into(),
            vec![placement("Song A", Some("P1"), &[(w1, dec!(60)), (w2, dec!(40))])],
        );
        let resolver = WriterResolver::new(
            Arc::new(registry),
            Arc::new(MemoryDirectory(vec![jane.clone()])),
            IdentityScorer::default(),
        );

        let metadata = StatementMetadata::new(vec![
            StatementRow::new("Song A", dec!(100)).with_publisher_ipi("P1"),
            StatementRow::new("Song A", dec!(50))
                .with_publisher_ipi("P2")
                .with_writer("Jane Doe", Some("111")),
            StatementRow::new("Song A", dec!(10)).with_publisher_ipi("P3"),
        ]);

        let report = resolver.resolve_statement(&metadata, ProType::Bmi).await.unwrap();
        assert_eq!(report.authoritative_rows, 1);
        assert_eq!(report.auto_matched_rows, 1);
        assert_eq!(report.unmatched_rows, 1);

        let placed = &report.assignments["Song A|P1|"];
        assert_eq!(placed.source, AssignmentSource::Placement);
        assert_eq!(placed.writers.len(), 2);
        assert_eq!(report.assignments["Song A|P2|"].writers[0].writer_id, jane.id);

        assert_eq!(report.review_queue.len(), 1);
        assert_eq!(report.review_queue[0].row_index, 2);
        assert_eq!(report.review_queue[0].status, ReviewStatus::Unmatched);
    }

    #[tokio::test]
    async fn test_manual_assignments_are_not_reresolved() {
        let resolver = WriterResolver::new(
            Arc::new(MemoryRegistry::default()),
            Arc::new(MemoryDirectory(vec![])),
            IdentityScorer::default(),
        );
        let mut metadata = StatementMetadata::new(vec![StatementRow::new("Song", dec!(1))]);
        metadata.assignments.insert(
            "Song".into(),
            WorkAssignment::manual(vec![AssignedWriter {
                writer_id: Uuid::new_v4(),
                split_percentage: dec!(100),
                writer_ipi: None,
            }]),
        );

        let report = resolver.resolve_statement(&metadata, ProType::Ascap).await.unwrap();
        assert_eq!(report.manual_rows, 1);
        assert!(report.assignments.is_empty());
        assert!(report.review_queue.is_empty());
    }

    #[tokio::test]
    async fn test_missing_title_is_input_error() {
        let resolver = WriterResolver::new(
            Arc::new(MemoryRegistry::default()),
            Arc::new(MemoryDirectory(vec![])),
            IdentityScorer::default(),
        );
        let err = resolver
            .resolve(&StatementRow::new(" ", dec!(1)), ProType::Bmi)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_disagreeing_rows_under_one_key_go_to_review() {
        let jane = bmi_writer("Jane Doe", "111");
        let bob = bmi_writer("Bob Roe", "222");
        let resolver = WriterResolver::new(
            Arc::new(MemoryRegistry::default()),
            Arc::new(MemoryDirectory(vec![jane.clone(), bob.clone()])),
            IdentityScorer::default(),
        );

        let mut jane_row = StatementRow::new("Song X", dec!(40)).with_writer("Jane Doe", Some("111"));
        jane_row.metadata.split_percentage = Some(dec!(50));
        let mut bob_row = StatementRow::new("Song X", dec!(40)).with_writer("Bob Roe", Some("222"));
        bob_row.metadata.split_percentage = Some(dec!(50));
        let metadata = StatementMetadata::new(vec![jane_row, bob_row]);

        let report = resolver.resolve_statement(&metadata, ProType::Bmi).await.unwrap();
        assert_eq!(report.auto_matched_rows, 2);
        assert_eq!(report.conflicting_rows, 2);
        assert!(report.assignments.is_empty());
        assert_eq!(report.pending_rows(), 2);

        let queued: Vec<(usize, Uuid)> = report
            .review_queue
            .iter()
            .map(|item| {
                assert_eq!(item.status, ReviewStatus::Conflict);
                assert_eq!(item.work_key, "Song X");
                (item.row_index, item.candidates[0].writer_id)
            })
            .collect();
        assert_eq!(queued, vec![(0, jane.id), (1, bob.id)]);
    }

    #[tokio::test]
    async fn test_agreeing_rows_under_one_key_share_assignment() {
        let jane = bmi_writer("Jane Doe", "111");
        let resolver = WriterResolver::new(
            Arc::new(MemoryRegistry::default()),
            Arc::new(MemoryDirectory(vec![jane.clone()])),
            IdentityScorer::default(),
        );
        let metadata = StatementMetadata::new(vec![
            StatementRow::new("Song Y", dec!(10)).with_writer("Jane Doe", Some("111")),
            StatementRow::new("Song Y", dec!(20)).with_writer("Doe, Jane", Some("00111")),
        ]);

        let report = resolver.resolve_statement(&metadata, ProType::Bmi).await.unwrap();
        assert_eq!(report.conflicting_rows, 0);
        assert!(report.review_queue.is_empty());
        assert_eq!(report.assignments["Song Y"].writers[0].writer_id, jane.id);
    }

    #[tokio::test]
    async fn test_placements_loaded_once_per_title() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingRegistry {
            inner: MemoryRegistry,
            calls: AtomicUsize,
        }

        #[async_trait]
        impl PlacementRegistry for CountingRegistry {
            async fn placements_for_title(&self, work_title: &str) -> EngineResult<Vec<Placement>> {
                self.calls.fetch_add(1, Ordering::Relaxed);
                self.inner.placements_for_title(work_title).await
            }
        }

        let w1 = Uuid::new_v4();
        let mut inner = MemoryRegistry::default();
        inner
            .by_title
            .insert("hit".into(), vec![placement("Hit", None, &[(w1, dec!(100))])]);
        let registry = Arc::new(CountingRegistry {
            inner,
            calls: AtomicUsize::new(0),
        });
        let resolver = WriterResolver::new(
            registry.clone(),
            Arc::new(MemoryDirectory(vec![])),
            IdentityScorer::default(),
        );

        let rows = (0..50)
            .map(|i| StatementRow::new(if i % 2 == 0 { "Hit" } else { " hit " }, dec!(1)))
            .chain(std::iter::once(StatementRow::new("Other", dec!(1))))
            .collect();
        let report = resolver
            .resolve_statement(&StatementMetadata::new(rows), ProType::Bmi)
            .await
            .unwrap();

        assert_eq!(registry.calls.load(Ordering::Relaxed), 2);
        assert_eq!(report.authoritative_rows, 50);
        assert_eq!(report.unmatched_rows, 1);
    }
}
