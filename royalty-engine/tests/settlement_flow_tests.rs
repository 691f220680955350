//! Integration tests for upload → resolve → assign → publish
//!
//! Covers the statement lifecycle up to payment against a real SQLite
//! database: settlement math, work-key disambiguation, publish
//! preconditions, republish replacement, and the review queue.

mod helpers;

use helpers::*;
use royalty_common::events::RoyaltyEvent;
use royalty_engine::db;
use royalty_engine::models::{
    AssignedWriter, AssignmentSource, PaymentStatus, ProType, ReviewStatus, StatementRow, StatementStatus,
};
use royalty_engine::{EngineError, PreconditionViolation, SettlementSettings};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use uuid::Uuid;

/// (row, writer, revenue, commission, net) for every stored entry
async fn entry_set(engine: &royalty_engine::RoyaltyEngine, statement_id: Uuid) -> Vec<(usize, Uuid, Decimal, Decimal, Decimal)> {
    let mut entries: Vec<_> = db::ledger_entries::load_for_statement(&engine.db, statement_id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| (e.row_index, e.writer_id, e.revenue, e.commission_amount, e.net_revenue))
        .collect();
    entries.sort();
    entries
}

fn song_a_rows() -> Vec<StatementRow> {
    vec![
        StatementRow::new("Song A", dec!(100.00)),
        StatementRow::new("Song A", dec!(50.00)).with_publisher_ipi("P2"),
    ]
}

// ============================================================================
// Settlement math
// ============================================================================

#[tokio::test]
async fn test_duplicate_title_statement_settles_per_writer() {
    let (_tmp, engine) = create_test_engine().await.unwrap();
    set_policy(&engine, dec!(10)).await.unwrap();
    let w1 = add_writer(&engine, "Writer One").await.unwrap();
    let w2 = add_writer(&engine, "Writer Two").await.unwrap();

    let statement = upload_and_assign(
        &engine,
        ProType::Bmi,
        song_a_rows(),
        &[
            ("Song A||", vec![(w1, dec!(60)), (w2, dec!(40))]),
            ("Song A|P2|", vec![(w1, dec!(100))]),
        ],
    )
    .await
    .unwrap();
    assert_eq!(statement.status, StatementStatus::Processed);
    assert_eq!(statement.total_revenue, dec!(150.00));

    let outcome = engine.publisher.publish(statement.id).await.unwrap();
    assert_eq!(outcome.entry_count, 3);
    assert_eq!(outcome.total_commission, dec!(15.00));
    assert_eq!(outcome.total_net, dec!(135.00));

    let w1_totals = outcome.writer_totals.iter().find(|t| t.writer_id == w1).unwrap();
    let w2_totals = outcome.writer_totals.iter().find(|t| t.writer_id == w2).unwrap();
    assert_eq!(w1_totals.net, dec!(99.00));
    assert_eq!(w1_totals.commission, dec!(11.00));
    assert_eq!(w2_totals.net, dec!(36.00));
    assert_eq!(w2_totals.commission, dec!(4.00));

    let summary = engine.publisher.summary(statement.id).await.unwrap();
    assert_eq!(summary.status, StatementStatus::Published);
    assert_eq!(summary.payment_status, PaymentStatus::Unpaid);
    assert_eq!(summary.ledger_entries, 3);
    assert_eq!(summary.total_net, dec!(135.00));
    assert_eq!(summary.unassigned_rows, 0);
}

#[tokio::test]
async fn test_entries_conserve_revenue_and_commission() {
    let (_tmp, engine) = create_test_engine().await.unwrap();
    set_policy(&engine, dec!(12.5)).await.unwrap();
    let w1 = add_writer(&engine, "Writer One").await.unwrap();
    let w2 = add_writer(&engine, "Writer Two").await.unwrap();
    let w3 = add_writer(&engine, "Writer Three").await.unwrap();

    let rows = vec![
        StatementRow::new("Alpha", dec!(33.33)),
        StatementRow::new("Beta", dec!(0.07)),
        StatementRow::new("Gamma", dec!(1234.5678)),
    ];
    let statement = upload_and_assign(
        &engine,
        ProType::Ascap,
        rows,
        &[
            ("Alpha", vec![(w1, dec!(33.3333)), (w2, dec!(33.3333)), (w3, dec!(33.3334))]),
            ("Beta", vec![(w2, dec!(100))]),
            ("Gamma", vec![(w1, dec!(50)), (w3, dec!(50))]),
        ],
    )
    .await
    .unwrap();
    engine.publisher.publish(statement.id).await.unwrap();

    let entries = db::ledger_entries::load_for_statement(&engine.db, statement.id).await.unwrap();
    assert_eq!(entries.len(), 6);

    let revenue: Decimal = entries.iter().map(|e| e.revenue).sum();
    let commission: Decimal = entries.iter().map(|e| e.commission_amount).sum();
    let net: Decimal = entries.iter().map(|e| e.net_revenue).sum();
    assert_eq!(revenue, dec!(33.33) + dec!(0.07) + dec!(1234.5678));
    assert_eq!(net + commission, revenue);
    for entry in &entries {
        assert_eq!(entry.net_revenue, entry.revenue - entry.commission_amount);
        assert_eq!(entry.commission_rate, dec!(12.5));
    }
}

#[tokio::test]
async fn test_writer_override_applies_to_that_writer_only() {
    let (_tmp, engine) = create_test_engine().await.unwrap();
    set_policy(&engine, dec!(10)).await.unwrap();
    let w1 = add_writer(&engine, "Writer One").await.unwrap();
    let w2 = add_writer_with(
        &engine,
        "Writer Two",
        WriterSeed {
            override_rate: Some(dec!(5)),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let statement = upload_and_assign(
        &engine,
        ProType::Bmi,
        vec![StatementRow::new("Song", dec!(200))],
        &[("Song", vec![(w1, dec!(50)), (w2, dec!(50))])],
    )
    .await
    .unwrap();
    let outcome = engine.publisher.publish(statement.id).await.unwrap();

    let net_of = |id: Uuid| outcome.writer_totals.iter().find(|t| t.writer_id == id).unwrap().net;
    assert_eq!(net_of(w1), dec!(90.00));
    assert_eq!(net_of(w2), dec!(95.00));
    assert_eq!(outcome.total_commission, dec!(15.00));
}

#[tokio::test]
async fn test_micro_totals_keep_four_places() {
    let (_tmp, engine) = create_test_engine().await.unwrap();
    let w1 = add_writer(&engine, "Writer One").await.unwrap();

    let statement = upload_and_assign(
        &engine,
        ProType::Mlc,
        vec![StatementRow::new("Stream", dec!(0.0042))],
        &[("Stream", vec![(w1, dec!(100))])],
    )
    .await
    .unwrap();
    let outcome = engine.publisher.publish(statement.id).await.unwrap();

    // No policy on file: commission rate 0
    assert_eq!(outcome.total_commission, Decimal::ZERO);
    assert_eq!(outcome.total_net, dec!(0.0042));
    assert_eq!(outcome.writer_totals[0].net.to_string(), "0.0042");
}

// ============================================================================
// Publish preconditions and republish
// ============================================================================

#[tokio::test]
async fn test_publish_blocked_by_unassigned_rows() {
    let (_tmp, engine) = create_test_engine().await.unwrap();
    let w1 = add_writer(&engine, "Writer One").await.unwrap();

    let statement = upload_and_assign(
        &engine,
        ProType::Bmi,
        vec![StatementRow::new("Song A", dec!(10)), StatementRow::new("Song B", dec!(20))],
        &[("Song A", vec![(w1, dec!(100))])],
    )
    .await
    .unwrap();

    match engine.publisher.publish(statement.id).await {
        Err(EngineError::UnassignedRows { count, sample }) => {
            assert_eq!(count, 1);
            assert_eq!(sample, vec!["row 1: Song B".to_string()]);
        }
        other => panic!("expected UnassignedRows, got {:?}", other.map(|o| o.entry_count)),
    }

    let summary = engine.publisher.summary(statement.id).await.unwrap();
    assert_eq!(summary.status, StatementStatus::Processed);
    assert_eq!(summary.ledger_entries, 0);
}

#[tokio::test]
async fn test_unassigned_sample_is_bounded() {
    let settings = SettlementSettings {
        unassigned_sample_size: 2,
        ..Default::default()
    };
    let (_tmp, engine) = create_test_engine_with(settings).await.unwrap();
    let w1 = add_writer(&engine, "Writer One").await.unwrap();

    let mut rows: Vec<StatementRow> = (0..6).map(|i| StatementRow::new(format!("Song {}", i), dec!(1))).collect();
    rows.push(StatementRow::new("Assigned", dec!(1)));
    let statement = upload_and_assign(&engine, ProType::Bmi, rows, &[("Assigned", vec![(w1, dec!(100))])])
        .await
        .unwrap();

    match engine.publisher.publish(statement.id).await {
        Err(EngineError::UnassignedRows { count, sample }) => {
            assert_eq!(count, 6);
            assert_eq!(sample.len(), 2);
        }
        other => panic!("expected UnassignedRows, got {:?}", other.map(|o| o.entry_count)),
    }
}

#[tokio::test]
async fn test_publish_requires_assignments() {
    let (_tmp, engine) = create_test_engine().await.unwrap();
    let statement = engine
        .publisher
        .upload(ProType::Bmi, vec![StatementRow::new("Song", dec!(1))], None)
        .await
        .unwrap();

    assert!(matches!(
        engine.publisher.publish(statement.id).await,
        Err(EngineError::Precondition(PreconditionViolation::NoAssignments { .. }))
    ));
    assert!(matches!(
        engine.publisher.republish(statement.id).await,
        Err(EngineError::Precondition(PreconditionViolation::WrongStatus { .. }))
    ));
    assert!(matches!(
        engine.publisher.publish(Uuid::new_v4()).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_republish_replaces_entries_without_duplicates() {
    let (_tmp, engine) = create_test_engine().await.unwrap();
    set_policy(&engine, dec!(10)).await.unwrap();
    let w1 = add_writer(&engine, "Writer One").await.unwrap();
    let w2 = add_writer(&engine, "Writer Two").await.unwrap();

    let statement = upload_and_assign(
        &engine,
        ProType::Bmi,
        song_a_rows(),
        &[
            ("Song A||", vec![(w1, dec!(60)), (w2, dec!(40))]),
            ("Song A|P2|", vec![(w1, dec!(100))]),
        ],
    )
    .await
    .unwrap();

    let first = engine.publisher.publish(statement.id).await.unwrap();
    let first_entries = entry_set(&engine, statement.id).await;
    let mut expected = vec![
        (0, w1, dec!(60), dec!(6), dec!(54)),
        (0, w2, dec!(40), dec!(4), dec!(36)),
        (1, w1, dec!(50), dec!(5), dec!(45)),
    ];
    expected.sort();
    assert_eq!(first_entries, expected);

    let again = engine.publisher.publish(statement.id).await.unwrap();
    assert_eq!(again.entry_count, first.entry_count);
    assert_eq!(again.replaced_entries, 3);
    assert_eq!(again.total_net, first.total_net);
    assert_eq!(entry_set(&engine, statement.id).await, first_entries);

    // New override takes effect on republish
    engine.commission.set_writer_override(w2, Some(dec!(0))).await.unwrap();
    let republished = engine.publisher.republish(statement.id).await.unwrap();
    assert!(republished.republished);
    assert_eq!(republished.entry_count, 3);
    assert_eq!(republished.total_commission, dec!(11.00));
    assert_eq!(republished.total_net, dec!(139.00));
    let mut expected = vec![
        (0, w1, dec!(60), dec!(6), dec!(54)),
        (0, w2, dec!(40), dec!(0), dec!(40)),
        (1, w1, dec!(50), dec!(5), dec!(45)),
    ];
    expected.sort();
    assert_eq!(entry_set(&engine, statement.id).await, expected);

    let stored = engine.publisher.statement(statement.id).await.unwrap();
    let snapshot = stored.metadata.commission_snapshot.unwrap();
    assert_eq!(snapshot.global_rate, dec!(10));
    assert_eq!(snapshot.overrides.get(&w2), Some(&dec!(0)));
}

#[tokio::test]
async fn test_failed_batch_insert_leaves_statement_untouched() {
    let settings = SettlementSettings {
        batch_size: 2,
        ..Default::default()
    };
    let (_tmp, engine) = create_test_engine_with(settings).await.unwrap();
    set_policy(&engine, dec!(10)).await.unwrap();
    let w1 = add_writer(&engine, "Writer One").await.unwrap();
    let w2 = add_writer(&engine, "Writer Two").await.unwrap();
    let song_a = [
        ("Song A||", vec![(w1, dec!(60)), (w2, dec!(40))]),
        ("Song A|P2|", vec![(w1, dec!(100))]),
    ];

    let published = upload_and_assign(&engine, ProType::Bmi, song_a_rows(), &song_a).await.unwrap();
    engine.publisher.publish(published.id).await.unwrap();
    let before = engine.publisher.statement(published.id).await.unwrap();
    let entries_before = entry_set(&engine, published.id).await;

    // Row 0 fills the first batch; row 1's entry in the second batch is rejected
    sqlx::query(
        r#"
        CREATE TRIGGER reject_second_row BEFORE INSERT ON statement_items
        WHEN NEW.row_index = 1
        BEGIN
            SELECT RAISE(ABORT, 'insert rejected');
        END
        "#,
    )
    .execute(&engine.db)
    .await
    .unwrap();

    engine.commission.set_writer_override(w2, Some(dec!(0))).await.unwrap();
    assert!(engine.publisher.republish(published.id).await.is_err());

    let after = engine.publisher.statement(published.id).await.unwrap();
    assert_eq!(after.status, StatementStatus::Published);
    assert_eq!(after.payment_status, PaymentStatus::Unpaid);
    assert_eq!(after.total_commission, before.total_commission);
    assert_eq!(after.total_net, before.total_net);
    assert_eq!(after.published_at, before.published_at);
    assert!(!after.metadata.commission_snapshot.unwrap().overrides.contains_key(&w2));
    assert_eq!(entry_set(&engine, published.id).await, entries_before);

    // A first publish that fails stays PROCESSED with no entries
    let fresh = upload_and_assign(&engine, ProType::Bmi, song_a_rows(), &song_a).await.unwrap();
    assert!(engine.publisher.publish(fresh.id).await.is_err());

    let fresh = engine.publisher.statement(fresh.id).await.unwrap();
    assert_eq!(fresh.status, StatementStatus::Processed);
    assert_eq!(fresh.total_net, Decimal::ZERO);
    assert!(fresh.published_at.is_none());
    assert_eq!(
        db::ledger_entries::count_for_statement(&engine.db, fresh.id).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_publish_inserts_in_batches_and_emits_event() {
    let settings = SettlementSettings {
        batch_size: 2,
        ..Default::default()
    };
    let (_tmp, engine) = create_test_engine_with(settings).await.unwrap();
    let w1 = add_writer(&engine, "Writer One").await.unwrap();
    let mut rx = engine.event_bus.subscribe();

    let rows: Vec<StatementRow> = (0..5).map(|i| StatementRow::new(format!("Song {}", i), dec!(2))).collect();
    let assignments: Vec<(String, Vec<(Uuid, Decimal)>)> =
        (0..5).map(|i| (format!("Song {}", i), vec![(w1, dec!(100))])).collect();
    let assignments: Vec<(&str, Vec<(Uuid, Decimal)>)> =
        assignments.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
    let statement = upload_and_assign(&engine, ProType::Bmi, rows, &assignments).await.unwrap();

    let outcome = engine.publisher.publish(statement.id).await.unwrap();
    assert_eq!(outcome.entry_count, 5);
    assert_eq!(outcome.batches, 3);

    match rx.recv().await.unwrap() {
        RoyaltyEvent::StatementPublished {
            statement_id,
            entry_count,
            republished,
            ..
        } => {
            assert_eq!(statement_id, statement.id);
            assert_eq!(entry_count, 5);
            assert!(!republished);
        }
        other => panic!("unexpected event {:?}", other.event_type()),
    }
}

// ============================================================================
// Upload and assignment validation
// ============================================================================

#[tokio::test]
async fn test_upload_rejects_bad_rows() {
    let (_tmp, engine) = create_test_engine().await.unwrap();

    assert!(matches!(
        engine.publisher.upload(ProType::Bmi, Vec::new(), None).await,
        Err(EngineError::InvalidInput(_))
    ));
    assert!(matches!(
        engine
            .publisher
            .upload(ProType::Bmi, vec![StatementRow::new("  ", dec!(1))], None)
            .await,
        Err(EngineError::InvalidInput(_))
    ));
    assert!(engine.publisher.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_assign_validates_keys_writers_and_splits() {
    let (_tmp, engine) = create_test_engine().await.unwrap();
    let w1 = add_writer(&engine, "Writer One").await.unwrap();
    let statement = engine
        .publisher
        .upload(ProType::Bmi, vec![StatementRow::new("Song", dec!(1))], None)
        .await
        .unwrap();

    let assign = |key: &str, writer_id: Uuid, split: Decimal| {
        let mut map = BTreeMap::new();
        map.insert(
            key.to_string(),
            vec![AssignedWriter {
                writer_id,
                split_percentage: split,
                writer_ipi: None,
            }],
        );
        map
    };

    assert!(matches!(
        engine.publisher.assign(statement.id, assign("Other", w1, dec!(100))).await,
        Err(EngineError::InvalidInput(_))
    ));
    assert!(matches!(
        engine.publisher.assign(statement.id, assign("Song", Uuid::new_v4(), dec!(100))).await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        engine.publisher.assign(statement.id, assign("Song", w1, dec!(0))).await,
        Err(EngineError::InvalidInput(_))
    ));
    assert!(matches!(
        engine.publisher.assign(statement.id, assign("Song", w1, dec!(100.01))).await,
        Err(EngineError::InvalidInput(_))
    ));

    let stored = engine.publisher.assign(statement.id, assign("Song", w1, dec!(100))).await.unwrap();
    assert_eq!(stored.status, StatementStatus::Processed);
    assert_eq!(stored.metadata.assignments["Song"].source, AssignmentSource::Manual);
}

// ============================================================================
// Resolution and review queue
// ============================================================================

#[tokio::test]
async fn test_resolve_uses_placements_then_fuzzy_identity() {
    let (_tmp, engine) = create_test_engine().await.unwrap();
    let jane = add_writer_with(
        &engine,
        "Jane Doe",
        WriterSeed {
            writer_ipi: Some("00123456789"),
            pro: Some(ProType::Bmi),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let placed = add_writer(&engine, "Placed Writer").await.unwrap();
    add_placement(&engine, "Placed Song", None, &[(placed, dec!(100))]).await.unwrap();

    let rows = vec![
        StatementRow::new("Placed Song", dec!(10)),
        StatementRow::new("Fuzzy Song", dec!(20)).with_writer("Doe, Jane", Some("123-456-789")),
        StatementRow::new("Mystery", dec!(5)),
    ];
    let statement = engine.publisher.upload(ProType::Bmi, rows, None).await.unwrap();

    let report = engine.publisher.resolve(statement.id).await.unwrap();
    assert_eq!(report.total_rows, 3);
    assert_eq!(report.authoritative_rows, 1);
    assert_eq!(report.auto_matched_rows, 1);
    assert_eq!(report.unmatched_rows, 1);
    assert_eq!(report.pending_rows(), 1);

    let stored = engine.publisher.statement(statement.id).await.unwrap();
    assert_eq!(stored.status, StatementStatus::Processed);
    let placed_assignment = &stored.metadata.assignments["Placed Song"];
    assert_eq!(placed_assignment.source, AssignmentSource::Placement);
    assert_eq!(placed_assignment.writers[0].writer_id, placed);
    let fuzzy_assignment = &stored.metadata.assignments["Fuzzy Song"];
    assert_eq!(fuzzy_assignment.source, AssignmentSource::Fuzzy);
    assert_eq!(fuzzy_assignment.confidence, Some(100));
    assert_eq!(fuzzy_assignment.writers[0].writer_id, jane);

    let queue = engine.publisher.review_queue(statement.id).await.unwrap();
    assert_eq!(queue.unmatched, 1);
    assert_eq!(queue.items[0].work_key, "Mystery");
    assert_eq!(queue.items[0].status, ReviewStatus::Unmatched);

    let mut manual = BTreeMap::new();
    manual.insert(
        "Mystery".to_string(),
        vec![AssignedWriter {
            writer_id: jane,
            split_percentage: dec!(100),
            writer_ipi: None,
        }],
    );
    engine.publisher.assign(statement.id, manual).await.unwrap();
    assert!(engine.publisher.review_queue(statement.id).await.unwrap().items.is_empty());

    let outcome = engine.publisher.publish(statement.id).await.unwrap();
    assert_eq!(outcome.entry_count, 3);
}

#[tokio::test]
async fn test_per_writer_rows_on_one_title_need_review() {
    let (_tmp, engine) = create_test_engine().await.unwrap();
    let jane = add_writer_with(
        &engine,
        "Jane Doe",
        WriterSeed {
            writer_ipi: Some("111"),
            pro: Some(ProType::Bmi),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let bob = add_writer_with(
        &engine,
        "Bob Roe",
        WriterSeed {
            writer_ipi: Some("222"),
            pro: Some(ProType::Bmi),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let mut jane_row = StatementRow::new("Song X", dec!(30)).with_writer("Jane Doe", Some("111"));
    jane_row.metadata.split_percentage = Some(dec!(50));
    let mut bob_row = StatementRow::new("Song X", dec!(30)).with_writer("Bob Roe", Some("222"));
    bob_row.metadata.split_percentage = Some(dec!(50));
    let statement = engine
        .publisher
        .upload(ProType::Bmi, vec![jane_row, bob_row], None)
        .await
        .unwrap();

    let report = engine.publisher.resolve(statement.id).await.unwrap();
    assert_eq!(report.conflicting_rows, 2);
    assert_eq!(report.pending_rows(), 2);

    let stored = engine.publisher.statement(statement.id).await.unwrap();
    assert_eq!(stored.status, StatementStatus::Uploaded);
    assert!(stored.metadata.assignments.is_empty());

    let queue = engine.publisher.review_queue(statement.id).await.unwrap();
    assert_eq!(queue.conflicting, 2);
    let proposed: Vec<Uuid> = queue.items.iter().map(|i| i.candidates[0].writer_id).collect();
    assert_eq!(proposed, vec![jane, bob]);

    assert!(matches!(
        engine.publisher.publish(statement.id).await,
        Err(EngineError::Precondition(PreconditionViolation::NoAssignments { .. }))
    ));

    // Operator settles the work for both writers
    let mut manual = BTreeMap::new();
    manual.insert(
        "Song X".to_string(),
        vec![
            AssignedWriter {
                writer_id: jane,
                split_percentage: dec!(50),
                writer_ipi: None,
            },
            AssignedWriter {
                writer_id: bob,
                split_percentage: dec!(50),
                writer_ipi: None,
            },
        ],
    );
    engine.publisher.assign(statement.id, manual).await.unwrap();
    assert!(engine.publisher.review_queue(statement.id).await.unwrap().items.is_empty());

    let outcome = engine.publisher.publish(statement.id).await.unwrap();
    let net_of = |w: Uuid| outcome.writer_totals.iter().find(|t| t.writer_id == w).map(|t| t.net);
    assert_eq!(net_of(jane), Some(dec!(30.00)));
    assert_eq!(net_of(bob), Some(dec!(30.00)));
}

#[tokio::test]
async fn test_fuzzy_match_respects_pro_affiliation() {
    let (_tmp, engine) = create_test_engine().await.unwrap();
    add_writer_with(
        &engine,
        "Jane Doe",
        WriterSeed {
            writer_ipi: Some("123456789"),
            pro: Some(ProType::Bmi),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let row = StatementRow::new("Fuzzy Song", dec!(20)).with_writer("Jane Doe", Some("123456789"));
    let statement = engine.publisher.upload(ProType::Ascap, vec![row], None).await.unwrap();

    let report = engine.publisher.resolve(statement.id).await.unwrap();
    assert_eq!(report.auto_matched_rows, 0);
    assert_eq!(report.unmatched_rows, 1);

    let stored = engine.publisher.statement(statement.id).await.unwrap();
    assert_eq!(stored.status, StatementStatus::Uploaded);
    assert!(stored.metadata.assignments.is_empty());
}

#[tokio::test]
async fn test_resolve_keeps_manual_assignments() {
    let (_tmp, engine) = create_test_engine().await.unwrap();
    add_writer_with(
        &engine,
        "Jane Doe",
        WriterSeed {
            writer_ipi: Some("123456789"),
            pro: Some(ProType::Bmi),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let operator_choice = add_writer(&engine, "Someone Else").await.unwrap();

    let row = StatementRow::new("Fuzzy Song", dec!(20)).with_writer("Jane Doe", Some("123456789"));
    let statement = upload_and_assign(
        &engine,
        ProType::Bmi,
        vec![row],
        &[("Fuzzy Song", vec![(operator_choice, dec!(100))])],
    )
    .await
    .unwrap();

    let report = engine.publisher.resolve(statement.id).await.unwrap();
    assert_eq!(report.manual_rows, 1);
    assert_eq!(report.auto_matched_rows, 0);

    let stored = engine.publisher.statement(statement.id).await.unwrap();
    let assignment = &stored.metadata.assignments["Fuzzy Song"];
    assert_eq!(assignment.source, AssignmentSource::Manual);
    assert_eq!(assignment.writers[0].writer_id, operator_choice);
}

// ============================================================================
// Queue and delete
// ============================================================================

#[tokio::test]
async fn test_queue_for_payment_makes_entries_visible() {
    let (_tmp, engine) = create_test_engine().await.unwrap();
    let w1 = add_writer(&engine, "Writer One").await.unwrap();
    let statement = upload_and_assign(
        &engine,
        ProType::Bmi,
        vec![StatementRow::new("Song", dec!(10))],
        &[("Song", vec![(w1, dec!(100))])],
    )
    .await
    .unwrap();

    assert!(matches!(
        engine.publisher.queue_for_payment(statement.id).await,
        Err(EngineError::Precondition(PreconditionViolation::WrongStatus { .. }))
    ));

    engine.publisher.publish(statement.id).await.unwrap();
    assert_eq!(engine.publisher.queue_for_payment(statement.id).await.unwrap(), 1);

    let entries = db::ledger_entries::load_for_statement(&engine.db, statement.id).await.unwrap();
    assert!(entries.iter().all(|e| e.is_visible_to_writer && e.paid_at.is_none()));
    let summary = engine.publisher.summary(statement.id).await.unwrap();
    assert_eq!(summary.payment_status, PaymentStatus::Unpaid);
}

#[tokio::test]
async fn test_delete_unpaid_statement_removes_entries() {
    let (_tmp, engine) = create_test_engine().await.unwrap();
    let w1 = add_writer(&engine, "Writer One").await.unwrap();
    let statement = upload_and_assign(
        &engine,
        ProType::Bmi,
        vec![StatementRow::new("Song", dec!(10))],
        &[("Song", vec![(w1, dec!(100))])],
    )
    .await
    .unwrap();
    engine.publisher.publish(statement.id).await.unwrap();

    engine.publisher.delete(statement.id).await.unwrap();

    assert!(matches!(
        engine.publisher.statement(statement.id).await,
        Err(EngineError::NotFound(_))
    ));
    assert_eq!(
        db::ledger_entries::count_for_statement(&engine.db, statement.id).await.unwrap(),
        0
    );
}
