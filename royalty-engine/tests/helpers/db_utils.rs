//! Database Test Utilities
//!
//! Temp-dir engines and seed data for integration tests

use anyhow::Result;
use royalty_engine::models::{AssignedWriter, PlacementCredit, ProType, Statement, StatementRow, WriterRecord};
use royalty_engine::{RoyaltyEngine, SettlementSettings};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tempfile::TempDir;
use uuid::Uuid;

/// Create an engine over a fresh temporary database
///
/// Returns (TempDir, RoyaltyEngine) - TempDir must be kept alive for duration of test
pub async fn create_test_engine() -> Result<(TempDir, RoyaltyEngine)> {
    create_test_engine_with(SettlementSettings::default()).await
}

pub async fn create_test_engine_with(settings: SettlementSettings) -> Result<(TempDir, RoyaltyEngine)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_royalties.db");
    let engine = RoyaltyEngine::open(&db_path, settings).await?;
    Ok((temp_dir, engine))
}

/// Optional identity fields for a seeded writer
#[derive(Debug, Default, Clone)]
pub struct WriterSeed<'a> {
    pub writer_ipi: Option<&'a str>,
    pub publisher_ipi: Option<&'a str>,
    pub pro: Option<ProType>,
    pub override_rate: Option<Decimal>,
}

/// Register a writer with only a name
pub async fn add_writer(engine: &RoyaltyEngine, name: &str) -> Result<Uuid> {
    add_writer_with(engine, name, WriterSeed::default()).await
}

pub async fn add_writer_with(engine: &RoyaltyEngine, name: &str, seed: WriterSeed<'_>) -> Result<Uuid> {
    let writer = WriterRecord {
        writer_ipi: seed.writer_ipi.map(str::to_string),
        publisher_ipi: seed.publisher_ipi.map(str::to_string),
        pro_affiliation: seed.pro,
        commission_override_rate: seed.override_rate,
        ..WriterRecord::new(name)
    };
    Ok(engine.catalog.register_writer(writer).await?.id)
}

/// Register a placement crediting `(writer, split)` pairs
pub async fn add_placement(
    engine: &RoyaltyEngine,
    title: &str,
    publisher_ipi: Option<&str>,
    credits: &[(Uuid, Decimal)],
) -> Result<Uuid> {
    let credits = credits
        .iter()
        .map(|(writer_id, split)| PlacementCredit {
            writer_id: *writer_id,
            split_percentage: *split,
            writer_ipi: None,
        })
        .collect();
    let placement = engine
        .catalog
        .register_placement(title, publisher_ipi.map(str::to_string), None, credits)
        .await?;
    Ok(placement.id)
}

/// Global commission rate effective immediately
pub async fn set_policy(engine: &RoyaltyEngine, rate: Decimal) -> Result<()> {
    let effective_from = chrono::Utc::now() - chrono::Duration::seconds(1);
    engine.commission.create_policy(rate, Some(effective_from)).await?;
    Ok(())
}

/// Upload rows and store manual assignments by work key
pub async fn upload_and_assign(
    engine: &RoyaltyEngine,
    pro: ProType,
    rows: Vec<StatementRow>,
    assignments: &[(&str, Vec<(Uuid, Decimal)>)],
) -> Result<Statement> {
    let statement = engine.publisher.upload(pro, rows, Some("2024-Q1".to_string())).await?;
    let map: BTreeMap<String, Vec<AssignedWriter>> = assignments
        .iter()
        .map(|(key, writers)| {
            (
                key.to_string(),
                writers
                    .iter()
                    .map(|(writer_id, split)| AssignedWriter {
                        writer_id: *writer_id,
                        split_percentage: *split,
                        writer_ipi: None,
                    })
                    .collect(),
            )
        })
        .collect();
    Ok(engine.publisher.assign(statement.id, map).await?)
}

/// Get all table names in database
pub async fn get_table_names(pool: &SqlitePool) -> Result<Vec<String>> {
    let tables = sqlx::query_scalar::<_, String>(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(tables)
}
