//! Writer and placement registration
//!
//! Feeds the identity directory and the placement registry the Writer
//! Resolver reads from.

use rust_decimal::Decimal;
use sqlx::SqlitePool;
use std::collections::HashSet;
use uuid::Uuid;

use super::commission_resolver::validate_rate;
use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::models::{Placement, PlacementCredit, WriterRecord};

pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or update a writer's identity fields
    pub async fn register_writer(&self, writer: WriterRecord) -> EngineResult<WriterRecord> {
        if writer.name.trim().is_empty() {
            return Err(EngineError::InvalidInput("Writer name is empty".to_string()));
        }
        if let Some(rate) = writer.commission_override_rate {
            validate_rate(rate)?;
        }

        db::writers::upsert_writer(&self.pool, &writer).await?;
        tracing::info!(
            writer_id = %writer.id,
            name = %writer.name,
            pro = ?writer.pro_affiliation.map(|p| p.as_str()),
            "Writer registered"
        );
        Ok(writer)
    }

    pub async fn writer(&self, writer_id: Uuid) -> EngineResult<WriterRecord> {
        db::writers::load_writer(&self.pool, writer_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Writer {}", writer_id)))
    }

    /// Register an authoritative placement
    ///
    /// Credits must name existing writers once each, with splits in
    /// (0, 100] totalling at most 100.
    pub async fn register_placement(
        &self,
        work_title: &str,
        publisher_ipi: Option<String>,
        dsp_name: Option<String>,
        credits: Vec<PlacementCredit>,
    ) -> EngineResult<Placement> {
        if work_title.trim().is_empty() {
            return Err(EngineError::InvalidInput("Placement has no work title".to_string()));
        }
        validate_credits(&credits)?;

        let known: HashSet<Uuid> = db::writers::existing_ids(&self.pool).await?.into_iter().collect();
        if let Some(missing) = credits.iter().find(|c| !known.contains(&c.writer_id)) {
            return Err(EngineError::NotFound(format!("Writer {}", missing.writer_id)));
        }

        let placement = Placement {
            id: Uuid::new_v4(),
            work_title: work_title.trim().to_string(),
            publisher_ipi,
            dsp_name,
            credits,
        };

        let mut tx = self.pool.begin().await?;
        db::placements::insert_placement(&mut tx, &placement).await?;
        tx.commit().await?;

        tracing::info!(
            placement_id = %placement.id,
            work_title = %placement.work_title,
            writers = placement.credits.len(),
            "Placement registered"
        );
        Ok(placement)
    }
}

fn validate_credits(credits: &[PlacementCredit]) -> EngineResult<()> {
    if credits.is_empty() {
        return Err(EngineError::InvalidInput("Placement has no writer credits".to_string()));
    }
    let mut seen = HashSet::new();
    let mut total = Decimal::ZERO;
    for credit in credits {
        if credit.split_percentage <= Decimal::ZERO || credit.split_percentage > Decimal::ONE_HUNDRED {
            return Err(EngineError::InvalidInput(format!(
                "Split {} for writer {} outside (0, 100]",
                credit.split_percentage, credit.writer_id
            )));
        }
        if !seen.insert(credit.writer_id) {
            return Err(EngineError::InvalidInput(format!(
                "Writer {} credited twice",
                credit.writer_id
            )));
        }
        total += credit.split_percentage;
    }
    if total > Decimal::ONE_HUNDRED {
        return Err(EngineError::InvalidInput(format!("Placement splits total {}", total)));
    }
    Ok(())
}
