//! Commission Resolver
//!
//! Loads the commission inputs for one settlement run into a
//! `SettlementContext` snapshot. Every calculation in the run reads from the
//! snapshot, so a policy change mid-run cannot split a statement across two
//! rates.
//!
//! Precedence for a writer's effective rate:
//! 1. an approved, active, unexpired reduction redemption (payment time only;
//!    applied as a refund of commission already withheld)
//! 2. the writer's override rate
//! 3. the most recently effective global policy, or 0 when none exists

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::models::{CommissionRedemption, CommissionSnapshot};

/// Where an effective rate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSource {
    Redemption,
    Override,
    Global,
}

/// Rate plus its provenance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveRate {
    pub rate: Decimal,
    pub source: RateSource,
}

/// Read-only commission inputs for one publish or payment run
#[derive(Debug, Clone, Default)]
pub struct SettlementContext {
    pub global_rate: Decimal,
    pub global_policy_id: Option<Uuid>,
    pub overrides: HashMap<Uuid, Decimal>,
    /// Best (lowest-rate) redeemable reduction per writer
    pub redemptions: HashMap<Uuid, CommissionRedemption>,
    pub taken_at: DateTime<Utc>,
}

impl SettlementContext {
    /// Context with only a global rate (tests, dry runs)
    pub fn with_global_rate(rate: Decimal) -> Self {
        Self {
            global_rate: rate,
            taken_at: Utc::now(),
            ..Default::default()
        }
    }

    pub fn with_override(mut self, writer_id: Uuid, rate: Decimal) -> Self {
        self.overrides.insert(writer_id, rate);
        self
    }

    /// Rate withheld at publish time: override, else global
    pub fn publish_rate(&self, writer_id: Uuid) -> Decimal {
        self.overrides.get(&writer_id).copied().unwrap_or(self.global_rate)
    }

    /// Effective rate after all precedence rules
    pub fn effective_rate(&self, writer_id: Uuid) -> EffectiveRate {
        if let Some(redemption) = self.redemptions.get(&writer_id) {
            return EffectiveRate {
                rate: redemption.reduced_rate,
                source: RateSource::Redemption,
            };
        }
        match self.overrides.get(&writer_id) {
            Some(rate) => EffectiveRate {
                rate: *rate,
                source: RateSource::Override,
            },
            None => EffectiveRate {
                rate: self.global_rate,
                source: RateSource::Global,
            },
        }
    }

    pub fn redemption_for(&self, writer_id: Uuid) -> Option<&CommissionRedemption> {
        self.redemptions.get(&writer_id)
    }

    /// Persistable record of the publish-time inputs
    pub fn snapshot(&self) -> CommissionSnapshot {
        CommissionSnapshot {
            global_rate: self.global_rate,
            global_policy_id: self.global_policy_id,
            overrides: self.overrides.iter().map(|(k, v)| (*k, *v)).collect::<BTreeMap<_, _>>(),
            taken_at: self.taken_at,
        }
    }
}

/// Reject rates outside [0, 100]
pub fn validate_rate(rate: Decimal) -> EngineResult<()> {
    if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
        return Err(EngineError::InvalidInput(format!(
            "Commission rate {} outside [0, 100]",
            rate
        )));
    }
    Ok(())
}

/// Keep the lowest reduced rate per writer
pub fn best_redemptions(
    redemptions: Vec<CommissionRedemption>,
    now: DateTime<Utc>,
) -> HashMap<Uuid, CommissionRedemption> {
    let mut best: HashMap<Uuid, CommissionRedemption> = HashMap::new();
    for redemption in redemptions.into_iter().filter(|r| r.is_redeemable(now)) {
        match best.get(&redemption.writer_id) {
            Some(current) if current.reduced_rate <= redemption.reduced_rate => {}
            _ => {
                best.insert(redemption.writer_id, redemption);
            }
        }
    }
    best
}

/// Load the snapshot for a run starting at `now`
///
/// Three queries regardless of statement size.
pub async fn load_context(conn: &mut SqliteConnection, now: DateTime<Utc>) -> EngineResult<SettlementContext> {
    let policy = db::commission::active_policy(&mut *conn, now).await?;
    let overrides = db::writers::load_overrides(&mut *conn).await?;
    let redemptions = db::commission::load_redeemable(&mut *conn, now).await?;

    let context = SettlementContext {
        global_rate: policy.as_ref().map_or(Decimal::ZERO, |p| p.rate),
        global_policy_id: policy.as_ref().map(|p| p.id),
        overrides,
        redemptions: best_redemptions(redemptions, now),
        taken_at: now,
    };

    tracing::debug!(
        global_rate = %context.global_rate,
        overrides = context.overrides.len(),
        redemptions = context.redemptions.len(),
        "Loaded settlement context"
    );

    Ok(context)
}
