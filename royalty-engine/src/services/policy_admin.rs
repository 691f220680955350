//! Commission administration: global policies, writer overrides, and
//! reduction redemptions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::commission_resolver::validate_rate;
use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::models::{CommissionPolicy, CommissionRedemption, RedemptionStatus};

pub struct PolicyAdmin {
    pool: SqlitePool,
}

impl PolicyAdmin {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a global rate effective from `effective_from` (default now)
    ///
    /// Policies are append-only; the latest one already in effect wins.
    pub async fn create_policy(
        &self,
        rate: Decimal,
        effective_from: Option<DateTime<Utc>>,
    ) -> EngineResult<CommissionPolicy> {
        validate_rate(rate)?;
        let now = Utc::now();
        let policy = CommissionPolicy {
            id: Uuid::new_v4(),
            rate,
            effective_from: effective_from.unwrap_or(now),
            created_at: now,
        };
        db::commission::insert_policy(&self.pool, &policy).await?;

        tracing::info!(
            policy_id = %policy.id,
            rate = %policy.rate,
            effective_from = %policy.effective_from,
            "Commission policy created"
        );
        Ok(policy)
    }

    pub async fn active_policy(&self) -> EngineResult<Option<CommissionPolicy>> {
        db::commission::active_policy(&self.pool, Utc::now()).await
    }

    /// Set (or clear with `None`) a writer's override rate
    ///
    /// Applies to the next publish; already-published entries keep the rate
    /// they were built with until the statement is republished.
    pub async fn set_writer_override(&self, writer_id: Uuid, rate: Option<Decimal>) -> EngineResult<()> {
        if let Some(rate) = rate {
            validate_rate(rate)?;
        }
        if !db::writers::set_commission_override(&self.pool, writer_id, rate).await? {
            return Err(EngineError::NotFound(format!("Writer {}", writer_id)));
        }

        tracing::info!(
            writer_id = %writer_id,
            rate = ?rate.map(|r| r.to_string()),
            "Commission override updated"
        );
        Ok(())
    }

    /// Request a reduction; starts PENDING until decided
    pub async fn request_redemption(
        &self,
        writer_id: Uuid,
        reduced_rate: Decimal,
        expires_at: DateTime<Utc>,
    ) -> EngineResult<CommissionRedemption> {
        validate_rate(reduced_rate)?;
        let now = Utc::now();
        if expires_at <= now {
            return Err(EngineError::InvalidInput(format!(
                "Redemption expiry {} is not in the future",
                expires_at
            )));
        }
        if db::writers::load_writer(&self.pool, writer_id).await?.is_none() {
            return Err(EngineError::NotFound(format!("Writer {}", writer_id)));
        }

        let redemption = CommissionRedemption {
            id: Uuid::new_v4(),
            writer_id,
            reduced_rate,
            status: RedemptionStatus::Pending,
            is_active: true,
            expires_at,
            consumed_statement_id: None,
            created_at: now,
        };
        db::commission::insert_redemption(&self.pool, &redemption).await?;

        tracing::info!(
            redemption_id = %redemption.id,
            writer_id = %writer_id,
            reduced_rate = %reduced_rate,
            "Commission redemption requested"
        );
        Ok(redemption)
    }

    /// Approve or reject a pending redemption
    pub async fn decide_redemption(&self, redemption_id: Uuid, approve: bool) -> EngineResult<CommissionRedemption> {
        let status = if approve {
            RedemptionStatus::Approved
        } else {
            RedemptionStatus::Rejected
        };

        if !db::commission::set_redemption_status(&self.pool, redemption_id, status).await? {
            return match db::commission::load_redemption(&self.pool, redemption_id).await? {
                None => Err(EngineError::NotFound(format!("Redemption {}", redemption_id))),
                Some(existing) => Err(EngineError::InvalidInput(format!(
                    "Redemption {} already {}",
                    redemption_id, existing.status
                ))),
            };
        }

        tracing::info!(redemption_id = %redemption_id, status = %status, "Commission redemption decided");

        db::commission::load_redemption(&self.pool, redemption_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Redemption {}", redemption_id)))
    }
}
