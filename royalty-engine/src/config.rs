//! Settlement settings for royalty-engine
//!
//! Resolved once at startup with priority ENV → TOML `[settlement]` →
//! compiled default, then validated. The CLI layers its own flags on top
//! before calling `validate`.

use royalty_common::config::TomlConfig;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};

pub const BATCH_SIZE_ENV: &str = "ROYALTY_BATCH_SIZE";
pub const TX_TIMEOUT_ENV: &str = "ROYALTY_TX_TIMEOUT_SECS";
pub const PUBLISHER_IPIS_ENV: &str = "ROYALTY_PUBLISHER_IPIS";

pub const DEFAULT_BATCH_SIZE: usize = 250;
pub const MAX_BATCH_SIZE: usize = 1000;
pub const DEFAULT_TX_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_SIDE_EFFECT_CONCURRENCY: usize = 10;
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;
pub const DEFAULT_UNASSIGNED_SAMPLE: usize = 10;

/// Validated settlement tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementSettings {
    /// Ledger entries per insert batch (1..=1000)
    pub batch_size: usize,
    /// Upper bound for one publish or payment run
    pub transaction_timeout: Duration,
    /// Concurrent post-commit side effects (1..=10)
    pub side_effect_concurrency: usize,
    /// Time spent retrying on "database is locked"
    pub max_lock_wait_ms: u64,
    /// Publisher IPIs the platform represents (raw; normalized by the scorer)
    pub platform_publisher_ipis: Vec<String>,
    /// Unassigned rows echoed back when publish is blocked
    pub unassigned_sample_size: usize,
}

impl Default for SettlementSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            transaction_timeout: Duration::from_secs(DEFAULT_TX_TIMEOUT_SECS),
            side_effect_concurrency: DEFAULT_SIDE_EFFECT_CONCURRENCY,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
            platform_publisher_ipis: Vec::new(),
            unassigned_sample_size: DEFAULT_UNASSIGNED_SAMPLE,
        }
    }
}

impl SettlementSettings {
    /// Resolve from environment and TOML, then validate
    pub fn resolve(toml_config: &TomlConfig) -> EngineResult<Self> {
        Self::resolve_with(toml_config, |key| std::env::var(key).ok())
    }

    /// Resolution with an injectable environment lookup
    pub fn resolve_with<F>(toml_config: &TomlConfig, env: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let toml = &toml_config.settlement;
        let defaults = Self::default();

        let batch_size = match env(BATCH_SIZE_ENV) {
            Some(raw) => parse_env(BATCH_SIZE_ENV, &raw)?,
            None => toml.batch_size.unwrap_or(defaults.batch_size),
        };

        let timeout_secs = match env(TX_TIMEOUT_ENV) {
            Some(raw) => parse_env(TX_TIMEOUT_ENV, &raw)?,
            None => toml
                .transaction_timeout_secs
                .unwrap_or(DEFAULT_TX_TIMEOUT_SECS),
        };

        let platform_publisher_ipis = match env(PUBLISHER_IPIS_ENV) {
            Some(raw) => {
                if !toml.platform_publisher_ipis.is_empty() {
                    warn!(
                        "Publisher IPIs set in both {} and TOML; using environment",
                        PUBLISHER_IPIS_ENV
                    );
                }
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            None => toml.platform_publisher_ipis.clone(),
        };

        let settings = Self {
            batch_size,
            transaction_timeout: Duration::from_secs(timeout_secs),
            side_effect_concurrency: toml
                .side_effect_concurrency
                .unwrap_or(defaults.side_effect_concurrency),
            max_lock_wait_ms: toml.max_lock_wait_ms.unwrap_or(defaults.max_lock_wait_ms),
            platform_publisher_ipis,
            unassigned_sample_size: toml
                .unassigned_sample_size
                .unwrap_or(defaults.unassigned_sample_size),
        };

        settings.validate()?;

        info!(
            batch_size = settings.batch_size,
            timeout_secs = settings.transaction_timeout.as_secs(),
            concurrency = settings.side_effect_concurrency,
            publisher_ipis = settings.platform_publisher_ipis.len(),
            "Settlement settings resolved"
        );

        Ok(settings)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(config_error(format!(
                "batch_size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }
        if self.transaction_timeout.is_zero() {
            return Err(config_error("transaction timeout must be greater than zero".to_string()));
        }
        if !(1..=DEFAULT_SIDE_EFFECT_CONCURRENCY).contains(&self.side_effect_concurrency) {
            return Err(config_error(format!(
                "side_effect_concurrency must be between 1 and {}, got {}",
                DEFAULT_SIDE_EFFECT_CONCURRENCY, self.side_effect_concurrency
            )));
        }
        if self.unassigned_sample_size == 0 {
            return Err(config_error("unassigned_sample_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> EngineResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| config_error(format!("{} has invalid value {:?}", key, raw)))
}

fn config_error(message: String) -> EngineError {
    EngineError::Common(royalty_common::Error::Config(message))
}
