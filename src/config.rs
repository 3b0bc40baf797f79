//! Runtime configuration.
//!
//! Loaded from environment variables (and an optional `.env` file) with defaults that match the
//! marketplace's business rules.

use crate::domain::lifecycle::Policy;
use crate::error::{MarketError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub engine: EngineConfig,
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Share of the order amount recorded as penalty when a deadline is missed.
    pub penalty_rate: Decimal,
    /// Revision cap stamped on new orders.
    pub default_max_revisions: u32,
    /// How many times a transition re-reads the order after losing a write race.
    pub max_conflict_retries: u32,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweeperConfig {
    pub interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            penalty_rate: dec!(0.05),
            default_max_revisions: 3,
            max_conflict_retries: 3,
            currency: "INR".to_string(),
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
        }
    }
}

impl EngineConfig {
    pub fn policy(&self) -> Policy {
        Policy {
            penalty_rate: self.penalty_rate,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let defaults = EngineConfig::default();
        let penalty_rate = load_env("GIGMARKET_PENALTY_RATE", defaults.penalty_rate)?;
        if penalty_rate < Decimal::ZERO || penalty_rate > Decimal::ONE {
            return Err(MarketError::Config(format!(
                "GIGMARKET_PENALTY_RATE must be between 0 and 1, got {penalty_rate}"
            )));
        }

        let engine = EngineConfig {
            penalty_rate,
            default_max_revisions: load_env(
                "GIGMARKET_MAX_REVISIONS",
                defaults.default_max_revisions,
            )?,
            max_conflict_retries: load_env(
                "GIGMARKET_CONFLICT_RETRIES",
                defaults.max_conflict_retries,
            )?,
            currency: env::var("GIGMARKET_CURRENCY").unwrap_or(defaults.currency),
        };

        let interval_secs = load_env(
            "GIGMARKET_SWEEP_INTERVAL_SECS",
            SweeperConfig::default().interval.as_secs(),
        )?;
        if interval_secs == 0 {
            return Err(MarketError::Config(
                "GIGMARKET_SWEEP_INTERVAL_SECS must be positive".to_string(),
            ));
        }

        Ok(Self {
            engine,
            sweeper: SweeperConfig {
                interval: Duration::from_secs(interval_secs),
            },
        })
    }
}

fn load_env<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(val) => val
            .trim()
            .parse()
            .map_err(|_| MarketError::Config(format!("Invalid {key} value: {val}"))),
        Err(_) => Ok(default),
    }
}
