//! Runtime configuration.

use std::path::Path;
use std::time::Duration;

use session_meter_core::{EngineOptions, MultiplierBasis, PricingCatalog, DEFAULT_FREE_WARNING_SECONDS};

use crate::error::{Result, RuntimeError};

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterConfig {
    /// Directory for the file store (default: "./data/session-meter").
    pub data_dir: String,

    /// JSON pricing catalog. `None` uses the built-in table.
    pub pricing_file: Option<String>,

    /// Milliseconds between ticks (default: 1000).
    pub tick_interval_ms: u64,

    /// Seconds an ended session stays visible before it is cleared (default: 3).
    pub ended_grace_seconds: u64,

    /// Participant count driving the multiplier (default: current).
    pub multiplier_basis: MultiplierBasis,

    /// Seconds before the free-tier cap at which to warn (default: 120).
    pub free_warning_seconds: u64,

    /// Capacity of the event broadcast channel (default: 64).
    pub event_channel_capacity: usize,
}

impl MeterConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            pricing_file: std::env::var("PRICING_FILE").ok().filter(|s| !s.is_empty()),
            tick_interval_ms: env_parse("TICK_INTERVAL_MS").unwrap_or(defaults.tick_interval_ms),
            ended_grace_seconds: env_parse("ENDED_GRACE_SECONDS")
                .unwrap_or(defaults.ended_grace_seconds),
            multiplier_basis: std::env::var("MULTIPLIER_BASIS")
                .ok()
                .map_or(defaults.multiplier_basis, |s| parse_basis(&s)),
            free_warning_seconds: env_parse("FREE_WARNING_SECONDS")
                .unwrap_or(defaults.free_warning_seconds),
            event_channel_capacity: env_parse("EVENT_CHANNEL_CAPACITY")
                .filter(|&n| n > 0)
                .unwrap_or(defaults.event_channel_capacity),
        }
    }

    /// Tick period.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Delay between a session ending and it being cleared.
    #[must_use]
    pub const fn ended_grace(&self) -> Duration {
        Duration::from_secs(self.ended_grace_seconds)
    }

    /// Engine options derived from this configuration.
    #[must_use]
    pub const fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            multiplier_basis: self.multiplier_basis,
            free_warning_seconds: self.free_warning_seconds,
        }
    }

    /// Load the pricing catalog from `pricing_file`, or the built-in table.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Config` if the file cannot be read or is not a
    /// valid catalog.
    pub fn load_pricing(&self) -> Result<PricingCatalog> {
        let Some(path) = &self.pricing_file else {
            tracing::debug!("PRICING_FILE not set, using built-in pricing");
            return Ok(PricingCatalog::default());
        };
        load_pricing_file(path)
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data/session-meter".into(),
            pricing_file: None,
            tick_interval_ms: 1000,
            ended_grace_seconds: 3,
            multiplier_basis: MultiplierBasis::Current,
            free_warning_seconds: DEFAULT_FREE_WARNING_SECONDS,
            event_channel_capacity: 64,
        }
    }
}

/// Load a pricing catalog from a JSON file.
fn load_pricing_file(path: &str) -> Result<PricingCatalog> {
    let contents = std::fs::read_to_string(Path::new(path))
        .map_err(|e| RuntimeError::Config(format!("cannot read {path}: {e}")))?;
    let catalog = PricingCatalog::from_json(&contents)
        .map_err(|e| RuntimeError::Config(format!("{path}: {e}")))?;
    tracing::info!(path, tiers = catalog.tiers.len(), "loaded pricing catalog");
    Ok(catalog)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn parse_basis(value: &str) -> MultiplierBasis {
    match value.trim().to_ascii_lowercase().as_str() {
        "peak" => MultiplierBasis::Peak,
        "current" => MultiplierBasis::Current,
        other => {
            tracing::warn!(value = other, "unknown MULTIPLIER_BASIS, using current");
            MultiplierBasis::Current
        }
    }
}
