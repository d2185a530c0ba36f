//! Pricing catalog for session-meter.
//!
//! The catalog is an immutable value: the tier table, the free-tier limits,
//! the participant scaling rule and the currency used for display. Engines
//! receive it as an `Arc<PricingCatalog>` at construction; a pricing change
//! means building new engines, never mutating a shared table in place.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MeterError, Result};
use crate::multiplier::ParticipantRule;

/// Daily free-tier allowance in minutes.
pub const FREE_TIER_DAILY_MINUTES: u32 = 15;

/// Translation languages included in the free tier.
pub const FREE_TIER_TRANSLATION_LIMIT: u32 = 1;

/// Identifier of a paid tier (e.g. `starter`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierId(String);

impl TierId {
    /// Create a tier ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TierId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A paid pricing tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    /// Tier identifier.
    pub id: TierId,

    /// Display name.
    pub name: String,

    /// Base rate in USD per session hour.
    pub rate_per_hour: f64,

    /// Translation languages included in the base rate.
    pub translation_limit: u32,

    /// Total languages included, counting the source language.
    pub total_language_limit: u32,

    /// Rate in USD per hour for each language beyond the included limit.
    /// `None` means the tier does not allow overage languages.
    #[serde(default)]
    pub overage_rate_per_hour: Option<f64>,

    /// Marketing feature list.
    #[serde(default)]
    pub features: Vec<String>,
}

/// Limits that apply to free-tier sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeTierLimits {
    /// Free minutes per calendar day.
    pub daily_minutes: u32,

    /// Translation languages allowed.
    pub translation_limit: u32,

    /// Total languages allowed, counting the source language.
    pub total_language_limit: u32,
}

impl FreeTierLimits {
    /// Daily allowance in seconds.
    #[must_use]
    pub const fn daily_seconds(&self) -> u64 {
        self.daily_minutes as u64 * 60
    }
}

impl Default for FreeTierLimits {
    fn default() -> Self {
        Self {
            daily_minutes: FREE_TIER_DAILY_MINUTES,
            translation_limit: FREE_TIER_TRANSLATION_LIMIT,
            total_language_limit: FREE_TIER_TRANSLATION_LIMIT + 1,
        }
    }
}

/// Currency used when formatting amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencySettings {
    /// ISO 4217 code.
    pub code: String,

    /// Symbol prefixed to amounts.
    pub symbol: String,
}

impl Default for CurrencySettings {
    fn default() -> Self {
        Self {
            code: "USD".into(),
            symbol: "$".into(),
        }
    }
}

/// The complete pricing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingCatalog {
    /// Display currency.
    #[serde(default)]
    pub currency: CurrencySettings,

    /// Paid tiers.
    pub tiers: Vec<Tier>,

    /// Free-tier limits.
    #[serde(default)]
    pub free_tier: FreeTierLimits,

    /// Participant scaling rule.
    #[serde(default)]
    pub participants: ParticipantRule,
}

impl Default for PricingCatalog {
    fn default() -> Self {
        Self {
            currency: CurrencySettings::default(),
            tiers: vec![
                Tier {
                    id: TierId::new("starter"),
                    name: "Starter".into(),
                    rate_per_hour: 45.0,
                    translation_limit: 2,
                    total_language_limit: 3,
                    overage_rate_per_hour: Some(15.0),
                    features: vec![
                        "Real-time captions".into(),
                        "2 translation languages".into(),
                        "Up to 100 participants at base rate".into(),
                    ],
                },
                Tier {
                    id: TierId::new("professional"),
                    name: "Professional".into(),
                    rate_per_hour: 85.0,
                    translation_limit: 5,
                    total_language_limit: 6,
                    overage_rate_per_hour: Some(12.0),
                    features: vec![
                        "Real-time captions".into(),
                        "5 translation languages".into(),
                        "Participant language requests".into(),
                        "Transcript export".into(),
                    ],
                },
                Tier {
                    id: TierId::new("enterprise"),
                    name: "Enterprise".into(),
                    rate_per_hour: 150.0,
                    translation_limit: 10,
                    total_language_limit: 11,
                    overage_rate_per_hour: Some(10.0),
                    features: vec![
                        "Real-time captions".into(),
                        "10 translation languages".into(),
                        "Participant language requests".into(),
                        "Transcript export".into(),
                        "Priority support".into(),
                    ],
                },
            ],
            free_tier: FreeTierLimits::default(),
            participants: ParticipantRule::default(),
        }
    }
}

impl PricingCatalog {
    /// Parse and validate a catalog from JSON.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::ConfigError` if the JSON is malformed or the
    /// table fails validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Self = serde_json::from_str(json)
            .map_err(|e| MeterError::ConfigError(format!("invalid pricing JSON: {e}")))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check the table for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::ConfigError` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.tiers.is_empty() {
            return Err(MeterError::ConfigError("no tiers configured".into()));
        }
        for (i, tier) in self.tiers.iter().enumerate() {
            if self.tiers[..i].iter().any(|t| t.id == tier.id) {
                return Err(MeterError::ConfigError(format!(
                    "duplicate tier id: {}",
                    tier.id
                )));
            }
            if !tier.rate_per_hour.is_finite() || tier.rate_per_hour < 0.0 {
                return Err(MeterError::ConfigError(format!(
                    "tier {}: rate must be a non-negative number",
                    tier.id
                )));
            }
            if let Some(rate) = tier.overage_rate_per_hour {
                if !rate.is_finite() || rate < 0.0 {
                    return Err(MeterError::ConfigError(format!(
                        "tier {}: overage rate must be a non-negative number",
                        tier.id
                    )));
                }
            }
            if tier.translation_limit.checked_add(1) != Some(tier.total_language_limit) {
                return Err(MeterError::ConfigError(format!(
                    "tier {}: total language limit must be translation limit + 1",
                    tier.id
                )));
            }
        }
        if self.free_tier.translation_limit.checked_add(1)
            != Some(self.free_tier.total_language_limit)
        {
            return Err(MeterError::ConfigError(
                "free tier: total language limit must be translation limit + 1".into(),
            ));
        }
        self.participants.validate()
    }

    /// Look up a tier by ID.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::ConfigError` if no tier has this ID.
    pub fn tier(&self, id: &str) -> Result<&Tier> {
        self.tiers
            .iter()
            .find(|t| t.id.as_str() == id)
            .ok_or_else(|| MeterError::ConfigError(format!("unknown tier id: {id}")))
    }

    /// Free-tier limits.
    #[must_use]
    pub const fn free_tier_limits(&self) -> FreeTierLimits {
        self.free_tier
    }

    /// Participant scaling rule.
    #[must_use]
    pub const fn participant_rule(&self) -> ParticipantRule {
        self.participants
    }

    /// Format an amount, e.g. `$45.00`.
    #[must_use]
    pub fn format_cost(&self, amount: f64) -> String {
        format!("{}{:.2}", self.currency.symbol, round_cents(amount))
    }

    /// Format an hourly rate, e.g. `$45.00/hr`.
    #[must_use]
    pub fn format_rate(&self, rate_per_hour: f64) -> String {
        format!("{}/hr", self.format_cost(rate_per_hour))
    }

    /// Describe language limits, e.g. `2 translations (3 languages total)`.
    #[must_use]
    pub fn format_language_limits(&self, translations: u32, total: u32) -> String {
        let noun = if translations == 1 {
            "translation"
        } else {
            "translations"
        };
        format!("{translations} {noun} ({total} languages total)")
    }
}

/// Format elapsed seconds as `HH:MM:SS`.
#[must_use]
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

/// Round a USD amount to whole cents.
#[must_use]
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Convert a USD amount to integer cents.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn usd_to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Convert integer cents to USD.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn cents_to_usd(cents: i64) -> f64 {
    cents as f64 / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_is_valid() {
        let catalog = PricingCatalog::default();
        catalog.validate().unwrap();
        assert_eq!(catalog.tier("starter").unwrap().rate_per_hour, 45.0);
        assert_eq!(catalog.tier("professional").unwrap().translation_limit, 5);
        assert_eq!(catalog.free_tier_limits().daily_minutes, 15);
        assert_eq!(catalog.free_tier_limits().daily_seconds(), 900);
    }

    #[test]
    fn unknown_tier_is_config_error() {
        let catalog = PricingCatalog::default();
        assert!(matches!(
            catalog.tier("platinum"),
            Err(MeterError::ConfigError(_))
        ));
    }

    #[test]
    fn from_json_applies_defaults() {
        let json = r#"{
            "tiers": [{
                "id": "solo",
                "name": "Solo",
                "rate_per_hour": 20.0,
                "translation_limit": 1,
                "total_language_limit": 2
            }]
        }"#;
        let catalog = PricingCatalog::from_json(json).unwrap();
        let solo = catalog.tier("solo").unwrap();
        assert_eq!(solo.overage_rate_per_hour, None);
        assert_eq!(catalog.currency.symbol, "$");
        assert_eq!(catalog.participants, ParticipantRule::default());
    }

    #[test]
    fn from_json_rejects_duplicate_ids() {
        let json = r#"{
            "tiers": [
                {"id": "a", "name": "A", "rate_per_hour": 1.0, "translation_limit": 1, "total_language_limit": 2},
                {"id": "a", "name": "B", "rate_per_hour": 2.0, "translation_limit": 1, "total_language_limit": 2}
            ]
        }"#;
        let err = PricingCatalog::from_json(json).unwrap_err();
        assert!(err.to_string().contains("duplicate tier id"));
    }

    #[test]
    fn from_json_rejects_negative_rate() {
        let json = r#"{
            "tiers": [
                {"id": "a", "name": "A", "rate_per_hour": -1.0, "translation_limit": 1, "total_language_limit": 2}
            ]
        }"#;
        assert!(PricingCatalog::from_json(json).is_err());
        assert!(PricingCatalog::from_json("not json").is_err());
    }

    #[test]
    fn from_json_rejects_maximal_translation_limit() {
        for total in [0, u32::MAX] {
            let json = format!(
                r#"{{"tiers": [{{"id": "a", "name": "A", "rate_per_hour": 1.0, "translation_limit": {}, "total_language_limit": {total}}}]}}"#,
                u32::MAX
            );
            let err = PricingCatalog::from_json(&json).unwrap_err();
            assert!(matches!(err, MeterError::ConfigError(_)));
            assert!(err.to_string().contains("translation limit + 1"));
        }
    }

    #[test]
    fn formatting_helpers() {
        let catalog = PricingCatalog::default();
        assert_eq!(catalog.format_rate(45.0), "$45.00/hr");
        assert_eq!(catalog.format_cost(1.005_1), "$1.01");
        assert_eq!(
            catalog.format_language_limits(2, 3),
            "2 translations (3 languages total)"
        );
        assert_eq!(
            catalog.format_language_limits(1, 2),
            "1 translation (2 languages total)"
        );
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(3_725), "01:02:05");
    }

    #[test]
    fn cents_conversion() {
        assert_eq!(usd_to_cents(45.0), 4500);
        assert_eq!(usd_to_cents(0.125), 13);
        assert!((cents_to_usd(4500) - 45.0).abs() < f64::EPSILON);
    }
}
