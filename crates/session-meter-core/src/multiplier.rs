//! Participant-count billing multiplier.
//!
//! Sessions up to the base threshold bill at 1.0x. Every started block of
//! `increment_size` participants above it adds `increment_rate`.

use serde::{Deserialize, Serialize};

use crate::error::{MeterError, Result};

/// Participants covered by the base rate.
pub const DEFAULT_BASE_THRESHOLD: u32 = 100;

/// Participants per additional increment.
pub const DEFAULT_INCREMENT_SIZE: u32 = 100;

/// Multiplier added per increment.
pub const DEFAULT_INCREMENT_RATE: f64 = 0.25;

/// Scaling rule parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRule {
    /// Participants covered by the base rate.
    pub base_threshold: u32,

    /// Participants per increment above the threshold.
    pub increment_size: u32,

    /// Multiplier added per increment.
    pub increment_rate: f64,
}

impl Default for ParticipantRule {
    fn default() -> Self {
        Self {
            base_threshold: DEFAULT_BASE_THRESHOLD,
            increment_size: DEFAULT_INCREMENT_SIZE,
            increment_rate: DEFAULT_INCREMENT_RATE,
        }
    }
}

impl ParticipantRule {
    /// Compute the multiplier for a participant count.
    ///
    /// A count exactly at the threshold bills at 1.0x.
    #[must_use]
    pub fn compute(&self, participant_count: u32) -> ParticipantMultiplier {
        let multiplier = if participant_count <= self.base_threshold {
            1.0
        } else {
            let over = participant_count - self.base_threshold;
            let increments = over.div_ceil(self.increment_size.max(1));
            round2(1.0 + f64::from(increments) * self.increment_rate)
        };

        ParticipantMultiplier {
            participant_count,
            multiplier,
            base_threshold: self.base_threshold,
            increment_size: self.increment_size,
            increment_rate: self.increment_rate,
        }
    }

    /// Check the rule parameters.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::ConfigError` for a zero increment size or a
    /// negative increment rate.
    pub fn validate(&self) -> Result<()> {
        if self.increment_size == 0 {
            return Err(MeterError::ConfigError(
                "participant increment size must be positive".into(),
            ));
        }
        if !self.increment_rate.is_finite() || self.increment_rate < 0.0 {
            return Err(MeterError::ConfigError(
                "participant increment rate must be a non-negative number".into(),
            ));
        }
        Ok(())
    }
}

/// A computed participant multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticipantMultiplier {
    /// Participant count the multiplier was computed from.
    pub participant_count: u32,
    /// Billing multiplier, at least 1.0.
    pub multiplier: f64,
    /// Participants covered by the base rate.
    pub base_threshold: u32,
    /// Participants per increment.
    pub increment_size: u32,
    /// Multiplier added per increment.
    pub increment_rate: f64,
}

impl ParticipantMultiplier {
    /// Whether the count is above the base threshold.
    #[must_use]
    pub const fn is_over_threshold(&self) -> bool {
        self.participant_count > self.base_threshold
    }
}

/// Compute the multiplier using the default rule.
#[must_use]
pub fn compute(participant_count: u32) -> ParticipantMultiplier {
    ParticipantRule::default().compute(participant_count)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_or_below_threshold_is_one() {
        for count in [0, 1, 50, 99, 100] {
            assert_eq!(compute(count).multiplier, 1.0, "count {count}");
        }
    }

    #[test]
    fn above_threshold_steps_up() {
        assert_eq!(compute(101).multiplier, 1.25);
        assert_eq!(compute(150).multiplier, 1.25);
        assert_eq!(compute(200).multiplier, 1.25);
        assert_eq!(compute(201).multiplier, 1.5);
        assert_eq!(compute(1_000).multiplier, 3.25);
        assert!(compute(101).is_over_threshold());
        assert!(!compute(100).is_over_threshold());
    }

    #[test]
    fn custom_rule_rounds_to_two_places() {
        let rule = ParticipantRule {
            base_threshold: 10,
            increment_size: 3,
            increment_rate: 0.333,
        };
        // ceil(5 / 3) = 2 increments -> 1.666 -> 1.67
        assert_eq!(rule.compute(15).multiplier, 1.67);
    }

    #[test]
    fn validate_rejects_zero_increment() {
        let rule = ParticipantRule {
            increment_size: 0,
            ..ParticipantRule::default()
        };
        assert!(rule.validate().is_err());
        assert!(ParticipantRule::default().validate().is_ok());
    }
}
