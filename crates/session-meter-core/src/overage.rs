//! Overage language ledger.
//!
//! Languages added beyond a tier's included limit are billed per hour from
//! the minute they were added until the minute they were removed (or the
//! session ended). The rate is snapshotted when the language is added.
//!
//! Open entries are valued on every tick through [`OverageLedger::total_cost`],
//! which never mutates the ledger. An entry's `calculated_cost` is written
//! exactly once, when it closes.

use serde::{Deserialize, Serialize};

use crate::error::{MeterError, Result};

/// A language billed as overage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverageLanguage {
    /// Language code (e.g. `es`).
    pub code: String,

    /// Session minute at which the language was added.
    pub added_at_minutes: f64,

    /// Session minute at which the language was removed. `None` while active.
    pub removed_at_minutes: Option<f64>,

    /// Rate in USD per hour, fixed at add time.
    pub overage_rate_per_hour: f64,

    /// Cost in USD, written when the entry closes.
    pub calculated_cost: f64,
}

impl OverageLanguage {
    /// Whether the language is still active.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.removed_at_minutes.is_none()
    }

    /// Cost of this entry as of `at_minutes`.
    ///
    /// Closed entries return their calculated cost; open entries are
    /// projected as if closed now.
    #[must_use]
    pub fn cost_at(&self, at_minutes: f64, multiplier: f64) -> f64 {
        if self.is_open() {
            self.interval_cost(at_minutes, multiplier)
        } else {
            self.calculated_cost
        }
    }

    /// Minutes the language has been (or was) active as of `at_minutes`.
    #[must_use]
    pub fn active_minutes(&self, at_minutes: f64) -> f64 {
        let end = self.removed_at_minutes.unwrap_or(at_minutes);
        (end - self.added_at_minutes).max(0.0)
    }

    fn interval_cost(&self, end_minutes: f64, multiplier: f64) -> f64 {
        let minutes = (end_minutes - self.added_at_minutes).max(0.0);
        minutes / 60.0 * self.overage_rate_per_hour * multiplier
    }

    fn close(&mut self, at_minutes: f64, multiplier: f64) {
        let at = at_minutes.max(self.added_at_minutes);
        self.removed_at_minutes = Some(at);
        self.calculated_cost = self.interval_cost(at, multiplier);
    }
}

/// The per-session ledger of overage languages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverageLedger {
    entries: Vec<OverageLanguage>,
}

impl OverageLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new entry for `code`.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::DuplicateLanguage` if `code` already has an
    /// open entry.
    pub fn add_language(
        &mut self,
        code: &str,
        added_at_minutes: f64,
        rate_per_hour: f64,
    ) -> Result<&OverageLanguage> {
        if self.is_active(code) {
            return Err(MeterError::DuplicateLanguage { code: code.into() });
        }

        self.entries.push(OverageLanguage {
            code: code.into(),
            added_at_minutes,
            removed_at_minutes: None,
            overage_rate_per_hour: rate_per_hour,
            calculated_cost: 0.0,
        });

        tracing::debug!(code, added_at_minutes, rate_per_hour, "overage language opened");

        let index = self.entries.len() - 1;
        Ok(&self.entries[index])
    }

    /// Close the open entry for `code` and compute its cost.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::LanguageNotFound` if `code` has no open entry.
    pub fn remove_language(
        &mut self,
        code: &str,
        at_minutes: f64,
        multiplier: f64,
    ) -> Result<&OverageLanguage> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.is_open() && e.code == code)
            .ok_or_else(|| MeterError::LanguageNotFound { code: code.into() })?;

        entry.close(at_minutes, multiplier);

        tracing::debug!(
            code,
            at_minutes,
            cost = entry.calculated_cost,
            "overage language closed"
        );

        Ok(&*entry)
    }

    /// Close every open entry. Returns how many were closed.
    pub fn close_all_open(&mut self, at_minutes: f64, multiplier: f64) -> usize {
        let mut closed = 0;
        for entry in self.entries.iter_mut().filter(|e| e.is_open()) {
            entry.close(at_minutes, multiplier);
            closed += 1;
        }
        closed
    }

    /// Total overage cost as of `at_minutes`, without mutating the ledger.
    #[must_use]
    pub fn total_cost(&self, at_minutes: f64, multiplier: f64) -> f64 {
        self.entries
            .iter()
            .map(|e| e.cost_at(at_minutes, multiplier))
            .sum()
    }

    /// Whether `code` has an open entry.
    #[must_use]
    pub fn is_active(&self, code: &str) -> bool {
        self.entries.iter().any(|e| e.is_open() && e.code == code)
    }

    /// Codes with an open entry.
    pub fn active_codes(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| e.is_open())
            .map(|e| e.code.as_str())
    }

    /// Number of open entries.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_open()).count()
    }

    /// All entries, open and closed, in the order they were added.
    #[must_use]
    pub fn entries(&self) -> &[OverageLanguage] {
        &self.entries
    }

    /// Whether the ledger has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn add_then_duplicate_fails() {
        let mut ledger = OverageLedger::new();
        ledger.add_language("es", 0.0, 12.0).unwrap();
        assert_eq!(
            ledger.add_language("es", 5.0, 12.0).unwrap_err(),
            MeterError::DuplicateLanguage { code: "es".into() }
        );
        assert_eq!(ledger.active_count(), 1);
    }

    #[test]
    fn remove_unknown_fails() {
        let mut ledger = OverageLedger::new();
        assert_eq!(
            ledger.remove_language("fr", 1.0, 1.0).unwrap_err(),
            MeterError::LanguageNotFound { code: "fr".into() }
        );
    }

    #[test]
    fn remove_computes_cost_and_freezes_it() {
        let mut ledger = OverageLedger::new();
        ledger.add_language("es", 10.0, 12.0).unwrap();
        let entry = ledger.remove_language("es", 40.0, 1.0).unwrap();
        assert!(approx(entry.calculated_cost, 6.0));
        assert_eq!(entry.removed_at_minutes, Some(40.0));

        // Later reads do not accrue, even with a different multiplier.
        assert!(approx(ledger.total_cost(60.0, 1.0), 6.0));
        assert!(approx(ledger.total_cost(90.0, 2.0), 6.0));
    }

    #[test]
    fn projection_does_not_mutate() {
        let mut ledger = OverageLedger::new();
        ledger.add_language("de", 0.0, 10.0).unwrap();
        assert!(approx(ledger.total_cost(30.0, 1.0), 5.0));
        assert!(approx(ledger.total_cost(60.0, 1.5), 15.0));
        assert!(ledger.entries()[0].is_open());
        assert_eq!(ledger.entries()[0].calculated_cost, 0.0);
    }

    #[test]
    fn readd_after_remove_opens_new_entry() {
        let mut ledger = OverageLedger::new();
        ledger.add_language("es", 0.0, 12.0).unwrap();
        ledger.remove_language("es", 30.0, 1.0).unwrap();
        ledger.add_language("es", 45.0, 12.0).unwrap();

        assert_eq!(ledger.entries().len(), 2);
        assert_eq!(ledger.active_codes().collect::<Vec<_>>(), vec!["es"]);
        // 30 min closed (6.0) + 15 min open (3.0)
        assert!(approx(ledger.total_cost(60.0, 1.0), 9.0));
    }

    #[test]
    fn close_all_open_skips_closed_entries() {
        let mut ledger = OverageLedger::new();
        ledger.add_language("es", 0.0, 12.0).unwrap();
        ledger.add_language("fr", 30.0, 12.0).unwrap();
        ledger.remove_language("es", 10.0, 1.0).unwrap();

        assert_eq!(ledger.close_all_open(60.0, 1.25), 1);
        assert_eq!(ledger.active_count(), 0);
        assert_eq!(ledger.entries()[0].removed_at_minutes, Some(10.0));
        // fr: 30 minutes * 12/hr * 1.25 = 7.5
        assert!(approx(ledger.entries()[1].calculated_cost, 7.5));
    }

    #[test]
    fn removal_never_precedes_addition() {
        let mut ledger = OverageLedger::new();
        ledger.add_language("ja", 20.0, 12.0).unwrap();
        let entry = ledger.remove_language("ja", 5.0, 1.0).unwrap();
        assert_eq!(entry.removed_at_minutes, Some(20.0));
        assert_eq!(entry.calculated_cost, 0.0);
        assert_eq!(entry.active_minutes(99.0), 0.0);
    }
}
