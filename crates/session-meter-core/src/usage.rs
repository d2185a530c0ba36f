//! Cross-session usage ledger.
//!
//! Owns a [`UsageAccount`] and applies the bookkeeping rules: the daily
//! free-minute counter with its local-midnight reset, the pay-as-you-go
//! unpaid accumulator, payment-method changes and the tier lock.
//!
//! The daily reset is a logical-clock check ([`UsageLedger::reset_if_new_day`])
//! rather than a scheduled job; callers run it at load time and on every tick.

use chrono::{NaiveDate, Utc};

use crate::account::{AccountMode, UsageAccount};
use crate::error::{MeterError, Result};
use crate::pricing::{cents_to_usd, usd_to_cents, FreeTierLimits, TierId};
use crate::UserId;

/// Usage handed to the ledger when a session ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionCharge {
    /// Accrued session seconds.
    pub duration_seconds: u64,
    /// Final cost in USD.
    pub cost: f64,
    /// Whether the session ran on the free tier.
    pub is_free_tier: bool,
    /// Seconds that belong to an earlier free-minute day.
    pub seconds_before_rollover: u64,
}

impl SessionCharge {
    /// Duration in hours.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_hours(&self) -> f64 {
        self.duration_seconds as f64 / 3600.0
    }
}

/// Usage bookkeeping for one user.
#[derive(Debug, Clone)]
pub struct UsageLedger {
    account: UsageAccount,
    limits: FreeTierLimits,
}

impl UsageLedger {
    /// Wrap a loaded account, applying the daily reset for `today`.
    #[must_use]
    pub fn load(account: UsageAccount, limits: FreeTierLimits, today: NaiveDate) -> Self {
        let mut ledger = Self { account, limits };
        ledger.reset_if_new_day(today);
        ledger
    }

    /// Create a ledger for a user with no stored account.
    #[must_use]
    pub fn open(user_id: UserId, limits: FreeTierLimits, today: NaiveDate) -> Self {
        Self {
            account: UsageAccount::new(user_id, today),
            limits,
        }
    }

    /// The underlying account.
    #[must_use]
    pub const fn account(&self) -> &UsageAccount {
        &self.account
    }

    /// Consume the ledger, returning the account.
    #[must_use]
    pub fn into_account(self) -> UsageAccount {
        self.account
    }

    /// Whether the account is on the free tier.
    #[must_use]
    pub const fn is_free_tier(&self) -> bool {
        self.account.is_free_tier()
    }

    /// Free-tier seconds still available today.
    #[must_use]
    pub fn daily_free_seconds_remaining(&self) -> u64 {
        self.limits
            .daily_seconds()
            .saturating_sub(self.account.daily_free_seconds_used)
    }

    /// Free-tier minutes used today.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn daily_free_minutes_used(&self) -> f64 {
        self.account.daily_free_seconds_used as f64 / 60.0
    }

    /// Free-tier minutes still available today.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn daily_free_minutes_remaining(&self) -> f64 {
        self.daily_free_seconds_remaining() as f64 / 60.0
    }

    /// Unbilled pay-as-you-go usage in USD.
    #[must_use]
    pub fn unpaid_usage(&self) -> f64 {
        cents_to_usd(self.account.unpaid_usage_cents)
    }

    /// Add free-tier usage in seconds, capped at the daily allowance.
    ///
    /// Returns `false` (and changes nothing) for pay-as-you-go accounts.
    pub fn record_free_seconds(&mut self, seconds: u64) -> bool {
        if !self.account.is_free_tier() {
            return false;
        }
        self.add_free_seconds(seconds);
        true
    }

    fn add_free_seconds(&mut self, seconds: u64) {
        let cap = self.limits.daily_seconds();
        self.account.daily_free_seconds_used = self
            .account
            .daily_free_seconds_used
            .saturating_add(seconds)
            .min(cap);
        self.touch();

        tracing::debug!(
            user_id = %self.account.user_id,
            seconds,
            used = self.account.daily_free_seconds_used,
            "free-tier usage recorded"
        );
    }

    /// Add free-tier usage in minutes. See [`Self::record_free_seconds`].
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn record_free_minutes(&mut self, minutes: f64) -> bool {
        let seconds = (minutes.max(0.0) * 60.0).round() as u64;
        self.record_free_seconds(seconds)
    }

    /// Add pay-as-you-go usage in USD.
    ///
    /// Returns `false` (and changes nothing) for free-tier accounts or a
    /// non-positive amount.
    pub fn record_unpaid_usage(&mut self, amount_usd: f64) -> bool {
        if self.account.is_free_tier() {
            return false;
        }
        let cents = usd_to_cents(amount_usd);
        if cents <= 0 {
            return false;
        }
        self.account.unpaid_usage_cents = self.account.unpaid_usage_cents.saturating_add(cents);
        self.touch();

        tracing::debug!(
            user_id = %self.account.user_id,
            cents,
            unpaid_cents = self.account.unpaid_usage_cents,
            "unpaid usage recorded"
        );
        true
    }

    /// Apply the usage of an ended session: free seconds for free-tier
    /// sessions, unpaid usage otherwise, plus lifetime totals.
    ///
    /// Free seconds count against today's allowance whatever the account
    /// mode is now. Seconds from before a mid-session rollover are not
    /// charged to the new day.
    pub fn record_charge(&mut self, charge: &SessionCharge) {
        let applied = if charge.is_free_tier {
            self.add_free_seconds(
                charge
                    .duration_seconds
                    .saturating_sub(charge.seconds_before_rollover),
            );
            true
        } else {
            self.record_unpaid_usage(charge.cost)
        };
        if !applied && charge.duration_seconds > 0 {
            tracing::debug!(
                user_id = %self.account.user_id,
                is_free_tier = charge.is_free_tier,
                mode = self.account.mode.as_str(),
                "session charge not applicable to current account mode"
            );
        }
        self.record_session(charge.duration_seconds);
    }

    /// Count a completed session toward lifetime totals.
    pub fn record_session(&mut self, duration_seconds: u64) {
        self.account.lifetime_sessions += 1;
        self.account.lifetime_seconds = self
            .account
            .lifetime_seconds
            .saturating_add(duration_seconds);
        self.touch();
    }

    /// Reset the daily counter when `today` differs from the stored date.
    ///
    /// Returns `true` if a reset happened.
    pub fn reset_if_new_day(&mut self, today: NaiveDate) -> bool {
        if self.account.reset_date == today {
            return false;
        }
        tracing::info!(
            user_id = %self.account.user_id,
            previous = %self.account.reset_date,
            today = %today,
            "daily free minutes reset"
        );
        self.account.reset_date = today;
        self.account.daily_free_seconds_used = 0;
        self.touch();
        true
    }

    /// Put a payment method on file, moving a free-tier account to
    /// pay-as-you-go. No-op if one is already on file.
    pub fn attach_payment_method(&mut self) {
        if self.account.is_free_tier() {
            self.account.mode = AccountMode::Payg { tier: None };
            self.touch();
            tracing::info!(user_id = %self.account.user_id, "payment method attached");
        }
    }

    /// Remove the payment method, returning the account to the free tier.
    ///
    /// Unpaid usage is kept until billed.
    pub fn detach_payment_method(&mut self) {
        if !self.account.is_free_tier() {
            self.account.mode = AccountMode::FreeTier;
            self.touch();
            tracing::info!(
                user_id = %self.account.user_id,
                unpaid_cents = self.account.unpaid_usage_cents,
                "payment method removed"
            );
        }
    }

    /// Lock `tier` for the current billing period.
    ///
    /// Succeeds if no tier is locked yet or the same tier is already locked.
    ///
    /// # Errors
    ///
    /// - `MeterError::PaymentMethodRequired` on a free-tier account.
    /// - `MeterError::TierLocked` if a different tier is locked.
    pub fn lock_tier(&mut self, tier: &TierId) -> Result<()> {
        match &self.account.mode {
            AccountMode::FreeTier => return Err(MeterError::PaymentMethodRequired),
            AccountMode::Payg { tier: Some(locked) } if locked == tier => return Ok(()),
            AccountMode::Payg { tier: Some(locked) } => {
                return Err(MeterError::TierLocked {
                    locked: locked.to_string(),
                    requested: tier.to_string(),
                })
            }
            AccountMode::Payg { tier: None } => {}
        }

        self.account.mode = AccountMode::Payg {
            tier: Some(tier.clone()),
        };
        self.touch();
        tracing::info!(user_id = %self.account.user_id, tier = %tier, "tier locked for billing period");
        Ok(())
    }

    /// Close the billing period: returns the unpaid cents that were billed,
    /// zeroes the accumulator and unlocks the tier.
    pub fn close_billing_period(&mut self) -> i64 {
        let billed = std::mem::take(&mut self.account.unpaid_usage_cents);
        if let AccountMode::Payg { tier } = &mut self.account.mode {
            *tier = None;
        }
        self.touch();
        tracing::info!(user_id = %self.account.user_id, billed_cents = billed, "billing period closed");
        billed
    }

    fn touch(&mut self) {
        self.account.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn free_ledger() -> UsageLedger {
        UsageLedger::open(UserId::new("u1").unwrap(), FreeTierLimits::default(), day(16))
    }

    #[test]
    fn free_minutes_cap_at_daily_allowance() {
        let mut ledger = free_ledger();
        assert_eq!(ledger.daily_free_minutes_remaining(), 15.0);

        assert!(ledger.record_free_minutes(10.0));
        assert_eq!(ledger.daily_free_minutes_used(), 10.0);
        assert_eq!(ledger.daily_free_minutes_remaining(), 5.0);

        assert!(ledger.record_free_minutes(10.0));
        assert_eq!(ledger.daily_free_minutes_used(), 15.0);
        assert_eq!(ledger.daily_free_seconds_remaining(), 0);
    }

    #[test]
    fn free_minutes_ignored_for_payg() {
        let mut ledger = free_ledger();
        ledger.attach_payment_method();
        assert!(!ledger.record_free_seconds(120));
        assert_eq!(ledger.account().daily_free_seconds_used, 0);
    }

    #[test]
    fn unpaid_usage_only_for_payg() {
        let mut ledger = free_ledger();
        assert!(!ledger.record_unpaid_usage(10.0));
        assert_eq!(ledger.account().unpaid_usage_cents, 0);

        ledger.attach_payment_method();
        assert!(ledger.record_unpaid_usage(45.0));
        assert!(ledger.record_unpaid_usage(0.125));
        assert_eq!(ledger.account().unpaid_usage_cents, 4513);
        assert!((ledger.unpaid_usage() - 45.13).abs() < 1e-9);
        assert!(!ledger.record_unpaid_usage(0.0));
    }

    #[test]
    fn reset_on_new_day_only() {
        let mut ledger = free_ledger();
        ledger.record_free_minutes(15.0);
        assert!(!ledger.reset_if_new_day(day(16)));
        assert_eq!(ledger.daily_free_seconds_remaining(), 0);

        assert!(ledger.reset_if_new_day(day(17)));
        assert_eq!(ledger.daily_free_minutes_remaining(), 15.0);
        assert_eq!(ledger.account().reset_date, day(17));
    }

    #[test]
    fn load_applies_reset() {
        let mut account = UsageAccount::new(UserId::new("u1").unwrap(), day(15));
        account.daily_free_seconds_used = 900;
        let ledger = UsageLedger::load(account, FreeTierLimits::default(), day(16));
        assert_eq!(ledger.daily_free_seconds_remaining(), 900);
    }

    #[test]
    fn tier_lock_rules() {
        let mut ledger = free_ledger();
        let starter = TierId::new("starter");
        let pro = TierId::new("professional");

        assert_eq!(
            ledger.lock_tier(&starter),
            Err(MeterError::PaymentMethodRequired)
        );

        ledger.attach_payment_method();
        ledger.lock_tier(&starter).unwrap();
        ledger.lock_tier(&starter).unwrap();
        assert!(matches!(
            ledger.lock_tier(&pro),
            Err(MeterError::TierLocked { .. })
        ));
        assert_eq!(ledger.account().locked_tier(), Some(&starter));

        ledger.record_unpaid_usage(12.5);
        assert_eq!(ledger.close_billing_period(), 1250);
        assert_eq!(ledger.account().unpaid_usage_cents, 0);
        ledger.lock_tier(&pro).unwrap();
        assert_eq!(ledger.account().locked_tier(), Some(&pro));
    }

    #[test]
    fn detach_keeps_unpaid_balance() {
        let mut ledger = free_ledger();
        ledger.attach_payment_method();
        ledger.record_unpaid_usage(3.0);
        ledger.detach_payment_method();
        assert!(ledger.is_free_tier());
        assert_eq!(ledger.account().unpaid_usage_cents, 300);
    }

    #[test]
    fn record_charge_dispatches_on_mode() {
        let mut ledger = free_ledger();
        ledger.record_charge(&SessionCharge {
            duration_seconds: 300,
            cost: 0.0,
            is_free_tier: true,
            seconds_before_rollover: 0,
        });
        assert_eq!(ledger.daily_free_seconds_remaining(), 600);

        ledger.attach_payment_method();
        let charge = SessionCharge {
            duration_seconds: 3600,
            cost: 45.0,
            is_free_tier: false,
            seconds_before_rollover: 0,
        };
        assert_eq!(charge.duration_hours(), 1.0);
        ledger.record_charge(&charge);
        assert_eq!(ledger.account().unpaid_usage_cents, 4500);
        assert_eq!(ledger.account().lifetime_sessions, 2);
        assert_eq!(ledger.account().lifetime_seconds, 3900);
    }

    #[test]
    fn free_charge_counts_after_mode_change() {
        let mut ledger = free_ledger();
        ledger.attach_payment_method();
        ledger.record_charge(&SessionCharge {
            duration_seconds: 899,
            cost: 0.0,
            is_free_tier: true,
            seconds_before_rollover: 0,
        });
        assert_eq!(ledger.account().unpaid_usage_cents, 0);

        ledger.detach_payment_method();
        assert_eq!(ledger.account().daily_free_seconds_used, 899);
        assert_eq!(ledger.daily_free_seconds_remaining(), 1);
    }

    #[test]
    fn free_charge_skips_seconds_before_rollover() {
        let mut ledger = free_ledger();
        ledger.record_charge(&SessionCharge {
            duration_seconds: 400,
            cost: 0.0,
            is_free_tier: true,
            seconds_before_rollover: 250,
        });
        assert_eq!(ledger.account().daily_free_seconds_used, 150);
        assert_eq!(ledger.account().lifetime_seconds, 400);
    }

    #[test]
    fn lifetime_counters() {
        let mut ledger = free_ledger();
        ledger.record_session(60);
        ledger.record_session(30);
        assert_eq!(ledger.account().lifetime_sessions, 2);
        assert_eq!(ledger.account().lifetime_seconds, 90);
    }
}
