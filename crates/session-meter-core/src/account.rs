//! Usage account types for session-meter.
//!
//! An account is either on the free tier or pay-as-you-go. The two modes are
//! a tagged union so an account can never be both at once.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::pricing::TierId;
use crate::UserId;

/// Billing mode of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum AccountMode {
    /// No payment method: daily free minutes only.
    FreeTier,

    /// Payment method on file: sessions accrue unpaid usage.
    Payg {
        /// Tier locked for the current billing period. Chosen by the first
        /// pay-as-you-go session of the period and fixed until the period
        /// is closed.
        tier: Option<TierId>,
    },
}

impl AccountMode {
    /// Get the mode name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FreeTier => "free_tier",
            Self::Payg { .. } => "payg",
        }
    }
}

/// A per-user usage account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageAccount {
    /// The user ID (from the host platform).
    pub user_id: UserId,

    /// Free tier or pay-as-you-go.
    pub mode: AccountMode,

    /// Free-tier seconds used on `reset_date`.
    pub daily_free_seconds_used: u64,

    /// Local calendar date the daily counter belongs to.
    pub reset_date: NaiveDate,

    /// Accumulated unbilled usage in cents.
    pub unpaid_usage_cents: i64,

    /// Sessions completed over the account's lifetime.
    pub lifetime_sessions: u64,

    /// Session seconds over the account's lifetime.
    pub lifetime_seconds: u64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl UsageAccount {
    /// Create a new free-tier account with nothing used.
    #[must_use]
    pub fn new(user_id: UserId, today: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            mode: AccountMode::FreeTier,
            daily_free_seconds_used: 0,
            reset_date: today,
            unpaid_usage_cents: 0,
            lifetime_sessions: 0,
            lifetime_seconds: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the account is on the free tier.
    #[must_use]
    pub const fn is_free_tier(&self) -> bool {
        matches!(self.mode, AccountMode::FreeTier)
    }

    /// Whether a payment method is on file.
    #[must_use]
    pub const fn payment_method_added(&self) -> bool {
        matches!(self.mode, AccountMode::Payg { .. })
    }

    /// The tier locked for the current billing period, if any.
    #[must_use]
    pub fn locked_tier(&self) -> Option<&TierId> {
        match &self.mode {
            AccountMode::Payg { tier } => tier.as_ref(),
            AccountMode::FreeTier => None,
        }
    }
}
