//! Session types for session-meter.
//!
//! A [`Session`] is owned by the engine and mutated once per tick while
//! active. Everything handed to callers is a read-only projection:
//! [`SessionSnapshot`] for live display and [`SessionSummary`] for the
//! archive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::multiplier::{ParticipantMultiplier, ParticipantRule};
use crate::overage::{OverageLanguage, OverageLedger};
use crate::pricing::{FreeTierLimits, Tier, TierId};
use crate::{MeetingId, SessionId, UserId};

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No session has been started.
    NotStarted,
    /// Ticking and accruing cost.
    Active,
    /// Suspended; no accrual.
    Paused,
    /// Frozen.
    Ended,
}

impl SessionStatus {
    /// Get the status name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Ended => "ended",
        }
    }

    /// Whether the session is active or paused.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Active | Self::Paused)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The host stopped the session.
    Manual,
    /// The daily free-tier allowance ran out.
    FreeTierLimitReached,
}

/// Role of the user in the host meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Meeting host.
    Host,
    /// Meeting co-host.
    CoHost,
    /// Regular attendee.
    Attendee,
}

/// Identity supplied by the host meeting platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostContext {
    /// Meeting the session runs in.
    pub meeting_id: MeetingId,
    /// User starting the session.
    pub user_id: UserId,
    /// Role of the user in the meeting.
    pub role: UserRole,
    /// Display name.
    pub display_name: String,
}

/// Parameters for starting a session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Host identity; required.
    pub context: Option<HostContext>,
    /// Requested paid tier. `None` uses the locked tier, or the free tier.
    pub tier: Option<TierId>,
    /// Spoken language.
    pub source_language: String,
    /// Caption languages.
    pub target_languages: Vec<String>,
    /// Participants at start.
    pub participant_count: u32,
    /// Whether participants may request extra languages.
    pub allow_language_requests: bool,
    /// Whether participants above the base threshold may be billed.
    pub allow_participant_overage: bool,
}

impl SessionRequest {
    /// Create a request with no context, no tier and permissive flags.
    #[must_use]
    pub fn new(
        source_language: impl Into<String>,
        target_languages: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            context: None,
            tier: None,
            source_language: source_language.into(),
            target_languages: target_languages.into_iter().map(Into::into).collect(),
            participant_count: 1,
            allow_language_requests: true,
            allow_participant_overage: true,
        }
    }

    /// Set the host context.
    #[must_use]
    pub fn with_context(mut self, context: HostContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Request a paid tier.
    #[must_use]
    pub fn with_tier(mut self, tier: impl Into<TierId>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    /// Set the starting participant count.
    #[must_use]
    pub fn with_participants(mut self, count: u32) -> Self {
        self.participant_count = count;
        self
    }

    /// Allow or refuse participant language requests.
    #[must_use]
    pub fn with_language_requests(mut self, allow: bool) -> Self {
        self.allow_language_requests = allow;
        self
    }

    /// Allow or refuse billing above the participant threshold.
    #[must_use]
    pub fn with_participant_overage(mut self, allow: bool) -> Self {
        self.allow_participant_overage = allow;
        self
    }
}

/// The billing plan a session runs under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "plan")]
pub enum SessionPlan {
    /// Free tier, capped at the minutes left today when the session started.
    FreeTier {
        /// Free-tier limits.
        limits: FreeTierLimits,
        /// Seconds the session may run.
        limit_seconds: u64,
    },
    /// Pay-as-you-go under a paid tier.
    Payg {
        /// The tier, snapshotted at start.
        tier: Tier,
    },
}

impl SessionPlan {
    /// Whether this is a free-tier session.
    #[must_use]
    pub const fn is_free_tier(&self) -> bool {
        matches!(self, Self::FreeTier { .. })
    }

    /// Paid tier ID, if any.
    #[must_use]
    pub fn tier_id(&self) -> Option<&TierId> {
        match self {
            Self::Payg { tier } => Some(&tier.id),
            Self::FreeTier { .. } => None,
        }
    }

    /// Translation languages included.
    #[must_use]
    pub const fn translation_limit(&self) -> u32 {
        match self {
            Self::FreeTier { limits, .. } => limits.translation_limit,
            Self::Payg { tier } => tier.translation_limit,
        }
    }

    /// Base rate per hour; zero on the free tier.
    #[must_use]
    pub fn rate_per_hour(&self) -> f64 {
        match self {
            Self::FreeTier { .. } => 0.0,
            Self::Payg { tier } => tier.rate_per_hour,
        }
    }

    /// Overage rate per hour, if the plan allows overage languages.
    #[must_use]
    pub fn overage_rate_per_hour(&self) -> Option<f64> {
        match self {
            Self::FreeTier { .. } => None,
            Self::Payg { tier } => tier.overage_rate_per_hour,
        }
    }

    /// Free-tier cap in seconds.
    #[must_use]
    pub const fn limit_seconds(&self) -> Option<u64> {
        match self {
            Self::FreeTier { limit_seconds, .. } => Some(*limit_seconds),
            Self::Payg { .. } => None,
        }
    }
}

/// Which participant count drives the multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiplierBasis {
    /// Live participant count.
    #[default]
    Current,
    /// Highest count seen in the session.
    Peak,
}

/// A translation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Session ID.
    pub id: SessionId,
    /// Owning user.
    pub user_id: UserId,
    /// Host meeting.
    pub meeting_id: MeetingId,
    /// Host display name.
    pub host_display_name: String,
    /// Host role.
    pub host_role: UserRole,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Billing plan.
    pub plan: SessionPlan,
    /// Spoken language.
    pub source_language: String,
    /// Caption languages, no duplicates.
    pub target_languages: Vec<String>,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// When the session ended.
    pub ended_at: Option<DateTime<Utc>>,
    /// Accrued seconds (paused time excluded).
    pub duration_seconds: u64,
    /// Live participant count.
    pub participant_count: u32,
    /// Highest participant count seen.
    pub peak_participant_count: u32,
    /// Multiplier computed on the last recompute.
    pub participant_multiplier: ParticipantMultiplier,
    /// Base cost in USD.
    pub base_cost: f64,
    /// Overage languages.
    pub overage: OverageLedger,
    /// Overage cost in USD.
    pub overage_cost: f64,
    /// `base_cost + overage_cost`.
    pub cost: f64,
    /// Whether participants may request extra languages.
    pub allow_language_requests: bool,
    /// Whether participants above the threshold may be billed.
    pub allow_participant_overage: bool,
    /// Whether the free-time warning has fired.
    pub free_time_warning_issued: bool,
    /// Set once the session ends.
    pub end_reason: Option<EndReason>,
    /// Seconds accrued before the free-minute day rolled over mid-session.
    #[serde(default)]
    pub seconds_before_rollover: u64,
}

impl Session {
    /// Elapsed time in minutes.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_minutes(&self) -> f64 {
        self.duration_seconds as f64 / 60.0
    }

    /// Elapsed time in hours.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_hours(&self) -> f64 {
        self.duration_seconds as f64 / 3600.0
    }

    /// Free-tier seconds left, if this is a free-tier session.
    #[must_use]
    pub fn free_seconds_remaining(&self) -> Option<u64> {
        self.plan
            .limit_seconds()
            .map(|limit| limit.saturating_sub(self.duration_seconds))
    }

    /// Languages included in the plan (targets that are not overage).
    #[must_use]
    pub fn included_language_count(&self) -> usize {
        self.target_languages.len() - self.overage.active_count()
    }

    /// Whether `code` is the source or a target language.
    #[must_use]
    pub fn has_language(&self, code: &str) -> bool {
        self.source_language == code || self.target_languages.iter().any(|l| l == code)
    }

    /// Recompute multiplier and cost for the current duration.
    pub(crate) fn recompute(&mut self, rule: &ParticipantRule, basis: MultiplierBasis) {
        self.peak_participant_count = self.peak_participant_count.max(self.participant_count);
        let count = match basis {
            MultiplierBasis::Current => self.participant_count,
            MultiplierBasis::Peak => self.peak_participant_count,
        };
        self.participant_multiplier = rule.compute(count);
        let multiplier = self.participant_multiplier.multiplier;

        self.base_cost = self.plan.rate_per_hour() * self.duration_hours() * multiplier;
        self.overage_cost = self
            .overage
            .total_cost(self.duration_minutes(), multiplier);
        self.cost = self.base_cost + self.overage_cost;
    }

    /// Read-only projection for display.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            status: self.status,
            tier: self.plan.tier_id().cloned(),
            is_free_tier: self.plan.is_free_tier(),
            source_language: self.source_language.clone(),
            target_languages: self.target_languages.clone(),
            duration_seconds: self.duration_seconds,
            participant_count: self.participant_count,
            peak_participant_count: self.peak_participant_count,
            participant_multiplier: self.participant_multiplier.multiplier,
            base_cost: self.base_cost,
            overage_cost: self.overage_cost,
            cost: self.cost,
            overage: self.overage.entries().to_vec(),
            free_seconds_remaining: self.free_seconds_remaining(),
            free_time_warning_issued: self.free_time_warning_issued,
            allow_language_requests: self.allow_language_requests,
            allow_participant_overage: self.allow_participant_overage,
            end_reason: self.end_reason,
        }
    }

    /// Frozen summary for the archive.
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id,
            user_id: self.user_id.clone(),
            meeting_id: self.meeting_id.clone(),
            tier: self.plan.tier_id().cloned(),
            is_free_tier: self.plan.is_free_tier(),
            source_language: self.source_language.clone(),
            target_languages: self.target_languages.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_seconds: self.duration_seconds,
            base_cost: self.base_cost,
            overage_cost: self.overage_cost,
            cost: self.cost,
            peak_participant_count: self.peak_participant_count,
            participant_multiplier: self.participant_multiplier.multiplier,
            overage: self.overage.entries().to_vec(),
            end_reason: self.end_reason,
        }
    }
}

/// Live view of a session, published once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session ID.
    pub session_id: SessionId,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Paid tier, if any.
    pub tier: Option<TierId>,
    /// Whether this is a free-tier session.
    pub is_free_tier: bool,
    /// Spoken language.
    pub source_language: String,
    /// Caption languages.
    pub target_languages: Vec<String>,
    /// Accrued seconds.
    pub duration_seconds: u64,
    /// Live participant count.
    pub participant_count: u32,
    /// Highest participant count seen.
    pub peak_participant_count: u32,
    /// Current multiplier.
    pub participant_multiplier: f64,
    /// Base cost in USD.
    pub base_cost: f64,
    /// Overage cost in USD.
    pub overage_cost: f64,
    /// Total cost in USD.
    pub cost: f64,
    /// Overage entries.
    pub overage: Vec<OverageLanguage>,
    /// Free-tier seconds left.
    pub free_seconds_remaining: Option<u64>,
    /// Whether the free-time warning has fired.
    pub free_time_warning_issued: bool,
    /// Whether participants may request languages.
    pub allow_language_requests: bool,
    /// Whether participants above the threshold may be billed.
    pub allow_participant_overage: bool,
    /// Why the session ended.
    pub end_reason: Option<EndReason>,
}

/// Archived record of an ended session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session ID.
    pub session_id: SessionId,
    /// Owning user.
    pub user_id: UserId,
    /// Host meeting.
    pub meeting_id: MeetingId,
    /// Paid tier, if any.
    pub tier: Option<TierId>,
    /// Whether this was a free-tier session.
    pub is_free_tier: bool,
    /// Spoken language.
    pub source_language: String,
    /// Caption languages at the end.
    pub target_languages: Vec<String>,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// When the session ended.
    pub ended_at: Option<DateTime<Utc>>,
    /// Accrued seconds.
    pub duration_seconds: u64,
    /// Base cost in USD.
    pub base_cost: f64,
    /// Overage cost in USD.
    pub overage_cost: f64,
    /// Total cost in USD.
    pub cost: f64,
    /// Highest participant count.
    pub peak_participant_count: u32,
    /// Multiplier at the end.
    pub participant_multiplier: f64,
    /// Overage entries, all closed.
    pub overage: Vec<OverageLanguage>,
    /// Why the session ended.
    pub end_reason: Option<EndReason>,
}

impl SessionSummary {
    /// Duration in hours.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_hours(&self) -> f64 {
        self.duration_seconds as f64 / 3600.0
    }

    /// Whether the free-tier cap ended the session.
    #[must_use]
    pub fn hit_free_tier_limit(&self) -> bool {
        self.end_reason == Some(EndReason::FreeTierLimitReached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::PricingCatalog;

    #[test]
    fn status_liveness() {
        assert!(!SessionStatus::NotStarted.is_live());
        assert!(SessionStatus::Active.is_live());
        assert!(SessionStatus::Paused.is_live());
        assert!(!SessionStatus::Ended.is_live());
        assert_eq!(SessionStatus::NotStarted.to_string(), "not_started");
    }

    #[test]
    fn request_defaults_are_permissive() {
        let request = SessionRequest::new("en", ["es", "fr"]);
        assert!(request.context.is_none());
        assert!(request.tier.is_none());
        assert_eq!(request.participant_count, 1);
        assert!(request.allow_language_requests);
        assert!(request.allow_participant_overage);
        assert_eq!(request.target_languages, vec!["es", "fr"]);

        let request = request.with_tier("starter").with_participants(30);
        assert_eq!(request.tier.as_ref().map(TierId::as_str), Some("starter"));
        assert_eq!(request.participant_count, 30);
    }

    #[test]
    fn plan_accessors() {
        let catalog = PricingCatalog::default();
        let free = SessionPlan::FreeTier {
            limits: catalog.free_tier_limits(),
            limit_seconds: 600,
        };
        assert!(free.is_free_tier());
        assert_eq!(free.tier_id(), None);
        assert_eq!(free.translation_limit(), 1);
        assert_eq!(free.rate_per_hour(), 0.0);
        assert_eq!(free.overage_rate_per_hour(), None);
        assert_eq!(free.limit_seconds(), Some(600));

        let paid = SessionPlan::Payg {
            tier: catalog.tier("professional").unwrap().clone(),
        };
        assert!(!paid.is_free_tier());
        assert_eq!(paid.tier_id().map(TierId::as_str), Some("professional"));
        assert_eq!(paid.translation_limit(), 5);
        assert_eq!(paid.rate_per_hour(), 85.0);
        assert_eq!(paid.overage_rate_per_hour(), Some(12.0));
        assert_eq!(paid.limit_seconds(), None);
    }

    #[test]
    fn plan_serializes_with_tag() {
        let plan = SessionPlan::FreeTier {
            limits: FreeTierLimits::default(),
            limit_seconds: 900,
        };
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["plan"], "free_tier");
        assert_eq!(json["limit_seconds"], 900);
    }
}
