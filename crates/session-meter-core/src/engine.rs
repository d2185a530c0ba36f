//! The session accounting engine.
//!
//! A [`SessionEngine`] owns one user's [`UsageLedger`] and at most one live
//! session. It is a plain state machine:
//!
//! ```text
//! not_started -> active <-> paused -> ended
//! ```
//!
//! `tick()` is a pure transition driven from outside (the runtime's 1 Hz
//! timer or a test loop). Every tick recomputes the multiplier and the cost
//! from scratch, so nothing is carried stale across ticks. The free-tier cap
//! is enforced inside `tick()`: the tick's cost mutations complete first,
//! then the session ends through the same path as a manual stop.
//!
//! Events are queued in an outbox and drained by the caller with
//! [`SessionEngine::drain_events`].

use std::sync::Arc;

use chrono::NaiveDate;

use crate::account::UsageAccount;
use crate::clock::Clock;
use crate::error::{MeterError, Result};
use crate::events::SessionEvent;
use crate::overage::OverageLedger;
use crate::pricing::PricingCatalog;
use crate::session::{
    EndReason, HostContext, MultiplierBasis, Session, SessionPlan, SessionRequest,
    SessionSnapshot, SessionStatus, SessionSummary,
};
use crate::usage::{SessionCharge, UsageLedger};
use crate::SessionId;

/// Seconds before the free-tier cap at which the warning fires.
pub const DEFAULT_FREE_WARNING_SECONDS: u64 = 120;

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Participant count that drives the multiplier.
    pub multiplier_basis: MultiplierBasis,
    /// Seconds before the free-tier cap at which to warn.
    pub free_warning_seconds: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            multiplier_basis: MultiplierBasis::Current,
            free_warning_seconds: DEFAULT_FREE_WARNING_SECONDS,
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    /// Whether a second was accrued (false while paused).
    pub accrued: bool,
    /// Whether the free-time warning fired on this tick.
    pub warning_issued: bool,
    /// Set when the tick ended the session.
    pub ended: Option<SessionSummary>,
}

/// Result of an add-language request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageAddition {
    /// Added within the plan's included languages.
    Included,
    /// Added as a billed overage language.
    Overage,
    /// Already present; nothing changed.
    AlreadyActive,
}

/// Result of a remove-language request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LanguageRemoval {
    /// An included language was removed.
    Included,
    /// An overage language was closed with this final cost.
    Overage {
        /// Final cost of the entry in USD.
        calculated_cost: f64,
    },
}

/// Session accounting state machine for one user.
pub struct SessionEngine {
    catalog: Arc<PricingCatalog>,
    options: EngineOptions,
    clock: Arc<dyn Clock>,
    usage: UsageLedger,
    current: Option<Session>,
    history: Vec<SessionSummary>,
    events: Vec<SessionEvent>,
}

impl SessionEngine {
    /// Create an engine for the account held by `usage`.
    #[must_use]
    pub fn new(catalog: Arc<PricingCatalog>, usage: UsageLedger, clock: Arc<dyn Clock>) -> Self {
        Self::with_options(catalog, usage, clock, EngineOptions::default())
    }

    /// Create an engine with explicit options.
    #[must_use]
    pub fn with_options(
        catalog: Arc<PricingCatalog>,
        mut usage: UsageLedger,
        clock: Arc<dyn Clock>,
        options: EngineOptions,
    ) -> Self {
        usage.reset_if_new_day(clock.today());
        Self {
            catalog,
            options,
            clock,
            usage,
            current: None,
            history: Vec::new(),
            events: Vec::new(),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start a new session.
    ///
    /// # Errors
    ///
    /// - `SessionAlreadyActive` if a session is active or paused.
    /// - `MissingContext` if the host context is absent or belongs to
    ///   another user, or a pay-as-you-go account has no tier selected.
    /// - `NoTargetLanguages` if no usable target language was given.
    /// - `ConfigError` for an unknown tier.
    /// - `LanguageLimitExceeded` if the plan includes fewer languages.
    /// - `ParticipantOverageNotAllowed` if the starting count is above the
    ///   threshold and participant overage is off.
    /// - `PaymentMethodRequired`, `TierLocked` from the tier lock.
    /// - `FreeTierExhausted` if no free minutes remain today.
    pub fn start(&mut self, request: SessionRequest) -> Result<SessionId> {
        if let Some(session) = self.current.as_ref().filter(|s| s.status.is_live()) {
            return Err(MeterError::SessionAlreadyActive {
                session_id: session.id.to_string(),
            });
        }

        let context = request
            .context
            .ok_or_else(|| MeterError::MissingContext("host context unavailable".into()))?;
        self.check_owner(&context)?;

        self.usage.reset_if_new_day(self.clock.today());

        let source_language = request.source_language.trim().to_string();
        let target_languages = normalize_targets(&source_language, request.target_languages);
        if target_languages.is_empty() {
            return Err(MeterError::NoTargetLanguages);
        }

        let plan = self.resolve_plan(request.tier.as_ref())?;

        let limit = plan.translation_limit();
        if target_languages.len() > limit as usize {
            return Err(MeterError::LanguageLimitExceeded {
                requested: target_languages.len(),
                limit,
            });
        }

        let rule = self.catalog.participant_rule();
        if !request.allow_participant_overage && request.participant_count > rule.base_threshold {
            return Err(MeterError::ParticipantOverageNotAllowed {
                count: request.participant_count,
                threshold: rule.base_threshold,
            });
        }

        // Validation is done; only now commit the tier lock.
        if let SessionPlan::Payg { tier } = &plan {
            self.usage.lock_tier(&tier.id)?;
        }

        let mut session = Session {
            id: SessionId::generate(),
            user_id: context.user_id,
            meeting_id: context.meeting_id,
            host_display_name: context.display_name,
            host_role: context.role,
            status: SessionStatus::Active,
            plan,
            source_language,
            target_languages,
            started_at: self.clock.now(),
            ended_at: None,
            duration_seconds: 0,
            participant_count: request.participant_count,
            peak_participant_count: request.participant_count,
            participant_multiplier: rule.compute(request.participant_count),
            base_cost: 0.0,
            overage: OverageLedger::new(),
            overage_cost: 0.0,
            cost: 0.0,
            allow_language_requests: request.allow_language_requests,
            allow_participant_overage: request.allow_participant_overage,
            free_time_warning_issued: false,
            end_reason: None,
            seconds_before_rollover: 0,
        };
        session.recompute(&rule, self.options.multiplier_basis);

        let session_id = session.id;
        tracing::info!(
            session_id = %session_id,
            user_id = %session.user_id,
            meeting_id = %session.meeting_id,
            tier = session.plan.tier_id().map_or("free", |t| t.as_str()),
            free_limit_seconds = ?session.plan.limit_seconds(),
            targets = ?session.target_languages,
            "session started"
        );

        self.events.push(SessionEvent::Started {
            session_id,
            tier: session.plan.tier_id().cloned(),
            free_limit_seconds: session.plan.limit_seconds(),
        });
        self.current = Some(session);

        Ok(session_id)
    }

    /// Advance the session by one second.
    ///
    /// While paused this is a no-op that returns an empty outcome.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if no session is active or paused.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        let today = self.clock.today();
        let rule = self.catalog.participant_rule();
        let basis = self.options.multiplier_basis;
        let warning_window = self.options.free_warning_seconds;

        self.roll_day(today);
        let session = self.live_session_mut("tick")?;
        if session.status == SessionStatus::Paused {
            return Ok(TickOutcome::default());
        }

        session.duration_seconds += 1;
        if let Some(limit) = session.plan.limit_seconds() {
            session.duration_seconds = session.duration_seconds.min(limit);
        }
        session.recompute(&rule, basis);

        let mut outcome = TickOutcome {
            accrued: true,
            ..TickOutcome::default()
        };

        tracing::trace!(
            session_id = %session.id,
            duration_seconds = session.duration_seconds,
            multiplier = session.participant_multiplier.multiplier,
            base_cost = session.base_cost,
            overage_cost = session.overage_cost,
            cost = session.cost,
            "tick"
        );

        let mut limit_reached = false;
        if let Some(limit) = session.plan.limit_seconds() {
            let remaining = limit.saturating_sub(session.duration_seconds);
            if remaining == 0 {
                limit_reached = true;
            } else if !session.free_time_warning_issued && remaining <= warning_window {
                session.free_time_warning_issued = true;
                outcome.warning_issued = true;
                let session_id = session.id;
                tracing::warn!(
                    session_id = %session_id,
                    remaining_seconds = remaining,
                    "free-tier time almost used up"
                );
                self.events.push(SessionEvent::FreeTimeWarning {
                    session_id,
                    remaining_seconds: remaining,
                });
            }
        }

        if limit_reached {
            outcome.ended = Some(self.finish(EndReason::FreeTierLimitReached)?);
        }

        Ok(outcome)
    }

    /// Pause an active session.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the session is active.
    pub fn pause(&mut self) -> Result<()> {
        let session = self.session_in("pause", SessionStatus::Active)?;
        session.status = SessionStatus::Paused;
        let (session_id, duration_seconds) = (session.id, session.duration_seconds);

        tracing::info!(session_id = %session_id, duration_seconds, "session paused");
        self.events.push(SessionEvent::Paused {
            session_id,
            duration_seconds,
        });
        Ok(())
    }

    /// Resume a paused session.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the session is paused.
    pub fn resume(&mut self) -> Result<()> {
        let session = self.session_in("resume", SessionStatus::Paused)?;
        session.status = SessionStatus::Active;
        let session_id = session.id;

        tracing::info!(session_id = %session_id, "session resumed");
        self.events.push(SessionEvent::Resumed { session_id });
        Ok(())
    }

    /// Stop the session at the host's request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the session is active or paused.
    pub fn stop(&mut self) -> Result<SessionSummary> {
        self.live_session_mut("stop")?;
        self.finish(EndReason::Manual)
    }

    /// Drop an ended session from `current`. Returns whether one was cleared.
    pub fn clear_ended(&mut self) -> bool {
        if self
            .current
            .as_ref()
            .is_some_and(|s| s.status == SessionStatus::Ended)
        {
            self.current = None;
            true
        } else {
            false
        }
    }

    // =========================================================================
    // Languages and participants
    // =========================================================================

    /// Add a caption language to the active session.
    ///
    /// A language that is already present is a no-op reported as
    /// [`LanguageAddition::AlreadyActive`], so a repeated approval never
    /// charges twice.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` unless the session is active.
    /// - `LanguageNotFound` for a blank code.
    /// - `LanguageRequestsDisabled` if requests are turned off.
    /// - `LanguageLimitExceeded` if the plan has no room and no overage.
    pub fn add_language(&mut self, code: &str) -> Result<LanguageAddition> {
        let rule = self.catalog.participant_rule();
        let basis = self.options.multiplier_basis;
        let code = code.trim();

        let session = self.session_in("add a language", SessionStatus::Active)?;
        if code.is_empty() {
            return Err(MeterError::LanguageNotFound { code: code.into() });
        }
        if !session.allow_language_requests {
            return Err(MeterError::LanguageRequestsDisabled);
        }

        let session_id = session.id;
        if session.has_language(code) {
            tracing::warn!(session_id = %session_id, code, "language already active; ignoring");
            self.events.push(SessionEvent::LanguageAlreadyActive {
                session_id,
                code: code.into(),
            });
            return Ok(LanguageAddition::AlreadyActive);
        }

        let limit = session.plan.translation_limit();
        let addition = if session.included_language_count() < limit as usize {
            LanguageAddition::Included
        } else if let Some(rate) = session.plan.overage_rate_per_hour() {
            let at_minutes = session.duration_minutes();
            session.overage.add_language(code, at_minutes, rate)?;
            LanguageAddition::Overage
        } else {
            return Err(MeterError::LanguageLimitExceeded {
                requested: session.target_languages.len() + 1,
                limit,
            });
        };

        session.target_languages.push(code.into());
        session.recompute(&rule, basis);

        let overage = addition == LanguageAddition::Overage;
        tracing::info!(session_id = %session_id, code, overage, "language added");
        self.events.push(SessionEvent::LanguageAdded {
            session_id,
            code: code.into(),
            overage,
        });
        Ok(addition)
    }

    /// Remove a caption language from the active session.
    ///
    /// Overage languages are closed at the current minute and keep their
    /// cost in the ledger.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` unless the session is active.
    /// - `LanguageNotFound` if the language is not a target.
    /// - `NoTargetLanguages` when removing the last target.
    pub fn remove_language(&mut self, code: &str) -> Result<LanguageRemoval> {
        let rule = self.catalog.participant_rule();
        let basis = self.options.multiplier_basis;
        let code = code.trim();

        let session = self.session_in("remove a language", SessionStatus::Active)?;
        let session_id = session.id;

        let removal = if session.overage.is_active(code) {
            let at_minutes = session.duration_minutes();
            let multiplier = session.participant_multiplier.multiplier;
            let entry = session
                .overage
                .remove_language(code, at_minutes, multiplier)?;
            LanguageRemoval::Overage {
                calculated_cost: entry.calculated_cost,
            }
        } else if session.target_languages.iter().any(|l| l == code) {
            if session.target_languages.len() == 1 {
                return Err(MeterError::NoTargetLanguages);
            }
            LanguageRemoval::Included
        } else {
            return Err(MeterError::LanguageNotFound { code: code.into() });
        };

        session.target_languages.retain(|l| l != code);
        session.recompute(&rule, basis);

        let overage_cost = match removal {
            LanguageRemoval::Overage { calculated_cost } => Some(calculated_cost),
            LanguageRemoval::Included => None,
        };
        tracing::info!(session_id = %session_id, code, ?overage_cost, "language removed");
        self.events.push(SessionEvent::LanguageRemoved {
            session_id,
            code: code.into(),
            overage_cost,
        });
        Ok(removal)
    }

    /// Update the live participant count.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` unless the session is active or paused.
    /// - `ParticipantOverageNotAllowed` if the count is above the threshold
    ///   and participant overage is off.
    pub fn set_participant_count(&mut self, count: u32) -> Result<f64> {
        let rule = self.catalog.participant_rule();
        let basis = self.options.multiplier_basis;

        let session = self.live_session_mut("update participants")?;
        if !session.allow_participant_overage && count > rule.base_threshold {
            tracing::warn!(
                session_id = %session.id,
                count,
                threshold = rule.base_threshold,
                "participant overage not allowed"
            );
            return Err(MeterError::ParticipantOverageNotAllowed {
                count,
                threshold: rule.base_threshold,
            });
        }

        session.participant_count = count;
        session.recompute(&rule, basis);
        let multiplier = session.participant_multiplier.multiplier;
        let session_id = session.id;

        tracing::debug!(session_id = %session_id, count, multiplier, "participants changed");
        self.events.push(SessionEvent::ParticipantsChanged {
            session_id,
            participant_count: count,
            multiplier,
        });
        Ok(multiplier)
    }

    /// Turn participant language requests on or off.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the session is active or paused.
    pub fn set_allow_language_requests(&mut self, allow: bool) -> Result<()> {
        self.live_session_mut("change language requests")?
            .allow_language_requests = allow;
        Ok(())
    }

    /// Turn participant overage billing on or off.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the session is active or paused.
    pub fn set_allow_participant_overage(&mut self, allow: bool) -> Result<()> {
        self.live_session_mut("change participant overage")?
            .allow_participant_overage = allow;
        Ok(())
    }

    // =========================================================================
    // Account
    // =========================================================================

    /// Put a payment method on file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` while a session is active or paused.
    pub fn attach_payment_method(&mut self) -> Result<()> {
        self.check_not_live("add a payment method")?;
        self.usage.attach_payment_method();
        Ok(())
    }

    /// Remove the payment method.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` while a session is active or paused.
    pub fn detach_payment_method(&mut self) -> Result<()> {
        self.check_not_live("remove the payment method")?;
        self.usage.detach_payment_method();
        Ok(())
    }

    /// Close the billing period, returning the billed cents.
    pub fn close_billing_period(&mut self) -> i64 {
        self.usage.close_billing_period()
    }

    /// Run the daily reset check outside of a tick.
    pub fn refresh_day(&mut self) -> bool {
        self.roll_day(self.clock.today())
    }

    // =========================================================================
    // Read-only views
    // =========================================================================

    /// Status of the current session, `NotStarted` if there is none.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.current
            .as_ref()
            .map_or(SessionStatus::NotStarted, |s| s.status)
    }

    /// The current session, live or ended-but-not-cleared.
    #[must_use]
    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Snapshot of the current session.
    #[must_use]
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.current.as_ref().map(Session::snapshot)
    }

    /// Summaries of sessions ended by this engine, oldest first.
    #[must_use]
    pub fn history(&self) -> &[SessionSummary] {
        &self.history
    }

    /// The usage ledger.
    #[must_use]
    pub const fn usage(&self) -> &UsageLedger {
        &self.usage
    }

    /// The usage account.
    #[must_use]
    pub const fn account(&self) -> &UsageAccount {
        self.usage.account()
    }

    /// The pricing catalog.
    #[must_use]
    pub fn catalog(&self) -> &PricingCatalog {
        &self.catalog
    }

    /// Take queued events.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn check_owner(&self, context: &HostContext) -> Result<()> {
        let owner = &self.usage.account().user_id;
        if &context.user_id != owner {
            return Err(MeterError::MissingContext(format!(
                "context user {} does not own account {owner}",
                context.user_id
            )));
        }
        Ok(())
    }

    fn resolve_plan(&self, requested: Option<&crate::pricing::TierId>) -> Result<SessionPlan> {
        let account = self.usage.account();
        let tier_id = match requested {
            Some(id) => {
                if account.is_free_tier() {
                    return Err(MeterError::PaymentMethodRequired);
                }
                Some(id)
            }
            None => account.locked_tier(),
        };

        if let Some(id) = tier_id {
            let tier = self.catalog.tier(id.as_str())?.clone();
            if let Some(locked) = account.locked_tier() {
                if locked != &tier.id {
                    return Err(MeterError::TierLocked {
                        locked: locked.to_string(),
                        requested: tier.id.to_string(),
                    });
                }
            }
            return Ok(SessionPlan::Payg { tier });
        }

        if account.payment_method_added() {
            return Err(MeterError::MissingContext(
                "no tier selected for pay-as-you-go session".into(),
            ));
        }

        let limit_seconds = self.usage.daily_free_seconds_remaining();
        if limit_seconds == 0 {
            return Err(MeterError::FreeTierExhausted);
        }
        Ok(SessionPlan::FreeTier {
            limits: self.catalog.free_tier_limits(),
            limit_seconds,
        })
    }

    /// Daily reset. A live session's seconds so far stay with the old day.
    fn roll_day(&mut self, today: NaiveDate) -> bool {
        if !self.usage.reset_if_new_day(today) {
            return false;
        }
        if let Some(session) = self.current.as_mut().filter(|s| s.status.is_live()) {
            session.seconds_before_rollover = session.duration_seconds;
            tracing::info!(
                session_id = %session.id,
                seconds_before_rollover = session.seconds_before_rollover,
                "free-minute day rolled over during session"
            );
        }
        true
    }

    fn check_not_live(&self, action: &'static str) -> Result<()> {
        match self.current.as_ref().filter(|s| s.status.is_live()) {
            Some(session) => Err(MeterError::InvalidTransition {
                from: session.status,
                action,
            }),
            None => Ok(()),
        }
    }

    fn live_session_mut(&mut self, action: &'static str) -> Result<&mut Session> {
        match self.current.as_mut() {
            Some(session) if session.status.is_live() => Ok(session),
            Some(session) => Err(MeterError::InvalidTransition {
                from: session.status,
                action,
            }),
            None => Err(MeterError::InvalidTransition {
                from: SessionStatus::NotStarted,
                action,
            }),
        }
    }

    fn session_in(&mut self, action: &'static str, status: SessionStatus) -> Result<&mut Session> {
        match self.current.as_mut() {
            Some(session) if session.status == status => Ok(session),
            other => Err(MeterError::InvalidTransition {
                from: other.map_or(SessionStatus::NotStarted, |s| s.status),
                action,
            }),
        }
    }

    /// Freeze the live session, close overage, hand usage to the ledger and
    /// archive the summary.
    fn finish(&mut self, reason: EndReason) -> Result<SessionSummary> {
        let rule = self.catalog.participant_rule();
        let basis = self.options.multiplier_basis;
        let now = self.clock.now();
        self.roll_day(self.clock.today());

        let session = self.live_session_mut("stop")?;
        session.recompute(&rule, basis);
        let multiplier = session.participant_multiplier.multiplier;
        let at_minutes = session.duration_minutes();
        let closed = session.overage.close_all_open(at_minutes, multiplier);
        session.recompute(&rule, basis);

        session.status = SessionStatus::Ended;
        session.ended_at = Some(now);
        session.end_reason = Some(reason);

        let summary = session.summary();
        let charge = SessionCharge {
            duration_seconds: summary.duration_seconds,
            cost: summary.cost,
            is_free_tier: summary.is_free_tier,
            seconds_before_rollover: session.seconds_before_rollover,
        };
        self.usage.record_charge(&charge);

        tracing::info!(
            session_id = %summary.session_id,
            user_id = %summary.user_id,
            ?reason,
            duration_seconds = summary.duration_seconds,
            base_cost = summary.base_cost,
            overage_cost = summary.overage_cost,
            cost = summary.cost,
            overage_closed = closed,
            "session ended"
        );

        self.history.push(summary.clone());
        self.events.push(SessionEvent::Ended {
            reason,
            summary: summary.clone(),
        });
        Ok(summary)
    }
}

/// Trim, drop empties, drop the source language and de-duplicate, keeping
/// first occurrences.
fn normalize_targets(source: &str, targets: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(targets.len());
    for target in targets {
        let target = target.trim();
        if target.is_empty() || target == source || out.iter().any(|t| t == target) {
            continue;
        }
        out.push(target.to_string());
    }
    out
}
