//! Error types for session-meter.

use crate::ids::IdError;
use crate::session::SessionStatus;

/// Result type for session-meter operations.
pub type Result<T> = std::result::Result<T, MeterError>;

/// Errors that can occur in session accounting operations.
///
/// All variants are local and recoverable. The free-tier cap is not an
/// error: it ends the session with [`crate::EndReason::FreeTierLimitReached`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeterError {
    /// Host identity or account context is unavailable.
    #[error("missing context: {0}")]
    MissingContext(String),

    /// State machine misuse (e.g. pausing an ended session).
    #[error("invalid transition: cannot {action} while {from}")]
    InvalidTransition {
        /// Status the session was in.
        from: SessionStatus,
        /// The attempted operation.
        action: &'static str,
    },

    /// A live session already exists for this engine.
    #[error("session already active: {session_id}")]
    SessionAlreadyActive {
        /// The live session ID.
        session_id: String,
    },

    /// The language already has an open overage entry.
    #[error("duplicate language: {code}")]
    DuplicateLanguage {
        /// The language code.
        code: String,
    },

    /// The language is not active in the session.
    #[error("language not found: {code}")]
    LanguageNotFound {
        /// The language code.
        code: String,
    },

    /// Pricing configuration error (unknown tier id, invalid table).
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A session needs at least one target language.
    #[error("at least one target language is required")]
    NoTargetLanguages,

    /// The plan does not include this many translation languages.
    #[error("language limit exceeded: {requested} requested, {limit} included")]
    LanguageLimitExceeded {
        /// Number of translation languages requested.
        requested: usize,
        /// Number of translation languages the plan includes.
        limit: u32,
    },

    /// Participants may not request languages in this session.
    #[error("language requests are disabled for this session")]
    LanguageRequestsDisabled,

    /// The host has not allowed billing for participants above the threshold.
    #[error("participant overage not allowed: {count} participants, threshold {threshold}")]
    ParticipantOverageNotAllowed {
        /// Requested participant count.
        count: u32,
        /// Participant count covered by the base rate.
        threshold: u32,
    },

    /// Pay-as-you-go sessions require a payment method on file.
    #[error("a payment method is required for pay-as-you-go sessions")]
    PaymentMethodRequired,

    /// The billing period is locked to a different tier.
    #[error("tier locked to {locked} for the current billing period (requested {requested})")]
    TierLocked {
        /// Tier locked for the period.
        locked: String,
        /// Tier that was requested.
        requested: String,
    },

    /// No free minutes remain today.
    #[error("daily free minutes exhausted")]
    FreeTierExhausted,

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
