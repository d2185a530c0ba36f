//! Events emitted by the session engine.

use serde::{Deserialize, Serialize};

use crate::pricing::TierId;
use crate::session::{EndReason, SessionSummary};
use crate::SessionId;

/// Something the presentation layer may want to react to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum SessionEvent {
    /// A session started.
    Started {
        /// Session ID.
        session_id: SessionId,
        /// Paid tier, `None` on the free tier.
        tier: Option<TierId>,
        /// Free-tier cap in seconds.
        free_limit_seconds: Option<u64>,
    },

    /// The session was paused.
    Paused {
        /// Session ID.
        session_id: SessionId,
        /// Accrued seconds at pause.
        duration_seconds: u64,
    },

    /// The session resumed.
    Resumed {
        /// Session ID.
        session_id: SessionId,
    },

    /// The free-tier allowance is about to run out. Fires once per session.
    FreeTimeWarning {
        /// Session ID.
        session_id: SessionId,
        /// Seconds left before the forced stop.
        remaining_seconds: u64,
    },

    /// A language was added.
    LanguageAdded {
        /// Session ID.
        session_id: SessionId,
        /// Language code.
        code: String,
        /// Whether the language is billed as overage.
        overage: bool,
    },

    /// An add request for a language that is already present was ignored.
    LanguageAlreadyActive {
        /// Session ID.
        session_id: SessionId,
        /// Language code.
        code: String,
    },

    /// A language was removed.
    LanguageRemoved {
        /// Session ID.
        session_id: SessionId,
        /// Language code.
        code: String,
        /// Final cost of the overage entry, if it was one.
        overage_cost: Option<f64>,
    },

    /// The participant count changed.
    ParticipantsChanged {
        /// Session ID.
        session_id: SessionId,
        /// New count.
        participant_count: u32,
        /// Multiplier after the change.
        multiplier: f64,
    },

    /// The session ended.
    Ended {
        /// Why it ended.
        reason: EndReason,
        /// Frozen summary.
        summary: SessionSummary,
    },
}

impl SessionEvent {
    /// Session the event belongs to.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Started { session_id, .. }
            | Self::Paused { session_id, .. }
            | Self::Resumed { session_id }
            | Self::FreeTimeWarning { session_id, .. }
            | Self::LanguageAdded { session_id, .. }
            | Self::LanguageAlreadyActive { session_id, .. }
            | Self::LanguageRemoved { session_id, .. }
            | Self::ParticipantsChanged { session_id, .. } => *session_id,
            Self::Ended { summary, .. } => summary.session_id,
        }
    }

    /// Whether this event ends the session.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended { .. })
    }
}
