//! Core accounting for live translated meeting sessions.
//!
//! This crate holds the pure domain logic of session-meter:
//!
//! - **Identifiers**: `UserId`, `MeetingId`, `SessionId`
//! - **Pricing**: `PricingCatalog`, `Tier`, `FreeTierLimits`
//! - **Multiplier**: `ParticipantRule`, `ParticipantMultiplier`
//! - **Overage**: `OverageLedger`, `OverageLanguage`
//! - **Accounts**: `UsageAccount`, `UsageLedger`
//! - **Sessions**: `Session`, `SessionEngine`, `SessionEvent`
//!
//! Nothing here does I/O or spawns tasks. The engine is advanced by calling
//! [`SessionEngine::tick`] once per elapsed second; the runtime crate drives
//! it from a timer.
//!
//! # Cost model
//!
//! ```text
//! base_cost    = rate_per_hour * hours * multiplier
//! overage_cost = sum(overage_rate_per_hour * active_minutes / 60 * multiplier)
//! cost         = base_cost + overage_cost
//! ```
//!
//! Session costs are `f64` dollars. Unpaid pay-as-you-go usage is carried
//! on the account as `i64` cents.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod clock;
pub mod engine;
pub mod error;
pub mod events;
pub mod ids;
pub mod multiplier;
pub mod overage;
pub mod pricing;
pub mod session;
pub mod usage;

pub use account::{AccountMode, UsageAccount};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    EngineOptions, LanguageAddition, LanguageRemoval, SessionEngine, TickOutcome,
    DEFAULT_FREE_WARNING_SECONDS,
};
pub use error::{MeterError, Result};
pub use events::SessionEvent;
pub use ids::{IdError, MeetingId, SessionId, UserId};
pub use multiplier::{
    ParticipantMultiplier, ParticipantRule, DEFAULT_BASE_THRESHOLD, DEFAULT_INCREMENT_RATE,
    DEFAULT_INCREMENT_SIZE,
};
pub use overage::{OverageLanguage, OverageLedger};
pub use pricing::{
    format_duration, CurrencySettings, FreeTierLimits, PricingCatalog, Tier, TierId,
    FREE_TIER_DAILY_MINUTES, FREE_TIER_TRANSLATION_LIMIT,
};
pub use session::{
    EndReason, HostContext, MultiplierBasis, Session, SessionPlan, SessionRequest,
    SessionSnapshot, SessionStatus, SessionSummary, UserRole,
};
pub use usage::{SessionCharge, UsageLedger};
