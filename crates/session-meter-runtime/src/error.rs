//! Runtime error types.

use session_meter_core::MeterError;
use session_meter_store::StoreError;

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors returned by the session actor and its configuration.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The engine refused the operation.
    #[error(transparent)]
    Meter(#[from] MeterError),

    /// Persistence failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The actor task is gone.
    #[error("session actor closed")]
    ActorClosed,

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl RuntimeError {
    /// The engine error, if this is one.
    #[must_use]
    pub const fn as_meter(&self) -> Option<&MeterError> {
        match self {
            Self::Meter(err) => Some(err),
            _ => None,
        }
    }
}
