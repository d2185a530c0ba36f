//! Async driver for session-meter.
//!
//! Wraps a [`session_meter_core::SessionEngine`] in a tokio actor that ticks
//! it once per second while a session is active, publishes snapshots and
//! events, and persists the usage account through a
//! [`session_meter_store::UsageStore`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use session_meter_core::{SystemClock, UserId};
//! use session_meter_runtime::{MeterConfig, SessionActor};
//! use session_meter_store::MemoryStore;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MeterConfig::from_env();
//! let catalog = Arc::new(config.load_pricing()?);
//! let user_id: UserId = "host-1".parse()?;
//!
//! let (handle, _task) = SessionActor::spawn(
//!     &config,
//!     catalog,
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(SystemClock),
//!     user_id,
//! )?;
//! let mut events = handle.subscribe();
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod actor;
pub mod config;
pub mod error;

pub use actor::{SessionActor, SessionHandle};
pub use config::MeterConfig;
pub use error::{Result, RuntimeError};
