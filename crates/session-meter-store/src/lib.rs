//! Storage layer for session-meter.
//!
//! Persists the cross-session [`UsageAccount`] and the summaries of ended
//! sessions. Three backends implement [`UsageStore`]:
//!
//! - [`MemoryStore`]: in-process maps, for tests and simulations
//! - [`FileStore`]: one JSON document per key under a data directory
//! - `RocksStore`: `RocksDB` column families with CBOR values (feature
//!   `rocksdb-backend`)
//!
//! # Keys
//!
//! - `account/<user_id>`: the usage account
//! - `session/<user_id>/<session_id>`: an archived session summary
//!
//! # Example
//!
//! ```no_run
//! use chrono::Local;
//! use session_meter_core::{UsageAccount, UserId};
//! use session_meter_store::{FileStore, UsageStore};
//!
//! let store = FileStore::open("/tmp/session-meter").unwrap();
//!
//! let user_id: UserId = "host-1".parse().unwrap();
//! let account = UsageAccount::new(user_id.clone(), Local::now().date_naive());
//! store.put_account(&account).unwrap();
//!
//! let retrieved = store.get_account(&user_id).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod file;
pub mod keys;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use session_meter_core::{SessionId, SessionSummary, UsageAccount, UserId};

/// The storage trait defining all persistence operations.
///
/// This trait abstracts the storage layer so the runtime can run against a
/// file, `RocksDB` or in-memory backend.
pub trait UsageStore: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Insert or update an account record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_account(&self, account: &UsageAccount) -> Result<()>;

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<UsageAccount>>;

    /// Delete an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn delete_account(&self, user_id: &UserId) -> Result<()>;

    // =========================================================================
    // Session Archive
    // =========================================================================

    /// Archive the summary of an ended session.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_session(&self, summary: &SessionSummary) -> Result<()>;

    /// Get an archived session.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn get_session(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
    ) -> Result<Option<SessionSummary>>;

    /// List a user's archived sessions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn list_sessions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SessionSummary>>;
}
