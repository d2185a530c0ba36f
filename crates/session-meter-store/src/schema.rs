//! Column families used by the `RocksDB` backend.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Usage accounts, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Archived session summaries, keyed by `session/<user_id>/<session_id>`.
    pub const SESSIONS: &str = "sessions";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::ACCOUNTS, cf::SESSIONS]
}
