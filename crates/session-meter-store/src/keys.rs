//! Key encoding shared by the storage backends.
//!
//! Keys are path-like strings. User IDs cannot contain `/`, and session IDs
//! are ULIDs, so a user's sessions sort by creation time under one prefix.

use session_meter_core::{SessionId, UserId};

use crate::error::{Result, StoreError};

const ACCOUNT_PREFIX: &str = "account";
const SESSION_PREFIX: &str = "session";

/// Key of a user's account record: `account/<user_id>`.
#[must_use]
pub fn account_key(user_id: &UserId) -> String {
    format!("{ACCOUNT_PREFIX}/{user_id}")
}

/// Key of an archived session: `session/<user_id>/<session_id>`.
#[must_use]
pub fn session_key(user_id: &UserId, session_id: &SessionId) -> String {
    format!("{SESSION_PREFIX}/{user_id}/{session_id}")
}

/// Prefix covering every session of a user.
#[must_use]
pub fn user_sessions_prefix(user_id: &UserId) -> String {
    format!("{SESSION_PREFIX}/{user_id}/")
}

/// Extract the session ID from a session key.
///
/// # Errors
///
/// Returns `StoreError::Serialization` if the key does not end in a ULID.
pub fn extract_session_id(key: &str) -> Result<SessionId> {
    let tail = key.rsplit('/').next().unwrap_or(key);
    tail.parse()
        .map_err(|e| StoreError::Serialization(format!("bad session key {key}: {e}")))
}
