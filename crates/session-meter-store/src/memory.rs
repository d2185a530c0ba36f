//! In-memory storage.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use session_meter_core::{SessionId, SessionSummary, UsageAccount, UserId};

use crate::error::{Result, StoreError};
use crate::UsageStore;

/// A [`UsageStore`] backed by process memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<UserId, UsageAccount>>,
    sessions: RwLock<BTreeMap<(UserId, SessionId), SessionSummary>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
        lock.read()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }

    fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
        lock.write()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }
}

impl UsageStore for MemoryStore {
    fn put_account(&self, account: &UsageAccount) -> Result<()> {
        Self::write(&self.accounts)?.insert(account.user_id.clone(), account.clone());
        Ok(())
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<UsageAccount>> {
        Ok(Self::read(&self.accounts)?.get(user_id).cloned())
    }

    fn delete_account(&self, user_id: &UserId) -> Result<()> {
        Self::write(&self.accounts)?
            .remove(user_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    fn put_session(&self, summary: &SessionSummary) -> Result<()> {
        Self::write(&self.sessions)?.insert(
            (summary.user_id.clone(), summary.session_id),
            summary.clone(),
        );
        Ok(())
    }

    fn get_session(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
    ) -> Result<Option<SessionSummary>> {
        Ok(Self::read(&self.sessions)?
            .get(&(user_id.clone(), *session_id))
            .cloned())
    }

    fn list_sessions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SessionSummary>> {
        let sessions = Self::read(&self.sessions)?;
        Ok(sessions
            .iter()
            .rev()
            .filter(|((owner, _), _)| owner == user_id)
            .skip(offset)
            .take(limit)
            .map(|(_, summary)| summary.clone())
            .collect())
    }
}
