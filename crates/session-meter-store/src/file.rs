//! JSON file storage.
//!
//! Each key maps to `<root>/<key>.json`. Writes go to a temporary sibling
//! first and are renamed into place, so a crash never leaves a torn record.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use session_meter_core::{SessionId, SessionSummary, UsageAccount, UserId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::UsageStore;

/// A [`UsageStore`] that keeps one JSON document per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open or create a store rooted at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        tracing::debug!(root = %root.display(), "file store opened");
        Ok(Self { root })
    }

    /// Directory the store writes under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match fs::read(self.path_for(key)) {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Session IDs stored for a user, newest first.
    fn session_ids(&self, user_id: &UserId) -> Result<Vec<SessionId>> {
        let dir = self.root.join(keys::user_sessions_prefix(user_id));
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match keys::extract_session_id(stem) {
                Ok(id) => ids.push(id),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping stray file"),
            }
        }
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids)
    }
}

impl UsageStore for FileStore {
    fn put_account(&self, account: &UsageAccount) -> Result<()> {
        self.write_json(&keys::account_key(&account.user_id), account)
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<UsageAccount>> {
        self.read_json(&keys::account_key(user_id))
    }

    fn delete_account(&self, user_id: &UserId) -> Result<()> {
        match fs::remove_file(self.path_for(&keys::account_key(user_id))) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    fn put_session(&self, summary: &SessionSummary) -> Result<()> {
        let key = keys::session_key(&summary.user_id, &summary.session_id);
        self.write_json(&key, summary)
    }

    fn get_session(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
    ) -> Result<Option<SessionSummary>> {
        self.read_json(&keys::session_key(user_id, session_id))
    }

    fn list_sessions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SessionSummary>> {
        let mut sessions = Vec::new();
        for id in self.session_ids(user_id)?.into_iter().skip(offset).take(limit) {
            if let Some(summary) = self.get_session(user_id, &id)? {
                sessions.push(summary);
            }
        }
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_records_read_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let user = UserId::new("nobody").unwrap();

        assert!(store.get_account(&user).unwrap().is_none());
        assert!(store.list_sessions(&user, 10, 0).unwrap().is_empty());
        assert!(matches!(
            store.delete_account(&user),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn corrupt_record_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let user = UserId::new("alice").unwrap();

        let path = store.path_for(&keys::account_key(&user));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{not json").unwrap();

        assert!(matches!(
            store.get_account(&user),
            Err(StoreError::Serialization(_))
        ));
    }
}
