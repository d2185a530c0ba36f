//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `UsageStore`
//! trait. Values are CBOR-encoded.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options,
};

use session_meter_core::{SessionId, SessionSummary, UsageAccount, UserId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::UsageStore;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get<T: serde::de::DeserializeOwned>(&self, family: &str, key: &str) -> Result<Option<T>> {
        let cf = self.cf(family)?;
        self.db
            .get_cf(&cf, key.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put<T: serde::Serialize>(&self, family: &str, key: &str, value: &T) -> Result<()> {
        let cf = self.cf(family)?;
        let value = Self::serialize(value)?;
        self.db
            .put_cf(&cf, key.as_bytes(), value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl UsageStore for RocksStore {
    fn put_account(&self, account: &UsageAccount) -> Result<()> {
        self.put(cf::ACCOUNTS, &keys::account_key(&account.user_id), account)
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<UsageAccount>> {
        self.get(cf::ACCOUNTS, &keys::account_key(user_id))
    }

    fn delete_account(&self, user_id: &UserId) -> Result<()> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(user_id);

        if self.get_account(user_id)?.is_none() {
            return Err(StoreError::NotFound);
        }

        self.db
            .delete_cf(&cf, key.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn put_session(&self, summary: &SessionSummary) -> Result<()> {
        let key = keys::session_key(&summary.user_id, &summary.session_id);
        self.put(cf::SESSIONS, &key, summary)
    }

    fn get_session(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
    ) -> Result<Option<SessionSummary>> {
        self.get(cf::SESSIONS, &keys::session_key(user_id, session_id))
    }

    fn list_sessions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SessionSummary>> {
        let cf = self.cf(cf::SESSIONS)?;
        let prefix = keys::user_sessions_prefix(user_id);

        // ULID keys sort by time; collect then walk backwards for newest first.
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix.as_bytes(), Direction::Forward));

        let mut values: Vec<Box<[u8]>> = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            values.push(value);
        }

        values
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .map(|data| Self::deserialize(data))
            .collect()
    }
}
