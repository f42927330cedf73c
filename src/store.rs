//! Storage abstraction for the shared lease record.
//!
//! The engine never talks to a network directly; everything goes through the
//! `LeaseStore` trait. Correctness rests entirely on the store backing
//! `update` with a linearizable compare-and-swap on the version token.

use crate::record::{LeaseKey, LeaseRecord, Version};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Error type for lease store operations.
///
/// `Conflict` is an expected protocol outcome ("another candidate wrote
/// first"), never fatal. `Transient` covers timeouts, connection failures,
/// and permission hiccups; it is retried on the next tick. `Corrupt` means
/// the record is present but malformed, which the engine must surface rather
/// than overwrite.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("lease record not found")]
    NotFound,
    #[error("lease record already exists")]
    AlreadyExists,
    #[error("version conflict: record changed since last read")]
    Conflict,
    #[error("transient store error: {0}")]
    Transient(String),
    #[error("corrupt lease record: {0}")]
    Corrupt(String),
}

/// Atomic get/create/update access to a versioned lease record.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Reads the record and its current version token.
    async fn get(&self, key: &LeaseKey) -> Result<(LeaseRecord, Version), StoreError>;

    /// Creates the record if absent, returning the initial version.
    async fn create(&self, key: &LeaseKey, record: LeaseRecord) -> Result<Version, StoreError>;

    /// Replaces the record iff the stored version still equals `expected`.
    async fn update(
        &self,
        key: &LeaseKey,
        record: LeaseRecord,
        expected: &Version,
    ) -> Result<Version, StoreError>;
}

#[async_trait]
impl<S: LeaseStore + ?Sized> LeaseStore for Arc<S> {
    async fn get(&self, key: &LeaseKey) -> Result<(LeaseRecord, Version), StoreError> {
        (**self).get(key).await
    }

    async fn create(&self, key: &LeaseKey, record: LeaseRecord) -> Result<Version, StoreError> {
        (**self).create(key, record).await
    }

    async fn update(
        &self,
        key: &LeaseKey,
        record: LeaseRecord,
        expected: &Version,
    ) -> Result<Version, StoreError> {
        (**self).update(key, record, expected).await
    }
}

/// In-process, linearizable reference store.
///
/// Versions are a per-key monotonically increasing counter rendered as an
/// opaque token. Cloning shares the underlying map, so multiple candidate
/// engines can contend against the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<LeaseKey, StoredLease>>>,
}

#[derive(Debug)]
struct StoredLease {
    record: LeaseRecord,
    counter: u64,
}

impl StoredLease {
    fn version(&self) -> Version {
        Version::new(self.counter.to_string())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseStore for MemoryStore {
    async fn get(&self, key: &LeaseKey) -> Result<(LeaseRecord, Version), StoreError> {
        let map = self.inner.lock().unwrap();
        map.get(key)
            .map(|stored| (stored.record.clone(), stored.version()))
            .ok_or(StoreError::NotFound)
    }

    async fn create(&self, key: &LeaseKey, record: LeaseRecord) -> Result<Version, StoreError> {
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(key) {
            return Err(StoreError::AlreadyExists);
        }
        let stored = StoredLease { record, counter: 1 };
        let version = stored.version();
        map.insert(key.clone(), stored);
        Ok(version)
    }

    async fn update(
        &self,
        key: &LeaseKey,
        record: LeaseRecord,
        expected: &Version,
    ) -> Result<Version, StoreError> {
        let mut map = self.inner.lock().unwrap();
        let stored = map.get_mut(key).ok_or(StoreError::NotFound)?;
        if &stored.version() != expected {
            return Err(StoreError::Conflict);
        }
        stored.record = record;
        stored.counter += 1;
        Ok(stored.version())
    }
}
