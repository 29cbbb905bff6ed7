//! InMemoryCounterBackend - HashMap-backed counter storage for tests and development.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{decode_record, encode_record, CounterBackend, CounterRecord, StorageError, Versioned};

/// Internal stored representation of a counter record.
struct StoredRecord {
    bytes: Vec<u8>,
    version: u64,
}

/// In-memory counter storage backed by a HashMap.
///
/// Clone-friendly via Arc; clones share the same records, so several
/// [`CounterStore`](super::CounterStore)s built over clones behave like
/// independent service instances against one table.
#[derive(Clone)]
pub struct InMemoryCounterBackend {
    storage: Arc<RwLock<HashMap<String, StoredRecord>>>,
    atomic_add: bool,
}

impl Default for InMemoryCounterBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCounterBackend {
    /// Create a new empty backend with native atomic add enabled.
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
            atomic_add: true,
        }
    }

    /// Hide the native atomic add so callers must use conditional writes.
    pub fn without_atomic_add(mut self) -> Self {
        self.atomic_add = false;
        self
    }

    fn poisoned() -> StorageError {
        StorageError::Unavailable("lock poisoned".into())
    }
}

#[async_trait]
impl CounterBackend for InMemoryCounterBackend {
    async fn get(&self, key: &str) -> Result<Option<Versioned<CounterRecord>>, StorageError> {
        let storage = self.storage.read().map_err(|_| Self::poisoned())?;

        match storage.get(key) {
            Some(stored) => Ok(Some(Versioned {
                data: decode_record(&stored.bytes)?,
                version: stored.version,
            })),
            None => Ok(None),
        }
    }

    async fn insert(
        &self,
        key: &str,
        record: CounterRecord,
    ) -> Result<Versioned<CounterRecord>, StorageError> {
        let bytes = encode_record(&record)?;
        let mut storage = self.storage.write().map_err(|_| Self::poisoned())?;

        if storage.contains_key(key) {
            return Err(StorageError::AlreadyExists {
                key: key.to_string(),
            });
        }

        storage.insert(key.to_string(), StoredRecord { bytes, version: 1 });

        Ok(Versioned {
            data: record,
            version: 1,
        })
    }

    async fn update(
        &self,
        key: &str,
        record: CounterRecord,
        expected_version: u64,
    ) -> Result<Versioned<CounterRecord>, StorageError> {
        let bytes = encode_record(&record)?;
        let mut storage = self.storage.write().map_err(|_| Self::poisoned())?;

        let stored = storage.get_mut(key).ok_or_else(|| StorageError::NotFound {
            key: key.to_string(),
        })?;

        if stored.version != expected_version {
            return Err(StorageError::VersionMismatch {
                key: key.to_string(),
                expected: expected_version,
                actual: stored.version,
            });
        }

        stored.bytes = bytes;
        stored.version += 1;

        Ok(Versioned {
            data: record,
            version: stored.version,
        })
    }

    fn supports_atomic_add(&self) -> bool {
        self.atomic_add
    }

    async fn atomic_add(
        &self,
        key: &str,
        delta: u64,
    ) -> Result<Versioned<CounterRecord>, StorageError> {
        if !self.atomic_add {
            return Err(StorageError::Unsupported);
        }

        let mut storage = self.storage.write().map_err(|_| Self::poisoned())?;

        let stored = storage.get_mut(key).ok_or_else(|| StorageError::NotFound {
            key: key.to_string(),
        })?;

        let current: CounterRecord = decode_record(&stored.bytes)?;
        let next = current
            .incremented(delta)
            .ok_or_else(|| StorageError::Unavailable(format!("counter {} overflowed", key)))?;

        stored.bytes = encode_record(&next)?;
        stored.version += 1;

        Ok(Versioned {
            data: next,
            version: stored.version,
        })
    }
}
