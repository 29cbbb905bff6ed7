//! CounterBackend - the storage seam the counter is persisted through.

use async_trait::async_trait;

use super::{CounterRecord, StorageError, Versioned};

/// Atomic single-key storage for the counter record.
///
/// Every method is a single atomic step against the backend. Versions are
/// opaque to callers except for equality: a write bumps the version, and
/// [`update`](CounterBackend::update) only applies when the stored version
/// still equals `expected_version`.
#[async_trait]
pub trait CounterBackend: Send + Sync {
    /// Read the record and its current version. Returns None if absent.
    async fn get(&self, key: &str) -> Result<Option<Versioned<CounterRecord>>, StorageError>;

    /// Create the record. Fails with `AlreadyExists` if it is present.
    async fn insert(
        &self,
        key: &str,
        record: CounterRecord,
    ) -> Result<Versioned<CounterRecord>, StorageError>;

    /// Conditional write. Fails with `VersionMismatch` if another writer got
    /// there first; a failed update leaves the stored record untouched.
    async fn update(
        &self,
        key: &str,
        record: CounterRecord,
        expected_version: u64,
    ) -> Result<Versioned<CounterRecord>, StorageError>;

    /// Whether [`atomic_add`](CounterBackend::atomic_add) is available.
    fn supports_atomic_add(&self) -> bool {
        false
    }

    /// Native add-and-return. Fails with `NotFound` if the record is absent.
    async fn atomic_add(
        &self,
        _key: &str,
        _delta: u64,
    ) -> Result<Versioned<CounterRecord>, StorageError> {
        Err(StorageError::Unsupported)
    }
}

#[async_trait]
impl<B: CounterBackend + ?Sized> CounterBackend for std::sync::Arc<B> {
    async fn get(&self, key: &str) -> Result<Option<Versioned<CounterRecord>>, StorageError> {
        (**self).get(key).await
    }

    async fn insert(
        &self,
        key: &str,
        record: CounterRecord,
    ) -> Result<Versioned<CounterRecord>, StorageError> {
        (**self).insert(key, record).await
    }

    async fn update(
        &self,
        key: &str,
        record: CounterRecord,
        expected_version: u64,
    ) -> Result<Versioned<CounterRecord>, StorageError> {
        (**self).update(key, record, expected_version).await
    }

    fn supports_atomic_add(&self) -> bool {
        (**self).supports_atomic_add()
    }

    async fn atomic_add(
        &self,
        key: &str,
        delta: u64,
    ) -> Result<Versioned<CounterRecord>, StorageError> {
        (**self).atomic_add(key, delta).await
    }
}
