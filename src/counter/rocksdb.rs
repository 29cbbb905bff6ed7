//! RocksDbCounterBackend - durable counter storage on an optimistic-transaction RocksDB.
//!
//! Requires the `rocksdb` feature. Records are stored as bitcode-encoded
//! `{ record, version }` values; conditional writes run inside an optimistic
//! transaction so a racing writer makes the commit fail with `Busy`, which is
//! reported as a version mismatch.
//!
//! Blocking work runs on `spawn_blocking`. If the caller stops waiting (its
//! timeout fired), the transaction is rolled back instead of committed; only
//! a commit already in flight at that moment can still land.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ::rocksdb::{ErrorKind, OptimisticTransactionDB};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{decode_record, encode_record, CounterBackend, CounterRecord, StorageError, Versioned};

/// Commit retries for a native add that keeps hitting `Busy`.
const ATOMIC_ADD_RETRIES: usize = 16;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct StoredRecord {
    record: CounterRecord,
    version: u64,
}

impl From<StoredRecord> for Versioned<CounterRecord> {
    fn from(stored: StoredRecord) -> Self {
        Versioned {
            data: stored.record,
            version: stored.version,
        }
    }
}

/// Durable counter backend over a RocksDB optimistic transaction database.
#[derive(Clone)]
pub struct RocksDbCounterBackend {
    db: Arc<OptimisticTransactionDB>,
}

impl RocksDbCounterBackend {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = OptimisticTransactionDB::open_default(path).map_err(unavailable)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Wrap an already opened database.
    pub fn new(db: Arc<OptimisticTransactionDB>) -> Self {
        Self { db }
    }

    /// Run a blocking RocksDB operation off the async runtime.
    ///
    /// `op` receives a flag that is raised once the returned future is
    /// dropped; it must check [`still_wanted`] right before committing.
    async fn blocking<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&OptimisticTransactionDB, &AtomicBool) -> Result<T, StorageError>
            + Send
            + 'static,
    {
        let db = Arc::clone(&self.db);
        let abandoned = AbandonOnDrop(Arc::new(AtomicBool::new(false)));
        let flag = Arc::clone(&abandoned.0);

        tokio::task::spawn_blocking(move || op(&db, &flag))
            .await
            .map_err(|e| StorageError::Unavailable(format!("rocksdb task failed: {}", e)))?
    }
}

/// Raises the shared flag when the waiting future goes away.
struct AbandonOnDrop(Arc<AtomicBool>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Fails if nobody waits for the result anymore, so the caller's timeout
/// never coexists with a committed write.
fn still_wanted(abandoned: &AtomicBool, key: &str) -> Result<(), StorageError> {
    if abandoned.load(Ordering::SeqCst) {
        debug!(key = %key, "caller gave up, rolling back");
        return Err(StorageError::Unavailable(format!(
            "call on {} abandoned before commit",
            key
        )));
    }
    Ok(())
}

/// Version currently stored under `key`, 0 if absent.
fn stored_version(db: &OptimisticTransactionDB, key: &str) -> Result<u64, StorageError> {
    Ok(read_stored(db.get(key.as_bytes()).map_err(unavailable)?)?
        .map(|s| s.version)
        .unwrap_or(0))
}

/// Optimistic commit rejected because another transaction wrote the key.
fn is_conflict(err: &::rocksdb::Error) -> bool {
    matches!(err.kind(), ErrorKind::Busy | ErrorKind::TryAgain)
}

fn unavailable(err: ::rocksdb::Error) -> StorageError {
    StorageError::Unavailable(err.to_string())
}

fn read_stored(bytes: Option<Vec<u8>>) -> Result<Option<StoredRecord>, StorageError> {
    bytes.map(|b| decode_record::<StoredRecord>(&b)).transpose()
}

#[async_trait]
impl CounterBackend for RocksDbCounterBackend {
    async fn get(&self, key: &str) -> Result<Option<Versioned<CounterRecord>>, StorageError> {
        let key = key.to_string();
        self.blocking(move |db, _| {
            let stored = read_stored(db.get(key.as_bytes()).map_err(unavailable)?)?;
            Ok(stored.map(Versioned::from))
        })
        .await
    }

    async fn insert(
        &self,
        key: &str,
        record: CounterRecord,
    ) -> Result<Versioned<CounterRecord>, StorageError> {
        let key = key.to_string();
        self.blocking(move |db, abandoned| insert_record(db, abandoned, key, record))
            .await
    }

    async fn update(
        &self,
        key: &str,
        record: CounterRecord,
        expected_version: u64,
    ) -> Result<Versioned<CounterRecord>, StorageError> {
        let key = key.to_string();
        self.blocking(move |db, abandoned| {
            conditional_update(db, abandoned, key, record, expected_version)
        })
        .await
    }

    fn supports_atomic_add(&self) -> bool {
        true
    }

    async fn atomic_add(
        &self,
        key: &str,
        delta: u64,
    ) -> Result<Versioned<CounterRecord>, StorageError> {
        let key = key.to_string();
        self.blocking(move |db, abandoned| add_and_commit(db, abandoned, key, delta))
            .await
    }
}

fn insert_record(
    db: &OptimisticTransactionDB,
    abandoned: &AtomicBool,
    key: String,
    record: CounterRecord,
) -> Result<Versioned<CounterRecord>, StorageError> {
    let txn = db.transaction();
    let existing = txn.get_for_update(key.as_bytes(), true).map_err(unavailable)?;
    if existing.is_some() {
        return Err(StorageError::AlreadyExists { key });
    }

    let stored = StoredRecord { record, version: 1 };
    txn.put(key.as_bytes(), encode_record(&stored)?)
        .map_err(unavailable)?;

    still_wanted(abandoned, &key)?;
    match txn.commit() {
        Ok(()) => Ok(stored.into()),
        // Another seeder committed first.
        Err(e) if is_conflict(&e) => Err(StorageError::AlreadyExists { key }),
        Err(e) => Err(unavailable(e)),
    }
}

fn conditional_update(
    db: &OptimisticTransactionDB,
    abandoned: &AtomicBool,
    key: String,
    record: CounterRecord,
    expected_version: u64,
) -> Result<Versioned<CounterRecord>, StorageError> {
    let txn = db.transaction();
    let current = read_stored(txn.get_for_update(key.as_bytes(), true).map_err(unavailable)?)?
        .ok_or_else(|| StorageError::NotFound { key: key.clone() })?;

    if current.version != expected_version {
        return Err(StorageError::VersionMismatch {
            key,
            expected: expected_version,
            actual: current.version,
        });
    }

    let stored = StoredRecord {
        record,
        version: current.version + 1,
    };
    txn.put(key.as_bytes(), encode_record(&stored)?)
        .map_err(unavailable)?;

    still_wanted(abandoned, &key)?;
    match txn.commit() {
        Ok(()) => Ok(stored.into()),
        Err(e) if is_conflict(&e) => {
            let actual = stored_version(db, &key)?;
            debug!(key = %key, expected_version, actual, "optimistic commit conflict");
            Err(StorageError::VersionMismatch {
                key,
                expected: expected_version,
                actual,
            })
        }
        Err(e) => Err(unavailable(e)),
    }
}

fn add_and_commit(
    db: &OptimisticTransactionDB,
    abandoned: &AtomicBool,
    key: String,
    delta: u64,
) -> Result<Versioned<CounterRecord>, StorageError> {
    for _ in 0..ATOMIC_ADD_RETRIES {
        let txn = db.transaction();
        let current = read_stored(txn.get_for_update(key.as_bytes(), true).map_err(unavailable)?)?
            .ok_or_else(|| StorageError::NotFound { key: key.clone() })?;

        let record = current
            .record
            .incremented(delta)
            .ok_or_else(|| StorageError::Unavailable(format!("counter {} overflowed", key)))?;
        let stored = StoredRecord {
            record,
            version: current.version + 1,
        };
        txn.put(key.as_bytes(), encode_record(&stored)?)
            .map_err(unavailable)?;

        still_wanted(abandoned, &key)?;
        match txn.commit() {
            Ok(()) => return Ok(stored.into()),
            Err(e) if is_conflict(&e) => continue,
            Err(e) => return Err(unavailable(e)),
        }
    }

    Err(StorageError::Unavailable(format!(
        "atomic add on {} kept conflicting",
        key
    )))
}
