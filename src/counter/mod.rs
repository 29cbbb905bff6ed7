//! Counter - a single durable counter with lost-update-free increments.
//!
//! The counter lives in a [`CounterBackend`] as one versioned record. The
//! [`CounterStore`] advances it either through the backend's native atomic
//! add or through a bounded read-modify-write loop guarded by a conditional
//! write on the record version.
//!
//! ## Example
//!
//! ```ignore
//! use atomic_counter::{CounterConfig, CounterStore, InMemoryCounterBackend};
//!
//! let store = CounterStore::new(InMemoryCounterBackend::new(), CounterConfig::new("visitors"));
//! store.initialize().await?;
//! let count = store.increment().await?;
//! assert_eq!(count, 1);
//! ```

mod backend;
mod config;
mod in_memory;
#[cfg(feature = "rocksdb")]
mod rocksdb;
mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of the single logical counter. The deployed counter uses `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterId(pub u64);

impl fmt::Display for CounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The persisted counter record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRecord {
    pub id: CounterId,
    pub count: u64,
}

impl CounterRecord {
    /// A freshly seeded record.
    pub fn zero(id: CounterId) -> Self {
        Self { id, count: 0 }
    }

    /// The record after one more increment. `None` on overflow.
    pub fn incremented(&self, delta: u64) -> Option<Self> {
        self.count.checked_add(delta).map(|count| Self { id: self.id, count })
    }
}

/// A versioned wrapper around stored data for optimistic concurrency control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub data: T,
    pub version: u64,
}

/// Errors reported by a [`CounterBackend`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The conditional write lost a race.
    #[error("version mismatch on {key} (expected {expected}, actual {actual})")]
    VersionMismatch {
        key: String,
        expected: u64,
        actual: u64,
    },
    /// Insert of a record that already exists.
    #[error("record already exists: {key}")]
    AlreadyExists { key: String },
    /// Update or add on a record that does not exist.
    #[error("record not found: {key}")]
    NotFound { key: String },
    /// The backend has no native atomic add.
    #[error("atomic add is not supported by this backend")]
    Unsupported,
    /// Stored bytes could not be encoded or decoded.
    #[error("record codec error: {0}")]
    Codec(String),
    /// I/O failure, poisoned lock, or any other non-retryable backend failure.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by [`CounterStore`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CounterError {
    /// The counter record was never seeded.
    #[error("counter {key} is not initialized")]
    NotFound { key: String },
    /// Competing writers kept winning until the retry bound or deadline ran out.
    #[error("counter {key} is contended: gave up after {attempts} attempts")]
    ConcurrencyConflict { key: String, attempts: u32 },
    /// Backend failure or timeout. The stored value was not changed by this call.
    #[error("storage unavailable for {key}: {reason}")]
    StorageUnavailable { key: String, reason: String },
}

impl CounterError {
    /// Whether the caller may reasonably retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CounterError::ConcurrencyConflict { .. })
    }

    pub(crate) fn unavailable(key: &str, reason: impl fmt::Display) -> Self {
        CounterError::StorageUnavailable {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Encode a record for storage.
pub(crate) fn encode_record<T: Serialize>(record: &T) -> Result<Vec<u8>, StorageError> {
    bitcode::serialize(record).map_err(|e| StorageError::Codec(e.to_string()))
}

/// Decode a stored record.
pub(crate) fn decode_record<T: serde::de::DeserializeOwned>(
    bytes: &[u8],
) -> Result<T, StorageError> {
    bitcode::deserialize(bytes).map_err(|e| StorageError::Codec(e.to_string()))
}

pub use backend::CounterBackend;
pub use config::{CounterConfig, IncrementStrategy, MissingPolicy};
pub use in_memory::InMemoryCounterBackend;
#[cfg(feature = "rocksdb")]
pub use self::rocksdb::RocksDbCounterBackend;
pub use store::CounterStore;
