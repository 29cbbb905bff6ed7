//! Fault-injecting backends for exercising the increment protocol.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use atomic_counter::{
    CounterBackend, CounterConfig, CounterId, CounterRecord, CounterStore, InMemoryCounterBackend,
    StorageError, Versioned,
};
use tokio::sync::Barrier;

pub const TABLE: &str = "visitors";
pub const KEY: &str = "visitors:0";

/// Config with tight backoff so contention tests stay fast.
pub fn config() -> CounterConfig {
    CounterConfig::new(TABLE)
        .with_backoff(Duration::from_millis(1), Duration::from_millis(4))
        .with_deadline(Duration::from_secs(10))
}

/// A backend holding `count` with no native add, so every increment goes
/// through conditional writes.
pub async fn seeded(count: u64) -> InMemoryCounterBackend {
    let backend = InMemoryCounterBackend::new().without_atomic_add();
    backend
        .insert(
            KEY,
            CounterRecord {
                id: CounterId(0),
                count,
            },
        )
        .await
        .unwrap();
    backend
}

/// Makes the first `round` reads wait for each other after reading, so they
/// all observe the same version and all but one of their writes must lose.
pub struct RacingBackend<B> {
    inner: B,
    barrier: Barrier,
    round: usize,
    gets: AtomicUsize,
    conflicts: AtomicUsize,
}

impl<B> RacingBackend<B> {
    pub fn new(inner: B, round: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(round),
            round,
            gets: AtomicUsize::new(0),
            conflicts: AtomicUsize::new(0),
        }
    }

    pub fn conflicts(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<B: CounterBackend> CounterBackend for RacingBackend<B> {
    async fn get(&self, key: &str) -> Result<Option<Versioned<CounterRecord>>, StorageError> {
        let read = self.inner.get(key).await;
        if self.gets.fetch_add(1, Ordering::SeqCst) < self.round {
            self.barrier.wait().await;
        }
        read
    }

    async fn insert(
        &self,
        key: &str,
        record: CounterRecord,
    ) -> Result<Versioned<CounterRecord>, StorageError> {
        self.inner.insert(key, record).await
    }

    async fn update(
        &self,
        key: &str,
        record: CounterRecord,
        expected_version: u64,
    ) -> Result<Versioned<CounterRecord>, StorageError> {
        let result = self.inner.update(key, record, expected_version).await;
        if matches!(result, Err(StorageError::VersionMismatch { .. })) {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

/// Every conditional write loses, as if an endless stream of writers beat us.
#[derive(Default)]
pub struct AlwaysConflictBackend {
    pub gets: AtomicUsize,
    pub updates: AtomicUsize,
    /// Added to every read.
    pub read_delay: Duration,
}

impl AlwaysConflictBackend {
    pub fn with_read_delay(read_delay: Duration) -> Self {
        Self {
            read_delay,
            ..Self::default()
        }
    }
}

#[async_trait]
impl CounterBackend for AlwaysConflictBackend {
    async fn get(&self, _key: &str) -> Result<Option<Versioned<CounterRecord>>, StorageError> {
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
        let n = self.gets.fetch_add(1, Ordering::SeqCst) as u64;
        Ok(Some(Versioned {
            data: CounterRecord {
                id: CounterId(0),
                count: n,
            },
            version: n + 1,
        }))
    }

    async fn insert(
        &self,
        key: &str,
        _record: CounterRecord,
    ) -> Result<Versioned<CounterRecord>, StorageError> {
        Err(StorageError::AlreadyExists {
            key: key.to_string(),
        })
    }

    async fn update(
        &self,
        key: &str,
        _record: CounterRecord,
        expected_version: u64,
    ) -> Result<Versioned<CounterRecord>, StorageError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::VersionMismatch {
            key: key.to_string(),
            expected: expected_version,
            actual: expected_version + 1,
        })
    }
}

/// Delays every conditional write before handing it to the inner backend.
pub struct SlowWriteBackend<B> {
    pub inner: B,
    pub delay: Duration,
}

#[async_trait]
impl<B: CounterBackend> CounterBackend for SlowWriteBackend<B> {
    async fn get(&self, key: &str) -> Result<Option<Versioned<CounterRecord>>, StorageError> {
        self.inner.get(key).await
    }

    async fn insert(
        &self,
        key: &str,
        record: CounterRecord,
    ) -> Result<Versioned<CounterRecord>, StorageError> {
        self.inner.insert(key, record).await
    }

    async fn update(
        &self,
        key: &str,
        record: CounterRecord,
        expected_version: u64,
    ) -> Result<Versioned<CounterRecord>, StorageError> {
        tokio::time::sleep(self.delay).await;
        self.inner.update(key, record, expected_version).await
    }
}

/// A backend whose every call fails with an I/O-style error.
pub struct BrokenBackend;

#[async_trait]
impl CounterBackend for BrokenBackend {
    async fn get(&self, _key: &str) -> Result<Option<Versioned<CounterRecord>>, StorageError> {
        Err(StorageError::Unavailable("connection refused (10.0.0.7:8000)".into()))
    }

    async fn insert(
        &self,
        _key: &str,
        _record: CounterRecord,
    ) -> Result<Versioned<CounterRecord>, StorageError> {
        Err(StorageError::Unavailable("connection refused (10.0.0.7:8000)".into()))
    }

    async fn update(
        &self,
        _key: &str,
        _record: CounterRecord,
        _expected_version: u64,
    ) -> Result<Versioned<CounterRecord>, StorageError> {
        Err(StorageError::Unavailable("connection refused (10.0.0.7:8000)".into()))
    }
}

/// `n` independent stores over one shared backend, like `n` service instances.
pub fn instances<B: CounterBackend + Clone>(
    backend: &B,
    config: &CounterConfig,
    n: usize,
) -> Vec<Arc<CounterStore<B>>> {
    (0..n)
        .map(|_| Arc::new(CounterStore::new(backend.clone(), config.clone())))
        .collect()
}
