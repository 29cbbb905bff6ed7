//! CounterStore - lost-update-free increments over a CounterBackend.

use std::future::Future;

use tokio::time::{self, Instant};
use tracing::{debug, info, instrument, warn};

use super::{
    CounterBackend, CounterConfig, CounterError, CounterRecord, IncrementStrategy, MissingPolicy,
    StorageError, Versioned,
};

/// Owns access to the persisted counter.
///
/// Holds no copy of the value between calls: every attempt re-reads the
/// record, so any number of stores (in this process or elsewhere) can share
/// one backend and coordinate purely through its atomicity.
pub struct CounterStore<B> {
    backend: B,
    config: CounterConfig,
    key: String,
}

impl<B: CounterBackend> CounterStore<B> {
    pub fn new(backend: B, config: CounterConfig) -> Self {
        let key = config.key();
        Self {
            backend,
            config,
            key,
        }
    }

    pub fn config(&self) -> &CounterConfig {
        &self.config
    }

    /// Storage key of the counter record.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Seed the counter at zero if it does not exist yet.
    ///
    /// Idempotent: an existing record is left alone and its value returned.
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn initialize(&self) -> Result<u64, CounterError> {
        let deadline = Instant::now() + self.config.deadline;
        self.seed(deadline).await
    }

    /// Read the current value without changing it.
    pub async fn current(&self) -> Result<Option<u64>, CounterError> {
        let deadline = Instant::now() + self.config.op_timeout;
        let record = self.call(deadline, self.backend.get(&self.key)).await?;
        Ok(record.map(|r| r.data.count))
    }

    /// Advance the counter by exactly one and return the new value.
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn increment(&self) -> Result<u64, CounterError> {
        let deadline = Instant::now() + self.config.deadline;

        let native = self.config.strategy == IncrementStrategy::Auto
            && self.backend.supports_atomic_add();

        if native {
            self.increment_native(deadline).await
        } else {
            self.increment_conditional(deadline).await
        }
    }

    async fn increment_native(&self, deadline: Instant) -> Result<u64, CounterError> {
        match self.call(deadline, self.backend.atomic_add(&self.key, 1)).await {
            Ok(added) => Ok(added.data.count),
            Err(CounterError::NotFound { .. }) if self.auto_seeds() => {
                self.seed(deadline).await?;
                let added = self.call(deadline, self.backend.atomic_add(&self.key, 1)).await?;
                Ok(added.data.count)
            }
            Err(e) => Err(e),
        }
    }

    async fn increment_conditional(&self, deadline: Instant) -> Result<u64, CounterError> {
        let mut backoff = self.config.backoff();
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.attempt(deadline).await {
                Ok(Some(count)) => {
                    debug!(count, attempts, "increment applied");
                    return Ok(count);
                }
                Ok(None) => {}
                // Every earlier attempt lost a race; running out of deadline
                // now is contention, not a storage failure.
                Err(CounterError::StorageUnavailable { .. })
                    if attempts > 1 && Instant::now() >= deadline =>
                {
                    return Err(self.exhausted(attempts));
                }
                Err(e) => return Err(e),
            }

            let delay = match backoff.next() {
                Some(delay) => delay,
                None => return Err(self.exhausted(attempts)),
            };

            if Instant::now() + delay >= deadline {
                return Err(self.exhausted(attempts));
            }
            time::sleep(delay).await;
        }
    }

    /// One read-modify-write. `None` means another writer won the race.
    async fn attempt(&self, deadline: Instant) -> Result<Option<u64>, CounterError> {
        let current = self.read(deadline).await?;

        let next = current
            .data
            .incremented(1)
            .ok_or_else(|| CounterError::unavailable(&self.key, "counter would overflow"))?;

        match self
            .backend_call(deadline, self.backend.update(&self.key, next, current.version))
            .await?
        {
            Ok(written) => Ok(Some(written.data.count)),
            Err(StorageError::VersionMismatch { expected, actual, .. }) => {
                debug!(expected, actual, "lost the race, retrying");
                Ok(None)
            }
            Err(e) => Err(self.translate(e)),
        }
    }

    /// Insert-if-absent. Returns the value the record holds afterwards.
    async fn seed(&self, deadline: Instant) -> Result<u64, CounterError> {
        let zero = CounterRecord::zero(self.config.counter_id);

        match self
            .backend_call(deadline, self.backend.insert(&self.key, zero))
            .await?
        {
            Ok(_) => {
                info!(key = %self.key, "counter seeded at zero");
                Ok(0)
            }
            Err(StorageError::AlreadyExists { .. }) => {
                let existing = self.call(deadline, self.backend.get(&self.key)).await?;
                existing.map(|r| r.data.count).ok_or_else(|| {
                    CounterError::unavailable(&self.key, "record vanished after seeding")
                })
            }
            Err(e) => Err(self.translate(e)),
        }
    }

    /// Read the record, seeding it first when the policy allows.
    async fn read(&self, deadline: Instant) -> Result<Versioned<CounterRecord>, CounterError> {
        if let Some(current) = self.call(deadline, self.backend.get(&self.key)).await? {
            return Ok(current);
        }

        if !self.auto_seeds() {
            return Err(CounterError::NotFound {
                key: self.key.clone(),
            });
        }

        self.seed(deadline).await?;
        self.call(deadline, self.backend.get(&self.key))
            .await?
            .ok_or_else(|| CounterError::unavailable(&self.key, "record vanished after seeding"))
    }

    fn auto_seeds(&self) -> bool {
        self.config.missing == MissingPolicy::AutoSeed
    }

    /// Run one backend call under the per-call timeout clipped to `deadline`,
    /// translating every backend error.
    async fn call<T>(
        &self,
        deadline: Instant,
        fut: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, CounterError> {
        self.backend_call(deadline, fut)
            .await?
            .map_err(|e| self.translate(e))
    }

    /// Run one backend call under the per-call timeout clipped to `deadline`.
    /// Only the timeout is translated; backend errors are handed back as-is.
    async fn backend_call<T>(
        &self,
        deadline: Instant,
        fut: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<Result<T, StorageError>, CounterError> {
        let call_deadline = deadline.min(Instant::now() + self.config.op_timeout);

        time::timeout_at(call_deadline, fut).await.map_err(|_| {
            warn!(key = %self.key, "storage call timed out");
            CounterError::unavailable(&self.key, "storage call timed out")
        })
    }

    fn translate(&self, err: StorageError) -> CounterError {
        match err {
            StorageError::NotFound { key } => CounterError::NotFound { key },
            StorageError::VersionMismatch { .. } => CounterError::ConcurrencyConflict {
                key: self.key.clone(),
                attempts: 1,
            },
            other => CounterError::unavailable(&self.key, other),
        }
    }

    fn exhausted(&self, attempts: u32) -> CounterError {
        warn!(key = %self.key, attempts, "giving up on contended counter");
        CounterError::ConcurrencyConflict {
            key: self.key.clone(),
            attempts,
        }
    }
}
