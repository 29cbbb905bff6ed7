//! CounterConfig - explicit configuration for a CounterStore.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};

use super::CounterId;

/// How the store advances the counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IncrementStrategy {
    /// Native atomic add when the backend has one, conditional writes otherwise.
    #[default]
    Auto,
    /// Always use the read-modify-write loop with conditional writes.
    ConditionalWrite,
}

/// What `increment` does when the counter record is absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Fail with `CounterError::NotFound`. Seeding is a provisioning step.
    #[default]
    Fail,
    /// Seed the record at zero, then increment it.
    AutoSeed,
}

/// Configuration for a [`CounterStore`](super::CounterStore).
#[derive(Debug, Clone)]
pub struct CounterConfig {
    /// Table / namespace the counter lives in. Opaque to the store.
    pub table: String,
    /// Which counter in the table.
    pub counter_id: CounterId,
    /// Bound on every single backend call.
    pub op_timeout: Duration,
    /// Bound on a whole `increment`, across all attempts and backoff.
    pub deadline: Duration,
    /// Maximum read-modify-write attempts before giving up.
    pub max_attempts: u32,
    /// First backoff delay after a lost race.
    pub min_backoff: Duration,
    /// Largest backoff delay.
    pub max_backoff: Duration,
    pub strategy: IncrementStrategy,
    pub missing: MissingPolicy,
}

impl CounterConfig {
    pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(2);
    pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

    /// Defaults for the given table: counter `0`, 2s per call, 5s overall,
    /// 8 attempts, 5-100ms jittered exponential backoff.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            counter_id: CounterId::default(),
            op_timeout: Self::DEFAULT_OP_TIMEOUT,
            deadline: Self::DEFAULT_DEADLINE,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            min_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(100),
            strategy: IncrementStrategy::default(),
            missing: MissingPolicy::default(),
        }
    }

    pub fn with_counter_id(mut self, id: CounterId) -> Self {
        self.counter_id = id;
        self
    }

    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Clamped to at least one attempt.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.min_backoff = min;
        self.max_backoff = max.max(min);
        self
    }

    pub fn with_strategy(mut self, strategy: IncrementStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_missing_policy(mut self, missing: MissingPolicy) -> Self {
        self.missing = missing;
        self
    }

    /// Storage key of the counter record: `"table:id"`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.table, self.counter_id)
    }

    /// Delays to sleep between attempts. Yields one delay per retry.
    pub(crate) fn backoff(&self) -> impl Iterator<Item = Duration> {
        ExponentialBuilder::default()
            .with_min_delay(self.min_backoff)
            .with_max_delay(self.max_backoff)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
            .with_jitter()
            .build()
    }
}
