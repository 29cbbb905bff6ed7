pub mod counter;
pub mod handler;

pub use counter::{
    CounterBackend, CounterConfig, CounterError, CounterId, CounterRecord, CounterStore,
    InMemoryCounterBackend, IncrementStrategy, MissingPolicy, StorageError, Versioned,
};
#[cfg(feature = "rocksdb")]
pub use counter::RocksDbCounterBackend;
pub use handler::{CounterHandler, Invocation, ResponseEnvelope};
