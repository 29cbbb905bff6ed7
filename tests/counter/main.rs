//! CounterStore integration tests: contention, failures, initialization.

mod support;
mod concurrency;
mod initialization;
