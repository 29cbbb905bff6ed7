use futures::future::join_all;

use atomic_counter::{CounterError, CounterStore, InMemoryCounterBackend, MissingPolicy};

use crate::support::{self, KEY};

#[tokio::test]
async fn missing_counter_is_not_found() {
    let backend = InMemoryCounterBackend::new().without_atomic_add();
    let store = CounterStore::new(backend, support::config());

    assert_eq!(
        store.increment().await.unwrap_err(),
        CounterError::NotFound { key: KEY.into() }
    );
    // Failing does not create the record.
    assert_eq!(store.current().await.unwrap(), None);
}

#[tokio::test]
async fn auto_seed_yields_one_and_creates_record() {
    let store = CounterStore::new(
        InMemoryCounterBackend::new().without_atomic_add(),
        support::config().with_missing_policy(MissingPolicy::AutoSeed),
    );

    assert_eq!(store.increment().await.unwrap(), 1);
    assert_eq!(store.current().await.unwrap(), Some(1));
}

#[tokio::test]
async fn initialize_twice_keeps_nonzero_value() {
    let store = CounterStore::new(InMemoryCounterBackend::new(), support::config());

    assert_eq!(store.initialize().await.unwrap(), 0);
    for _ in 0..3 {
        store.increment().await.unwrap();
    }

    assert_eq!(store.initialize().await.unwrap(), 3);
    assert_eq!(store.increment().await.unwrap(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_seeders_agree_on_zero() {
    let backend = InMemoryCounterBackend::new();
    let stores = support::instances(&backend, &support::config(), 8);

    let tasks = stores
        .into_iter()
        .map(|store| tokio::spawn(async move { store.initialize().await }));
    let seeded: Vec<u64> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(seeded, vec![0; 8]);
}

#[tokio::test]
async fn counters_are_keyed_by_table_and_id() {
    let backend = InMemoryCounterBackend::new();
    let visitors = CounterStore::new(backend.clone(), support::config());
    let other = CounterStore::new(
        backend,
        support::config().with_counter_id(atomic_counter::CounterId(1)),
    );

    visitors.initialize().await.unwrap();
    other.initialize().await.unwrap();
    visitors.increment().await.unwrap();

    assert_eq!(visitors.current().await.unwrap(), Some(1));
    assert_eq!(other.current().await.unwrap(), Some(0));
    assert_eq!(other.key(), "visitors:1");
}
