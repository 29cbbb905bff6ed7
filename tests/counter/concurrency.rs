use std::sync::Arc;

use futures::future::join_all;

use atomic_counter::{CounterStore, IncrementStrategy, InMemoryCounterBackend};

use crate::support::{self, RacingBackend};

async fn increment_all<B>(stores: Vec<Arc<CounterStore<B>>>) -> Vec<u64>
where
    B: atomic_counter::CounterBackend + 'static,
{
    let tasks = stores
        .into_iter()
        .map(|store| tokio::spawn(async move { store.increment().await }));

    join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ten_callers_from_zero() {
    let backend = Arc::new(RacingBackend::new(support::seeded(0).await, 10));
    let config = support::config().with_max_attempts(16);
    let stores = support::instances(&backend, &config, 10);
    let reader = CounterStore::new(backend.clone(), config);

    let mut counts = increment_all(stores).await;
    counts.sort_unstable();

    assert_eq!(counts, (1..=10).collect::<Vec<_>>());
    assert_eq!(reader.current().await.unwrap(), Some(10));
    // Everyone read the same version first, so nine writes had to be retried.
    assert!(backend.conflicts() >= 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_lost_updates_with_conditional_writes() {
    let initial = 100;
    let callers = 40;
    let backend = support::seeded(initial).await;
    let config = support::config().with_max_attempts(64);
    let stores = support::instances(&backend, &config, callers);

    let mut counts = increment_all(stores).await;
    counts.sort_unstable();

    let expected: Vec<u64> = (initial + 1..=initial + callers as u64).collect();
    assert_eq!(counts, expected);

    let reader = CounterStore::new(backend, support::config());
    assert_eq!(reader.current().await.unwrap(), Some(initial + callers as u64));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_lost_updates_with_native_add() {
    let backend = InMemoryCounterBackend::new();
    let config = support::config();
    let seeder = CounterStore::new(backend.clone(), config.clone());
    seeder.initialize().await.unwrap();

    let stores = support::instances(&backend, &config, 25);
    let mut counts = increment_all(stores).await;
    counts.sort_unstable();

    assert_eq!(counts, (1..=25).collect::<Vec<_>>());
    assert_eq!(seeder.current().await.unwrap(), Some(25));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_store_shared_by_many_tasks() {
    let backend = support::seeded(0).await;
    let store = Arc::new(CounterStore::new(
        backend,
        support::config()
            .with_max_attempts(32)
            .with_strategy(IncrementStrategy::ConditionalWrite),
    ));

    let stores = (0..20).map(|_| Arc::clone(&store)).collect();
    let mut counts = increment_all(stores).await;
    counts.sort_unstable();
    counts.dedup();

    assert_eq!(counts.len(), 20);
    assert_eq!(store.current().await.unwrap(), Some(20));
}
