//! Lock provider specs
//!
//! Verify end-to-end acquisition through provider-created locks.

use crate::prelude::*;

fn provider(
    config: &MultiplexingConfig,
) -> (
    LockProvider<FakeConnection, FakeStrategy>,
    FakeConnectionFactory,
    FakeBackend,
) {
    let factory = FakeConnectionFactory::new();
    let backend = FakeBackend::new();
    let provider =
        LockProvider::from_config("db://primary", backend.strategy(), factory.clone(), config);
    (provider, factory, backend)
}

#[tokio::test]
async fn distinct_names_multiplex_then_spill() {
    let config = MultiplexingConfig::default().with_max_connections_per_key(1);
    let (provider, factory, backend) = provider(&config);
    let cancel = CancellationToken::new();

    let a = provider.create_lock("a").acquire(TimeoutValue::zero(), &cancel).await.unwrap();
    let b = provider.create_lock("b").acquire(TimeoutValue::zero(), &cancel).await.unwrap();
    assert_eq!(factory.connections().len(), 1);

    backend.hold_externally("c");
    let releaser = backend.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        releaser.release_externally("c");
    });
    let c = provider.create_lock("c").acquire(secs(2), &cancel).await.unwrap();
    assert_eq!(factory.connections().len(), 2);

    for handle in [a, b, c] {
        handle.release().await.unwrap();
    }
    assert!(factory.connections().iter().all(|conn| !conn.is_open()));
}

#[tokio::test]
async fn timed_out_acquire_names_the_lock() {
    let (provider, _, backend) = provider(&MultiplexingConfig::default());
    backend.hold_externally("busy");

    let result = provider
        .create_lock("busy")
        .acquire(TimeoutValue::finite(Duration::from_millis(20)), &CancellationToken::new())
        .await;

    match result {
        Err(LockError::Timeout { name, .. }) => assert_eq!(name, "busy"),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn lock_on_caller_connection_leaves_it_open() {
    use muxlock_adapters::DatabaseConnection;
    use muxlock_engine::DedicatedConnectionLock;

    let backend = FakeBackend::new();
    let mut connection = FakeConnection::new();
    connection.open(&CancellationToken::new()).await.unwrap();
    let observer = connection.clone();
    let lock = DedicatedConnectionLock::on_connection(
        "a",
        Arc::new(tokio::sync::Mutex::new(connection)),
        Arc::new(backend.strategy()),
    );

    let handle = lock.acquire(secs(1), &CancellationToken::new()).await.unwrap();
    handle.release().await.unwrap();

    assert_eq!(backend.holder_of("a"), None);
    assert!(observer.is_open());
    assert!(!observer.is_disposed());
}
