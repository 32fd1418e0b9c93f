//! Handle release specs
//!
//! Verify exactly-once release and the lost-connection signal.

use crate::prelude::*;

#[tokio::test]
async fn double_release_reaches_backend_once() {
    let instance = Instance::new();
    let handle = instance.hold("A", TimeoutValue::infinite()).await;

    handle.release().await.unwrap();
    handle.release().await.unwrap();

    assert_eq!(instance.backend.release_count(), 1);
}

#[tokio::test]
async fn concurrent_release_reaches_backend_once() {
    let instance = Instance::new();
    let handle = Arc::new(instance.hold("A", TimeoutValue::infinite()).await);

    let (first, second) = tokio::join!(handle.release(), handle.release());
    first.unwrap();
    second.unwrap();

    assert_eq!(instance.backend.release_count(), 1);
}

#[tokio::test]
async fn lost_connection_cancels_handle_token() {
    let instance = Instance::new();
    let handle = instance.hold("A", TimeoutValue::infinite()).await;
    let token = handle.handle_lost_token().unwrap();

    instance.connection.break_connection();

    assert!(token.is_cancelled());
    let _ = handle.release().await;
    assert!(matches!(
        handle.handle_lost_token(),
        Err(LockError::HandleReleased)
    ));
}

#[tokio::test]
async fn dropped_handle_still_frees_the_name() {
    let instance = Instance::new();
    drop(instance.hold("A", TimeoutValue::infinite()).await);

    for _ in 0..50 {
        if instance.backend.holder_of("A").is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert_eq!(instance.backend.holder_of("A"), None);
    assert!(!instance.connection.is_open());
}

#[tokio::test]
async fn release_abandoned_by_a_timeout_still_frees_the_name() {
    let instance = Instance::new();
    let handle = instance.hold("A", TimeoutValue::infinite()).await;
    instance.backend.set_acquire_delay(Duration::from_millis(100));

    // a blocking attempt keeps the instance busy while the release waits
    let lock = Arc::clone(&instance.lock);
    let strategy = Arc::clone(&instance.strategy);
    let busy = tokio::spawn(async move {
        lock.try_acquire(
            "B",
            TimeoutValue::zero(),
            &strategy,
            TimeoutValue::infinite(),
            &CancellationToken::new(),
            false,
        )
        .await
    });
    let attempting_b = |calls: Vec<StrategyCall>| {
        calls
            .iter()
            .any(|c| matches!(c, StrategyCall::TryAcquire { name, .. } if name == "B"))
    };
    while !attempting_b(instance.backend.calls()) {
        tokio::task::yield_now().await;
    }

    let abandoned = tokio::time::timeout(Duration::from_millis(5), handle.release()).await;
    assert!(abandoned.is_err());
    drop(handle);

    let b = busy.await.unwrap().unwrap().into_handle().unwrap();
    b.release().await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while instance.connection.is_open() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(instance.backend.holder_of("A"), None);
    assert!(!instance.lock.is_in_use());
}
