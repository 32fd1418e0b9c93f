//! Retry verdict specs
//!
//! Verify how failed attempts are classified for the caller.

use crate::prelude::*;

#[tokio::test]
async fn busy_instance_returns_retry_without_dispose() {
    let instance = Instance::new();
    instance.backend.set_acquire_delay(Duration::from_millis(100));

    let lock = Arc::clone(&instance.lock);
    let strategy = Arc::clone(&instance.strategy);
    let slow = tokio::spawn(async move {
        lock.try_acquire(
            "slow",
            TimeoutValue::zero(),
            &strategy,
            TimeoutValue::infinite(),
            &CancellationToken::new(),
            false,
        )
        .await
    });
    while !instance.lock.is_in_use() {
        tokio::task::yield_now().await;
    }

    let outcome = instance
        .try_acquire("A", secs(1), TimeoutValue::infinite(), true)
        .await;
    assert_eq!(
        outcome.verdict(),
        Some(Verdict::new(RetryVerdict::Retry, false))
    );

    slow.await.unwrap().unwrap().into_handle().unwrap().release().await.unwrap();
}

#[tokio::test]
async fn connection_broken_while_idle_is_disposable() {
    let instance = Instance::new();
    instance.backend.break_connection_on_next_acquire();

    let outcome = instance
        .try_acquire("A", secs(1), TimeoutValue::infinite(), true)
        .await;

    assert_eq!(
        outcome.verdict(),
        Some(Verdict::new(RetryVerdict::Retry, true))
    );
}

#[tokio::test]
async fn connection_broken_while_holding_is_not_disposable() {
    let instance = Instance::new();
    let held = instance.hold("A", TimeoutValue::infinite()).await;
    instance.connection.break_connection();

    let outcome = instance
        .try_acquire("B", secs(1), TimeoutValue::infinite(), true)
        .await;

    assert_eq!(
        outcome.verdict(),
        Some(Verdict::new(RetryVerdict::Retry, false))
    );
    let _ = held.release().await;
}

#[tokio::test]
async fn zero_timeout_blocking_failure_is_no_retry() {
    let instance = Instance::new();
    instance.backend.hold_externally("A");

    let outcome = instance
        .try_acquire("A", TimeoutValue::zero(), TimeoutValue::infinite(), false)
        .await;

    assert_eq!(outcome.verdict().map(|v| v.retry), Some(RetryVerdict::NoRetry));
}

#[tokio::test]
async fn idle_opportunistic_timeout_retries_on_this_lock() {
    let instance = Instance::new();
    instance.backend.hold_externally("A");

    let outcome = instance
        .try_acquire("A", secs(5), TimeoutValue::infinite(), true)
        .await;

    assert_eq!(
        outcome.verdict(),
        Some(Verdict::new(RetryVerdict::RetryOnThisLock, true))
    );
    assert_eq!(
        instance.backend.calls(),
        vec![StrategyCall::TryAcquire {
            name: "A".to_string(),
            timeout: TimeoutValue::zero(),
        }]
    );
}
