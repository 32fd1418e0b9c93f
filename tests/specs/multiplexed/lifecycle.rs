//! Multiplexed connection lifecycle specs
//!
//! Verify that the physical connection is open exactly while names are held
//! and that its keepalive cadence follows the held names.

use crate::prelude::*;

#[tokio::test]
async fn connection_is_open_iff_names_are_held() {
    let instance = Instance::new();
    assert!(!instance.connection.is_open());

    let a = instance.hold("A", TimeoutValue::infinite()).await;
    assert!(instance.connection.is_open());
    let b = instance.hold("B", TimeoutValue::infinite()).await;

    a.release().await.unwrap();
    assert!(instance.connection.is_open());
    b.release().await.unwrap();
    assert!(!instance.connection.is_open());

    // a later acquisition reopens it
    let c = instance.hold("C", TimeoutValue::infinite()).await;
    assert!(instance.connection.is_open());
    assert_eq!(instance.connection.open_count(), 2);
    c.release().await.unwrap();
}

#[tokio::test]
async fn keepalive_follows_tightest_held_cadence() {
    let instance = Instance::new();

    let a = instance.hold("A", secs(5)).await;
    let b = instance.hold("B", TimeoutValue::infinite()).await;
    assert_eq!(instance.connection.keepalive_cadence(), secs(5));

    a.release().await.unwrap();
    assert_eq!(instance.connection.keepalive_cadence(), TimeoutValue::infinite());
    b.release().await.unwrap();
}

#[tokio::test]
async fn same_name_twice_is_classified_as_already_held() {
    let instance = Instance::new();
    let held = instance.hold("A", TimeoutValue::infinite()).await;

    let again = instance
        .try_acquire("A", secs(1), TimeoutValue::infinite(), true)
        .await;

    assert_eq!(
        again.verdict(),
        Some(Verdict::new(RetryVerdict::Retry, false))
    );
    assert_eq!(instance.lock.held_names().await, vec!["A"]);
    held.release().await.unwrap();
}

#[tokio::test]
async fn dispose_requires_no_held_names() {
    let instance = Instance::new();
    let held = instance.hold("A", TimeoutValue::infinite()).await;

    assert!(matches!(
        instance.lock.dispose().await,
        Err(LockError::InvariantViolation(_))
    ));
    assert!(instance.connection.is_open());

    held.release().await.unwrap();
    instance.lock.dispose().await.unwrap();
    assert!(instance.connection.is_disposed());
}
