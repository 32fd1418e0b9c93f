// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use muxlock_adapters::{
    BackendError, ConnectionCall, FakeBackend, FakeConnection, FakeStrategy, StrategyCall,
};
use proptest::prelude::*;
use std::time::Duration;
use yare::parameterized;

struct Fixture {
    lock: Arc<MultiplexedConnectionLock<FakeConnection>>,
    connection: FakeConnection,
    backend: FakeBackend,
    strategy: Arc<FakeStrategy>,
}

fn fixture() -> Fixture {
    let backend = FakeBackend::new();
    let connection = FakeConnection::new();
    Fixture {
        lock: Arc::new(MultiplexedConnectionLock::new(connection.clone())),
        connection,
        strategy: Arc::new(backend.strategy()),
        backend,
    }
}

fn secs(n: u64) -> TimeoutValue {
    TimeoutValue::finite(Duration::from_secs(n))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

impl Fixture {
    async fn attempt(
        &self,
        name: &str,
        timeout: TimeoutValue,
        cadence: TimeoutValue,
        opportunistic: bool,
    ) -> Result<AcquireOutcome, LockError> {
        self.lock
            .try_acquire(
                name,
                timeout,
                &self.strategy,
                cadence,
                &CancellationToken::new(),
                opportunistic,
            )
            .await
    }

    async fn acquire(&self, name: &str, cadence: TimeoutValue) -> LockHandle {
        self.attempt(name, TimeoutValue::zero(), cadence, false)
            .await
            .unwrap()
            .into_handle()
            .unwrap()
    }

    fn acquire_attempts(&self, name: &str) -> usize {
        self.backend
            .calls()
            .iter()
            .filter(|c| matches!(c, StrategyCall::TryAcquire { name: n, .. } if n == name))
            .count()
    }
}

// =============================================================================
// Connection lifecycle
// =============================================================================

#[tokio::test]
async fn opens_lazily_and_closes_after_last_release() {
    let f = fixture();
    assert_eq!(f.connection.open_count(), 0);

    let handle = f.acquire("a", TimeoutValue::infinite()).await;
    assert!(f.connection.is_open());
    assert_eq!(f.backend.holder_of("a"), Some(f.connection.id()));

    handle.release().await.unwrap();
    assert!(!f.connection.is_open());
    assert_eq!(f.connection.close_count(), 1);
    assert_eq!(f.backend.holder_of("a"), None);
}

#[tokio::test]
async fn names_share_one_connection() {
    let f = fixture();

    let a = f.acquire("a", TimeoutValue::infinite()).await;
    let b = f.acquire("b", TimeoutValue::infinite()).await;
    assert_eq!(f.connection.open_count(), 1);
    assert_eq!(f.lock.held_names().await, vec!["a", "b"]);

    a.release().await.unwrap();
    assert!(f.connection.is_open());

    b.release().await.unwrap();
    assert!(!f.connection.is_open());
    assert_eq!(f.connection.close_count(), 1);
}

#[tokio::test]
async fn failed_attempt_closes_idle_connection() {
    let f = fixture();
    f.backend.hold_externally("a");

    let outcome = f.attempt("a", TimeoutValue::zero(), TimeoutValue::infinite(), false).await;

    assert!(outcome.unwrap().verdict().is_some());
    assert_eq!(f.connection.open_count(), 1);
    assert!(!f.connection.is_open());
}

// =============================================================================
// Keepalive cadence
// =============================================================================

#[tokio::test]
async fn keepalive_is_minimum_over_held_names() {
    let f = fixture();

    let a = f.acquire("a", secs(10)).await;
    assert_eq!(f.connection.keepalive_cadence(), secs(10));
    let b = f.acquire("b", secs(5)).await;
    assert_eq!(f.connection.keepalive_cadence(), secs(5));

    b.release().await.unwrap();
    assert_eq!(f.connection.keepalive_cadence(), secs(10));

    // recomputed on the way to closing too
    a.release().await.unwrap();
    assert_eq!(f.connection.keepalive_cadence(), TimeoutValue::infinite());
}

#[tokio::test]
async fn infinite_cadence_is_not_pushed() {
    let f = fixture();

    let handle = f.acquire("a", TimeoutValue::infinite()).await;
    handle.release().await.unwrap();

    assert!(!f
        .connection
        .calls()
        .iter()
        .any(|c| matches!(c, ConnectionCall::SetKeepaliveCadence(_))));
}

// =============================================================================
// Verdicts
// =============================================================================

#[parameterized(
    blocking_idle = { false, 20, false, RetryVerdict::NoRetry, true },
    blocking_holding = { false, 20, true, RetryVerdict::NoRetry, false },
    zero_timeout_idle = { true, 0, false, RetryVerdict::NoRetry, true },
    zero_timeout_holding = { true, 0, true, RetryVerdict::NoRetry, false },
    opportunistic_holding = { true, 1000, true, RetryVerdict::Retry, false },
    opportunistic_idle = { true, 1000, false, RetryVerdict::RetryOnThisLock, true },
)]
fn timeout_verdict(
    opportunistic: bool,
    timeout_ms: u64,
    holding_other: bool,
    expected: RetryVerdict,
    disposable: bool,
) {
    runtime().block_on(async {
        let f = fixture();
        f.backend.hold_externally("contested");
        let other = if holding_other {
            Some(f.acquire("other", TimeoutValue::infinite()).await)
        } else {
            None
        };

        let outcome = f
            .attempt(
                "contested",
                TimeoutValue::finite(Duration::from_millis(timeout_ms)),
                TimeoutValue::infinite(),
                opportunistic,
            )
            .await
            .unwrap();

        assert_eq!(outcome.verdict(), Some(Verdict::new(expected, disposable)));
        assert_eq!(f.connection.is_open(), holding_other);
        if let Some(other) = other {
            other.release().await.unwrap();
        }
    });
}

#[tokio::test]
async fn opportunistic_attempt_uses_zero_backend_timeout() {
    let f = fixture();

    let handle = f
        .attempt("a", secs(30), TimeoutValue::infinite(), true)
        .await
        .unwrap()
        .into_handle()
        .unwrap();

    assert_eq!(
        f.backend.calls(),
        vec![StrategyCall::TryAcquire {
            name: "a".to_string(),
            timeout: TimeoutValue::zero(),
        }]
    );
    handle.release().await.unwrap();
}

#[parameterized(
    opportunistic = { true, RetryVerdict::Retry },
    blocking = { false, RetryVerdict::NoRetry },
)]
fn already_held_name_is_not_reacquired(opportunistic: bool, expected: RetryVerdict) {
    runtime().block_on(async {
        let f = fixture();
        let handle = f.acquire("a", TimeoutValue::infinite()).await;

        let outcome = f
            .attempt("a", secs(1), TimeoutValue::infinite(), opportunistic)
            .await
            .unwrap();

        assert_eq!(outcome.verdict(), Some(Verdict::new(expected, false)));
        assert_eq!(f.acquire_attempts("a"), 1);
        handle.release().await.unwrap();
    });
}

#[tokio::test]
async fn busy_instance_asks_for_retry_elsewhere() {
    let f = fixture();
    f.backend.set_acquire_delay(Duration::from_millis(200));

    let lock = Arc::clone(&f.lock);
    let strategy = Arc::clone(&f.strategy);
    let blocking = tokio::spawn(async move {
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
    while !f.lock.is_in_use() {
        tokio::task::yield_now().await;
    }

    let outcome = f.attempt("a", secs(1), TimeoutValue::infinite(), true).await.unwrap();
    assert_eq!(
        outcome.verdict(),
        Some(Verdict::new(RetryVerdict::Retry, false))
    );
    assert_eq!(f.acquire_attempts("a"), 0);

    let handle = blocking.await.unwrap().unwrap().into_handle().unwrap();
    handle.release().await.unwrap();
}

#[tokio::test]
async fn blocking_wait_for_instance_observes_cancellation() {
    let f = fixture();
    f.backend.set_acquire_delay(Duration::from_millis(200));

    let lock = Arc::clone(&f.lock);
    let strategy = Arc::clone(&f.strategy);
    let blocking = tokio::spawn(async move {
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
    while !f.lock.is_in_use() {
        tokio::task::yield_now().await;
    }

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = f
        .lock
        .try_acquire("a", secs(1), &f.strategy, TimeoutValue::infinite(), &cancel, false)
        .await;
    assert!(matches!(result, Err(LockError::Cancelled)));

    let handle = blocking.await.unwrap().unwrap().into_handle().unwrap();
    handle.release().await.unwrap();
}

// =============================================================================
// Broken connections
// =============================================================================

#[tokio::test]
async fn known_broken_connection_short_circuits() {
    let f = fixture();
    let held = f.acquire("a", TimeoutValue::infinite()).await;
    f.connection.break_connection();

    let outcome = f.attempt("b", secs(1), TimeoutValue::infinite(), true).await.unwrap();

    assert_eq!(
        outcome.verdict(),
        Some(Verdict::new(RetryVerdict::Retry, false))
    );
    assert_eq!(f.acquire_attempts("b"), 0);

    // the backend reports the dead connection; bookkeeping still happens
    assert!(held.release().await.is_err());
    assert!(!f.connection.is_open());
}

#[tokio::test]
async fn connection_breaking_during_opportunistic_attempt_is_retried_elsewhere() {
    let f = fixture();
    f.backend.break_connection_on_next_acquire();

    let outcome = f.attempt("a", secs(1), TimeoutValue::infinite(), true).await.unwrap();

    assert_eq!(
        outcome.verdict(),
        Some(Verdict::new(RetryVerdict::Retry, true))
    );
    assert!(!f.connection.is_open());
    assert_eq!(f.connection.close_count(), 1);
}

#[tokio::test]
async fn connection_breaking_during_blocking_attempt_is_an_error() {
    let f = fixture();
    f.backend.break_connection_on_next_acquire();

    let result = f.attempt("a", secs(1), TimeoutValue::infinite(), false).await;

    assert!(matches!(
        result,
        Err(LockError::Backend(BackendError::ConnectionBroken))
    ));
    assert!(!f.connection.is_open());
}

#[tokio::test]
async fn open_failure_propagates() {
    let f = fixture();
    f.connection.set_open_fails(true);

    let result = f.attempt("a", secs(1), TimeoutValue::infinite(), true).await;

    assert!(matches!(result, Err(LockError::Backend(BackendError::Io(_)))));
    assert_eq!(f.connection.close_count(), 0);
    assert_eq!(f.acquire_attempts("a"), 0);
}

// =============================================================================
// Release
// =============================================================================

#[tokio::test]
async fn release_failure_still_updates_bookkeeping() {
    let f = fixture();
    let handle = f.acquire("a", secs(5)).await;
    f.backend.set_release_fails(true);

    let result = handle.release().await;

    assert!(matches!(
        result,
        Err(LockError::Backend(BackendError::Protocol(_)))
    ));
    assert!(f.lock.held_names().await.is_empty());
    assert!(!f.connection.is_open());
    assert_eq!(f.connection.keepalive_cadence(), TimeoutValue::infinite());
}

#[tokio::test]
async fn is_in_use_tracks_held_names() {
    let f = fixture();
    assert!(!f.lock.is_in_use());

    let handle = f.acquire("a", TimeoutValue::infinite()).await;
    assert!(f.lock.is_in_use());

    handle.release().await.unwrap();
    assert!(!f.lock.is_in_use());
}

// =============================================================================
// Disposal
// =============================================================================

#[tokio::test]
async fn dispose_while_holding_is_an_invariant_violation() {
    let f = fixture();
    let handle = f.acquire("a", TimeoutValue::infinite()).await;

    let result = f.lock.dispose().await;

    assert!(matches!(result, Err(LockError::InvariantViolation(_))));
    assert!(f.connection.is_open());
    assert!(!f.connection.is_disposed());
    handle.release().await.unwrap();
}

#[tokio::test]
async fn disposed_instance_refuses_without_touching_backend() {
    let f = fixture();
    f.lock.dispose().await.unwrap();
    assert!(f.connection.is_disposed());

    let outcome = f.attempt("a", secs(1), TimeoutValue::infinite(), false).await.unwrap();

    assert_eq!(outcome.verdict().map(|v| v.retry), Some(RetryVerdict::Retry));
    assert!(f.backend.calls().is_empty());
    assert_eq!(f.connection.open_count(), 0);
}

#[tokio::test]
async fn dispose_if_idle_only_disposes_free_instances() {
    let f = fixture();
    let handle = f.acquire("a", TimeoutValue::infinite()).await;

    assert!(!f.lock.dispose_if_idle().await.unwrap());
    handle.release().await.unwrap();
    assert!(f.lock.dispose_if_idle().await.unwrap());
    assert!(!f.lock.dispose_if_idle().await.unwrap());
    assert!(f.connection.is_disposed());
}

#[tokio::test]
async fn transient_instance_disposes_after_last_release() {
    let backend = FakeBackend::new();
    let strategy = Arc::new(backend.strategy());
    let connection = FakeConnection::new();
    let lock = Arc::new(MultiplexedConnectionLock::transient(connection.clone()));

    let a = lock
        .try_acquire("a", secs(1), &strategy, TimeoutValue::infinite(), &CancellationToken::new(), false)
        .await
        .unwrap()
        .into_handle()
        .unwrap();
    let b = lock
        .try_acquire("b", secs(1), &strategy, TimeoutValue::infinite(), &CancellationToken::new(), false)
        .await
        .unwrap()
        .into_handle()
        .unwrap();

    a.release().await.unwrap();
    assert!(!connection.is_disposed());
    b.release().await.unwrap();
    assert!(connection.is_disposed());
    assert_eq!(connection.calls().last(), Some(&ConnectionCall::Dispose));
}

#[tokio::test]
async fn transient_instance_disposes_after_failed_attempt() {
    let backend = FakeBackend::new();
    backend.hold_externally("a");
    let connection = FakeConnection::new();
    let lock = Arc::new(MultiplexedConnectionLock::transient(connection.clone()));

    let outcome = lock
        .try_acquire(
            "a",
            TimeoutValue::zero(),
            &Arc::new(backend.strategy()),
            TimeoutValue::infinite(),
            &CancellationToken::new(),
            false,
        )
        .await
        .unwrap();

    assert!(outcome.verdict().is_some());
    assert!(connection.is_disposed());
}

// =============================================================================
// Releases that outlive their caller
// =============================================================================

#[tokio::test]
async fn release_completes_when_caller_stops_waiting() {
    let f = fixture();
    let handle = f.acquire("a", TimeoutValue::infinite()).await;
    f.backend.hold_externally("b");

    // keep the instance mutex busy with a blocking wait on a contested name
    let lock = Arc::clone(&f.lock);
    let strategy = Arc::clone(&f.strategy);
    let blocking = tokio::spawn(async move {
        lock.try_acquire(
            "b",
            TimeoutValue::finite(Duration::from_millis(200)),
            &strategy,
            TimeoutValue::infinite(),
            &CancellationToken::new(),
            false,
        )
        .await
    });
    while f.acquire_attempts("b") == 0 {
        tokio::task::yield_now().await;
    }

    let gave_up = tokio::time::timeout(Duration::from_millis(10), handle.release()).await;
    assert!(gave_up.is_err());
    assert!(handle.is_released());
    drop(handle);

    let verdict = blocking.await.unwrap().unwrap();
    assert!(verdict.verdict().is_some());
    tokio::time::timeout(Duration::from_secs(2), async {
        while f.backend.holder_of("a").is_some() || f.connection.is_open() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert!(f.lock.held_names().await.is_empty());
    assert!(!f.lock.is_in_use());
}

// =============================================================================
// Invariants over random acquire/release sequences
// =============================================================================

#[derive(Clone, Debug)]
enum Op {
    Acquire { name: usize, cadence: Option<u64> },
    Release { name: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..4usize, proptest::option::of(1..60u64))
            .prop_map(|(name, cadence)| Op::Acquire { name, cadence }),
        (0..4usize).prop_map(|name| Op::Release { name }),
    ]
}

proptest! {
    #[test]
    fn connection_open_iff_names_held_and_cadence_is_minimum(
        ops in proptest::collection::vec(op_strategy(), 1..40)
    ) {
        runtime().block_on(async {
            let f = fixture();
            let mut held: HashMap<usize, (LockHandle, TimeoutValue)> = HashMap::new();

            for op in ops {
                match op {
                    Op::Acquire { name, cadence } => {
                        if held.contains_key(&name) {
                            continue;
                        }
                        let cadence = cadence.map(secs).unwrap_or_else(TimeoutValue::infinite);
                        let handle = f.acquire(&format!("lock-{name}"), cadence).await;
                        held.insert(name, (handle, cadence));
                    }
                    Op::Release { name } => {
                        if let Some((handle, _)) = held.remove(&name) {
                            handle.release().await.unwrap();
                        }
                    }
                }

                assert_eq!(f.connection.is_open(), !held.is_empty());
                let expected = TimeoutValue::min_of(held.values().map(|(_, c)| c));
                assert_eq!(f.connection.keepalive_cadence(), expected);
            }

            for (_, (handle, _)) in held {
                handle.release().await.unwrap();
            }
            assert!(!f.connection.is_open());
        });
    }
}
