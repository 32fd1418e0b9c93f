//! Shared fixtures for behavioral specs

pub use muxlock_adapters::{
    FakeBackend, FakeConnection, FakeConnectionFactory, FakeSessionFactory, FakeStrategy,
    StrategyCall,
};
pub use muxlock_core::{FakeClock, MultiplexingConfig, SessionDescriptor, TimeoutValue};
pub use muxlock_engine::{
    AcquireOutcome, DistributedLock, LockError, LockHandle, LockProvider,
    MultiplexedConnectionLock, RetryVerdict, SharedConnectionPool, Verdict,
};
pub use std::sync::Arc;
pub use std::time::Duration;
pub use tokio_util::sync::CancellationToken;

pub fn secs(n: u64) -> TimeoutValue {
    TimeoutValue::finite(Duration::from_secs(n))
}

/// One multiplexed instance over an observable fake connection
pub struct Instance {
    pub lock: Arc<MultiplexedConnectionLock<FakeConnection>>,
    pub connection: FakeConnection,
    pub backend: FakeBackend,
    pub strategy: Arc<FakeStrategy>,
}

impl Instance {
    pub fn new() -> Self {
        let backend = FakeBackend::new();
        let connection = FakeConnection::new();
        Self {
            lock: Arc::new(MultiplexedConnectionLock::new(connection.clone())),
            connection,
            strategy: Arc::new(backend.strategy()),
            backend,
        }
    }

    pub async fn try_acquire(
        &self,
        name: &str,
        timeout: TimeoutValue,
        cadence: TimeoutValue,
        opportunistic: bool,
    ) -> AcquireOutcome {
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
            .unwrap()
    }

    pub async fn hold(&self, name: &str, cadence: TimeoutValue) -> LockHandle {
        self.try_acquire(name, TimeoutValue::zero(), cadence, false)
            .await
            .into_handle()
            .expect("name should be free")
    }
}
