// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend-specific acquisition strategies

#[cfg(any(test, feature = "test-support"))]
mod fake;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeBackend, FakeCookie, FakeStrategy, StrategyCall};

use crate::connection::DatabaseConnection;
use crate::error::BackendError;
use async_trait::async_trait;
use muxlock_core::TimeoutValue;
use tokio_util::sync::CancellationToken;

/// Acquires and releases named primitives over an open connection.
///
/// Implementations must tolerate being called repeatedly with different names
/// on the same open connection. A strategy instance also fixes the mode of
/// the primitive (exclusive lock, read or write side of a reader-writer lock,
/// semaphore ticket).
#[async_trait]
pub trait SynchronizationStrategy<C: DatabaseConnection>: Send + Sync + 'static {
    /// Opaque proof of acquisition, handed back verbatim on release
    type Cookie: Send + Sync + 'static;

    /// Try to acquire `name` within `timeout`; `Ok(None)` when it timed out
    async fn try_acquire(
        &self,
        connection: &mut C,
        name: &str,
        timeout: TimeoutValue,
        cancel: &CancellationToken,
    ) -> Result<Option<Self::Cookie>, BackendError>;

    /// Release a previous acquisition of `name`
    async fn release(
        &self,
        connection: &mut C,
        name: &str,
        cookie: &Self::Cookie,
    ) -> Result<(), BackendError>;
}
