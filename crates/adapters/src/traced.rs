// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced strategy wrapper for consistent observability

use crate::connection::DatabaseConnection;
use crate::error::BackendError;
use crate::strategy::SynchronizationStrategy;
use async_trait::async_trait;
use muxlock_core::TimeoutValue;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Wrapper that adds tracing to any SynchronizationStrategy
#[derive(Clone, Debug)]
pub struct TracedStrategy<S> {
    inner: S,
}

impl<S> TracedStrategy<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<C, S> SynchronizationStrategy<C> for TracedStrategy<S>
where
    C: DatabaseConnection,
    S: SynchronizationStrategy<C>,
{
    type Cookie = S::Cookie;

    async fn try_acquire(
        &self,
        connection: &mut C,
        name: &str,
        timeout: TimeoutValue,
        cancel: &CancellationToken,
    ) -> Result<Option<S::Cookie>, BackendError> {
        let span = tracing::info_span!("strategy.try_acquire", name, timeout = %timeout);

        async move {
            // Precondition: backends reject empty lock names
            if name.is_empty() {
                tracing::error!("lock name is empty");
                return Err(BackendError::Protocol(
                    "lock name must not be empty".to_string(),
                ));
            }

            tracing::debug!("starting");
            let start = std::time::Instant::now();
            let result = self.inner.try_acquire(connection, name, timeout, cancel).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(Some(_)) => tracing::info!(elapsed_ms, "acquired"),
                Ok(None) => tracing::debug!(elapsed_ms, "timed out"),
                Err(e) => tracing::warn!(elapsed_ms, error = %e, "acquire failed"),
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn release(
        &self,
        connection: &mut C,
        name: &str,
        cookie: &S::Cookie,
    ) -> Result<(), BackendError> {
        let span = tracing::info_span!("strategy.release", name);

        async move {
            let start = std::time::Instant::now();
            let result = self.inner.release(connection, name, cookie).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            // a failed release still ends the hold locally, so it is not fatal
            match &result {
                Ok(()) => tracing::info!(elapsed_ms, "released"),
                Err(e) => tracing::warn!(elapsed_ms, error = %e, "release failed"),
            }

            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
