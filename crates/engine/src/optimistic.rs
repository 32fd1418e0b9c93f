// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock that multiplexes onto pooled connections
//!
//! Each acquisition first probes pooled instances opportunistically, which
//! never blocks a connection other locks are using. Only when every pooled
//! candidate asks to be retried elsewhere does it fall back to a blocking
//! attempt on a dedicated overflow instance.

use crate::error::LockError;
use crate::handle::LockHandle;
use crate::lock::DistributedLock;
use crate::multiplexed::{AcquireOutcome, MultiplexedConnectionLock, RetryVerdict, Verdict};
use crate::pool::MultiplexedLockPool;
use async_trait::async_trait;
use muxlock_adapters::{DatabaseConnection, SynchronizationStrategy};
use muxlock_core::TimeoutValue;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct OptimisticMultiplexingLock<C, S> {
    name: String,
    key: String,
    pool: Arc<MultiplexedLockPool<C>>,
    strategy: Arc<S>,
    keepalive_cadence: TimeoutValue,
}

impl<C, S> OptimisticMultiplexingLock<C, S>
where
    C: DatabaseConnection,
    S: SynchronizationStrategy<C>,
{
    pub fn new(
        name: impl Into<String>,
        key: impl Into<String>,
        pool: Arc<MultiplexedLockPool<C>>,
        strategy: Arc<S>,
        keepalive_cadence: TimeoutValue,
    ) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            pool,
            strategy,
            keepalive_cadence,
        }
    }

    async fn attempt(
        &self,
        instance: &Arc<MultiplexedConnectionLock<C>>,
        timeout: TimeoutValue,
        cancel: &CancellationToken,
        opportunistic: bool,
    ) -> Result<AcquireOutcome, LockError> {
        instance
            .try_acquire(
                &self.name,
                timeout,
                &self.strategy,
                self.keepalive_cadence,
                cancel,
                opportunistic,
            )
            .await
    }

    async fn reclaim(&self, instance: &Arc<MultiplexedConnectionLock<C>>) {
        if let Err(e) = self.pool.reclaim(&self.key, instance).await {
            tracing::warn!(name = %self.name, error = %e, "failed to reclaim instance");
        }
    }
}

#[async_trait]
impl<C, S> DistributedLock for OptimisticMultiplexingLock<C, S>
where
    C: DatabaseConnection,
    S: SynchronizationStrategy<C>,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn try_acquire(
        &self,
        timeout: TimeoutValue,
        cancel: &CancellationToken,
    ) -> Result<Option<LockHandle>, LockError> {
        let mut exclude: Vec<Arc<MultiplexedConnectionLock<C>>> = Vec::new();

        loop {
            if cancel.is_cancelled() {
                return Err(LockError::Cancelled);
            }
            let Some(instance) = self.pool.candidate(&self.key, &exclude) else {
                break;
            };

            let mut verdict = match self.attempt(&instance, timeout, cancel, true).await? {
                AcquireOutcome::Acquired(handle) => return Ok(Some(handle)),
                AcquireOutcome::NotAcquired(verdict) => verdict,
            };
            if verdict.retry == RetryVerdict::RetryOnThisLock {
                verdict = match self.attempt(&instance, timeout, cancel, false).await? {
                    AcquireOutcome::Acquired(handle) => return Ok(Some(handle)),
                    AcquireOutcome::NotAcquired(verdict) => verdict,
                };
            }

            if verdict.can_safely_dispose {
                self.reclaim(&instance).await;
            }
            match verdict {
                Verdict {
                    retry: RetryVerdict::Retry,
                    ..
                } => exclude.push(instance),
                // a blocking retry on this instance already ran its course
                _ => return Ok(None),
            }
        }

        if cancel.is_cancelled() {
            return Err(LockError::Cancelled);
        }
        tracing::debug!(name = %self.name, tried = exclude.len(), "falling back to overflow instance");
        let overflow = self.pool.overflow_instance(&self.key);
        // a transient instance disposes itself once idle
        Ok(self
            .attempt(&overflow, timeout, cancel, false)
            .await?
            .into_handle())
    }
}

#[cfg(test)]
#[path = "optimistic_tests.rs"]
mod tests;
