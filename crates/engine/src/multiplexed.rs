// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multiplexed connection lock
//!
//! Holds any number of differently-named locks over one physical connection.
//! The connection is opened lazily by the first acquisition and closed as
//! soon as the last held name is released, so an idle instance never pins a
//! backend connection.
//!
//! Every attempt that does not produce a handle returns a [`Verdict`] telling
//! the caller whether to give up, retry on this instance, or retry elsewhere,
//! and whether this instance may be disposed.

use crate::error::LockError;
use crate::handle::{LockHandle, ReleaseAction};
use async_trait::async_trait;
use muxlock_adapters::{DatabaseConnection, SynchronizationStrategy};
use muxlock_core::TimeoutValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How a caller should proceed after a failed attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryVerdict {
    /// Conventional failure; report it to the caller
    NoRetry,
    /// Retry non-opportunistically on the same instance
    RetryOnThisLock,
    /// Retry on a different instance
    Retry,
}

/// Result of a failed attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub retry: RetryVerdict,
    /// The instance held nothing when the verdict was made
    pub can_safely_dispose: bool,
}

impl Verdict {
    pub const fn new(retry: RetryVerdict, can_safely_dispose: bool) -> Self {
        Self {
            retry,
            can_safely_dispose,
        }
    }
}

/// Outcome of [`MultiplexedConnectionLock::try_acquire`]
#[derive(Debug)]
pub enum AcquireOutcome {
    Acquired(LockHandle),
    NotAcquired(Verdict),
}

impl AcquireOutcome {
    pub fn into_handle(self) -> Option<LockHandle> {
        match self {
            AcquireOutcome::Acquired(handle) => Some(handle),
            AcquireOutcome::NotAcquired(_) => None,
        }
    }

    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            AcquireOutcome::Acquired(_) => None,
            AcquireOutcome::NotAcquired(verdict) => Some(*verdict),
        }
    }
}

struct LockState<C> {
    connection: C,
    /// Held names and the keepalive cadence each one asked for
    held: HashMap<String, TimeoutValue>,
    /// Tracked explicitly so every open gets exactly one close and a broken
    /// connection is never reopened mid-hold
    opened: bool,
    disposed: bool,
    /// Dispose as soon as nothing is held (instances living outside the pool)
    transient: bool,
}

impl<C: DatabaseConnection> LockState<C> {
    fn is_broken(&self) -> bool {
        self.opened && !self.connection.can_execute_queries()
    }

    fn broken_verdict(&self) -> Verdict {
        Verdict::new(RetryVerdict::Retry, self.held.is_empty())
    }

    fn failure_verdict(
        &self,
        already_held: bool,
        opportunistic: bool,
        timeout: TimeoutValue,
    ) -> Verdict {
        let idle = self.held.is_empty();
        if !opportunistic {
            return Verdict::new(RetryVerdict::NoRetry, idle);
        }
        if already_held {
            return Verdict::new(RetryVerdict::Retry, false);
        }
        if timeout.is_zero() {
            return Verdict::new(RetryVerdict::NoRetry, idle);
        }
        if !idle {
            return Verdict::new(RetryVerdict::Retry, false);
        }
        // nothing held here, so waiting on this connection cannot block a release
        Verdict::new(RetryVerdict::RetryOnThisLock, true)
    }

    fn push_keepalive_cadence(&mut self) {
        let cadence = TimeoutValue::min_of(self.held.values());
        self.connection.set_keepalive_cadence(cadence);
    }

    async fn close_if_idle(&mut self, id: Uuid) -> Result<(), LockError> {
        if self.opened && self.held.is_empty() {
            self.connection.close().await?;
            self.opened = false;
            tracing::debug!(%id, "connection closed");
        }
        Ok(())
    }

    /// Final step of every acquire and release
    async fn settle(&mut self, id: Uuid) -> Result<(), LockError> {
        self.close_if_idle(id).await?;
        if self.transient && self.held.is_empty() {
            self.dispose_now(id).await?;
        }
        Ok(())
    }

    async fn dispose_now(&mut self, id: Uuid) -> Result<bool, LockError> {
        if self.disposed {
            return Ok(false);
        }
        self.close_if_idle(id).await?;
        self.connection.dispose().await?;
        self.disposed = true;
        tracing::debug!(%id, "instance disposed");
        Ok(true)
    }
}

/// Several named locks sharing one connection
pub struct MultiplexedConnectionLock<C> {
    id: Uuid,
    state: Mutex<LockState<C>>,
}

impl<C: DatabaseConnection> MultiplexedConnectionLock<C> {
    pub fn new(connection: C) -> Self {
        Self::build(connection, false)
    }

    /// Instance that disposes its connection once the last name it holds is
    /// released, or right after an attempt that leaves it idle
    pub fn transient(connection: C) -> Self {
        Self::build(connection, true)
    }

    fn build(connection: C, transient: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: Mutex::new(LockState {
                connection,
                held: HashMap::new(),
                opened: false,
                disposed: false,
                transient,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Try to acquire `name` on this instance's connection.
    ///
    /// Opportunistic attempts never wait: a busy instance or a backend wait
    /// turns into a verdict instead. The connection is closed before
    /// returning whenever nothing is held on it.
    #[allow(clippy::too_many_arguments)]
    pub async fn try_acquire<S>(
        self: &Arc<Self>,
        name: &str,
        timeout: TimeoutValue,
        strategy: &Arc<S>,
        keepalive_cadence: TimeoutValue,
        cancel: &CancellationToken,
        opportunistic: bool,
    ) -> Result<AcquireOutcome, LockError>
    where
        S: SynchronizationStrategy<C>,
    {
        let mut state = if opportunistic {
            match self.state.try_lock() {
                Ok(state) => state,
                Err(_) => {
                    tracing::trace!(id = %self.id, name, "instance busy");
                    // held names are unknown without the mutex
                    return Ok(AcquireOutcome::NotAcquired(Verdict::new(
                        RetryVerdict::Retry,
                        false,
                    )));
                }
            }
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LockError::Cancelled),
                state = self.state.lock() => state,
            }
        };

        if state.disposed {
            return Ok(AcquireOutcome::NotAcquired(Verdict::new(
                RetryVerdict::Retry,
                true,
            )));
        }
        if opportunistic && state.is_broken() {
            tracing::debug!(id = %self.id, name, "connection already broken");
            return Ok(AcquireOutcome::NotAcquired(state.broken_verdict()));
        }

        let attempt = self
            .attempt(
                &mut state,
                name,
                timeout,
                strategy,
                keepalive_cadence,
                cancel,
                opportunistic,
            )
            .await;
        let outcome = match attempt {
            // never punish the caller for a connection that died under us
            Err(e) if opportunistic && state.is_broken() => {
                tracing::debug!(id = %self.id, name, error = %e, "connection broke during attempt");
                Ok(AcquireOutcome::NotAcquired(state.broken_verdict()))
            }
            other => other,
        };

        let closed = state.settle(self.id).await;
        if let Ok(AcquireOutcome::NotAcquired(verdict)) = &outcome {
            tracing::debug!(id = %self.id, name, ?verdict, "not acquired");
        }
        match (outcome, closed) {
            // a handle implies a held name, so only verdicts can get here
            (Ok(_), Err(e)) => Err(e),
            (outcome, _) => outcome,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn attempt<S>(
        self: &Arc<Self>,
        state: &mut LockState<C>,
        name: &str,
        timeout: TimeoutValue,
        strategy: &Arc<S>,
        keepalive_cadence: TimeoutValue,
        cancel: &CancellationToken,
        opportunistic: bool,
    ) -> Result<AcquireOutcome, LockError>
    where
        S: SynchronizationStrategy<C>,
    {
        // same-name re-entrancy on one connection is not supported
        if state.held.contains_key(name) {
            return Ok(AcquireOutcome::NotAcquired(state.failure_verdict(
                true,
                opportunistic,
                timeout,
            )));
        }

        if !state.opened {
            state.connection.open(cancel).await?;
            state.opened = true;
            tracing::debug!(id = %self.id, "connection opened");
        }

        let backend_timeout = if opportunistic {
            TimeoutValue::zero()
        } else {
            timeout
        };
        let Some(cookie) = strategy
            .try_acquire(&mut state.connection, name, backend_timeout, cancel)
            .await?
        else {
            return Ok(AcquireOutcome::NotAcquired(state.failure_verdict(
                false,
                opportunistic,
                timeout,
            )));
        };

        state.held.insert(name.to_string(), keepalive_cadence);
        if !keepalive_cadence.is_infinite() {
            state.push_keepalive_cadence();
        }
        tracing::debug!(id = %self.id, name, held = state.held.len(), "acquired");

        let releaser = Arc::new(MultiplexedRelease {
            lock: Arc::clone(self),
            strategy: Arc::clone(strategy),
            name: name.to_string(),
            cookie,
        });
        Ok(AcquireOutcome::Acquired(LockHandle::new(
            name,
            releaser,
            state.connection.monitor(),
        )))
    }

    /// Release `name`. Bookkeeping happens whatever the backend says; the
    /// backend error is reported afterwards.
    pub async fn release<S>(
        &self,
        strategy: &S,
        name: &str,
        cookie: &S::Cookie,
    ) -> Result<(), LockError>
    where
        S: SynchronizationStrategy<C>,
    {
        let mut state = self.state.lock().await;
        let released = strategy.release(&mut state.connection, name, cookie).await;
        if let Err(e) = &released {
            tracing::warn!(id = %self.id, name, error = %e, "backend release failed");
        }

        if let Some(cadence) = state.held.remove(name) {
            // recomputed even when about to close, so a reopened connection
            // starts from the right cadence
            if !cadence.is_infinite() {
                state.push_keepalive_cadence();
            }
        }
        let closed = state.settle(self.id).await;

        released?;
        closed
    }

    /// Busy or holding at least one name
    pub fn is_in_use(&self) -> bool {
        match self.state.try_lock() {
            Ok(state) => !state.held.is_empty(),
            Err(_) => true,
        }
    }

    /// Dispose the connection. Holding any name at this point is a bug in
    /// the caller and leaves the connection untouched.
    pub async fn dispose(&self) -> Result<(), LockError> {
        let mut state = self.state.lock().await;
        if !state.held.is_empty() {
            tracing::error!(id = %self.id, held = state.held.len(), "dispose while holding locks");
            return Err(LockError::InvariantViolation(format!(
                "cannot dispose a connection holding {} lock(s)",
                state.held.len()
            )));
        }
        state.dispose_now(self.id).await.map(|_| ())
    }

    /// Dispose only if the instance is free right now; returns whether it did
    pub async fn dispose_if_idle(&self) -> Result<bool, LockError> {
        let Ok(mut state) = self.state.try_lock() else {
            return Ok(false);
        };
        if !state.held.is_empty() {
            return Ok(false);
        }
        state.dispose_now(self.id).await
    }

    pub async fn held_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().await.held.keys().cloned().collect();
        names.sort();
        names
    }
}

impl<C> std::fmt::Debug for MultiplexedConnectionLock<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiplexedConnectionLock")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Release path a multiplexed handle calls back into
struct MultiplexedRelease<C, S: SynchronizationStrategy<C>>
where
    C: DatabaseConnection,
{
    lock: Arc<MultiplexedConnectionLock<C>>,
    strategy: Arc<S>,
    name: String,
    cookie: S::Cookie,
}

#[async_trait]
impl<C, S> ReleaseAction for MultiplexedRelease<C, S>
where
    C: DatabaseConnection,
    S: SynchronizationStrategy<C>,
{
    async fn release(&self) -> Result<(), LockError> {
        self.lock
            .release(self.strategy.as_ref(), &self.name, &self.cookie)
            .await
    }
}

#[cfg(test)]
#[path = "multiplexed_tests.rs"]
mod tests;
