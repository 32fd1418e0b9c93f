// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reference-counted pool of shareable sessions
//!
//! Equal descriptors share one live session. Each session belongs to a
//! generation with a creation time: once a generation is older than the
//! pool's max age it is no longer handed out, a fresh generation replaces it,
//! and the old one is closed as soon as its last holder lets go. A session
//! still in use is never closed from under its holders.

use crate::error::LockError;
use muxlock_adapters::SessionFactory;
use muxlock_core::{Clock, MultiplexingConfig, SystemClock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Generation<S> {
    created_at: Instant,
    /// Initialized once; concurrent first holders share the connect
    session: OnceCell<Arc<S>>,
}

struct Tracked<D, S> {
    descriptor: D,
    generation: Arc<Generation<S>>,
    refs: usize,
    retired: bool,
}

struct PoolState<D, S> {
    /// Generation currently handed out per descriptor
    current: HashMap<D, u64>,
    tracked: HashMap<u64, Tracked<D, S>>,
    next_id: u64,
}

struct PoolInner<F: SessionFactory, C> {
    factory: F,
    max_age: Duration,
    connect_timeout: Duration,
    clock: C,
    state: Mutex<PoolState<F::Descriptor, F::Session>>,
}

/// Shares sessions between callers asking for equal descriptors
pub struct SharedConnectionPool<F: SessionFactory, C = SystemClock> {
    inner: Arc<PoolInner<F, C>>,
}

impl<F: SessionFactory, C> Clone for SharedConnectionPool<F, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: SessionFactory> SharedConnectionPool<F, SystemClock> {
    pub fn from_config(factory: F, config: &MultiplexingConfig) -> Self {
        Self::new(
            factory,
            config.shared_pool_max_age,
            config.connect_timeout,
            SystemClock,
        )
    }
}

impl<F: SessionFactory, C: Clock> SharedConnectionPool<F, C> {
    pub fn new(factory: F, max_age: Duration, connect_timeout: Duration, clock: C) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                factory,
                max_age,
                connect_timeout,
                clock,
                state: Mutex::new(PoolState {
                    current: HashMap::new(),
                    tracked: HashMap::new(),
                    next_id: 0,
                }),
            }),
        }
    }

    /// Get a shared session for `descriptor`, connecting if needed.
    ///
    /// Connecting is bounded by the pool's connect timeout. A failed connect
    /// is reported to the caller and not cached.
    pub async fn acquire(
        &self,
        descriptor: &F::Descriptor,
        cancel: &CancellationToken,
    ) -> Result<SharedConnection<F, C>, LockError> {
        if cancel.is_cancelled() {
            return Err(LockError::Cancelled);
        }

        let (id, generation, stale) = self.inner.checkout(descriptor);
        // returns the reference if this future is dropped before it is handed out
        let pending = PendingCheckout {
            pool: Arc::clone(&self.inner),
            id,
            armed: true,
        };
        for session in stale {
            self.inner.close_session(session).await;
        }

        let connected = generation
            .session
            .get_or_try_init(|| self.inner.connect(descriptor, cancel))
            .await
            .map(Arc::clone);
        let id = pending.disarm();
        match connected {
            Ok(session) => Ok(SharedConnection {
                pool: Arc::clone(&self.inner),
                id,
                session,
                released: AtomicBool::new(false),
            }),
            Err(e) => {
                if let Some(session) = self.inner.checkin(id) {
                    self.inner.close_session(session).await;
                }
                Err(e)
            }
        }
    }

    /// Close idle sessions past max age; returns how many were closed
    pub async fn purge_expired(&self) -> usize {
        let expired = self.inner.take_expired();
        let count = expired.len();
        for session in expired {
            self.inner.close_session(session).await;
        }
        if count > 0 {
            tracing::debug!(count, "purged expired sessions");
        }
        count
    }

    /// Run [`Self::purge_expired`] every `interval` until `cancel` fires
    pub fn spawn_reaper(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        pool.purge_expired().await;
                    }
                }
            }
        })
    }

    /// Sessions tracked by the pool, shared or retired
    pub fn session_count(&self) -> usize {
        self.inner.state().tracked.len()
    }
}

impl<F: SessionFactory, C: Clock> PoolInner<F, C> {
    fn state(&self) -> MutexGuard<'_, PoolState<F::Descriptor, F::Session>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_expired(&self, generation: &Generation<F::Session>) -> bool {
        self.clock.has_aged(generation.created_at, self.max_age)
    }

    /// Take a reference on the current generation for `descriptor`, starting
    /// a new one if there is none or it is expired. Also returns sessions
    /// that became closable.
    #[allow(clippy::type_complexity)]
    fn checkout(
        &self,
        descriptor: &F::Descriptor,
    ) -> (u64, Arc<Generation<F::Session>>, Vec<Arc<F::Session>>) {
        let mut state = self.state();

        if let Some(id) = state.current.get(descriptor).copied() {
            if let Some(tracked) = state.tracked.get_mut(&id) {
                if !self.is_expired(&tracked.generation) {
                    tracked.refs += 1;
                    return (id, Arc::clone(&tracked.generation), Vec::new());
                }
            }
        }

        let mut stale = Vec::new();
        if let Some(old) = state.current.remove(descriptor) {
            let idle = state.tracked.get(&old).is_some_and(|t| t.refs == 0);
            if idle {
                stale.extend(
                    state
                        .tracked
                        .remove(&old)
                        .and_then(|t| t.generation.session.get().cloned()),
                );
            } else if let Some(tracked) = state.tracked.get_mut(&old) {
                tracing::debug!(?descriptor, "retiring expired session still in use");
                tracked.retired = true;
            }
        }

        state.next_id += 1;
        let id = state.next_id;
        let generation = Arc::new(Generation {
            created_at: self.clock.now(),
            session: OnceCell::new(),
        });
        state.current.insert(descriptor.clone(), id);
        state.tracked.insert(
            id,
            Tracked {
                descriptor: descriptor.clone(),
                generation: Arc::clone(&generation),
                refs: 1,
                retired: false,
            },
        );
        (id, generation, stale)
    }

    /// Drop one reference; returns the session if it should now be closed
    fn checkin(&self, id: u64) -> Option<Arc<F::Session>> {
        let mut state = self.state();
        let tracked = state.tracked.get_mut(&id)?;
        tracked.refs = tracked.refs.saturating_sub(1);
        if tracked.refs > 0 {
            return None;
        }

        let connected = tracked.generation.session.initialized();
        if connected && !tracked.retired && !self.is_expired(&tracked.generation) {
            return None;
        }

        let tracked = state.tracked.remove(&id)?;
        if state.current.get(&tracked.descriptor) == Some(&id) {
            state.current.remove(&tracked.descriptor);
        }
        tracked.generation.session.get().cloned()
    }

    fn take_expired(&self) -> Vec<Arc<F::Session>> {
        let mut state = self.state();
        let expired: Vec<u64> = state
            .tracked
            .iter()
            .filter(|(_, t)| t.refs == 0 && (t.retired || self.is_expired(&t.generation)))
            .map(|(id, _)| *id)
            .collect();

        let mut sessions = Vec::new();
        for id in expired {
            if let Some(tracked) = state.tracked.remove(&id) {
                if state.current.get(&tracked.descriptor) == Some(&id) {
                    state.current.remove(&tracked.descriptor);
                }
                sessions.extend(tracked.generation.session.get().cloned());
            }
        }
        sessions
    }

    async fn connect(
        &self,
        descriptor: &F::Descriptor,
        cancel: &CancellationToken,
    ) -> Result<Arc<F::Session>, LockError> {
        let start = std::time::Instant::now();
        let session = tokio::time::timeout(
            self.connect_timeout,
            self.factory.connect(descriptor, cancel),
        )
        .await
        .map_err(|_| {
            tracing::warn!(?descriptor, timeout = ?self.connect_timeout, "connect timed out");
            LockError::ConnectTimeout(self.connect_timeout)
        })??;
        tracing::debug!(
            ?descriptor,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "session connected"
        );
        Ok(Arc::new(session))
    }

    async fn close_session(&self, session: Arc<F::Session>) {
        if let Err(e) = self.factory.close(session).await {
            tracing::warn!(error = %e, "failed to close session");
        }
    }
}

/// Reference taken by `checkout` that no caller owns yet
struct PendingCheckout<F: SessionFactory, C: Clock> {
    pool: Arc<PoolInner<F, C>>,
    id: u64,
    armed: bool,
}

impl<F: SessionFactory, C: Clock> PendingCheckout<F, C> {
    fn disarm(mut self) -> u64 {
        self.armed = false;
        self.id
    }
}

impl<F: SessionFactory, C: Clock> Drop for PendingCheckout<F, C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::debug!(generation = self.id, "acquire abandoned before connecting");
        let Some(session) = self.pool.checkin(self.id) else {
            return;
        };
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let pool = Arc::clone(&self.pool);
            runtime.spawn(async move { pool.close_session(session).await });
        }
    }
}

/// A reference to a pooled session. Release it exactly once with
/// [`SharedConnection::release`]; dropping it releases in the background.
pub struct SharedConnection<F: SessionFactory, C: Clock = SystemClock> {
    pool: Arc<PoolInner<F, C>>,
    id: u64,
    session: Arc<F::Session>,
    released: AtomicBool,
}

impl<F: SessionFactory, C: Clock> SharedConnection<F, C> {
    pub fn session(&self) -> &Arc<F::Session> {
        &self.session
    }

    pub async fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(session) = self.pool.checkin(self.id) {
            tracing::debug!("closing session after last release");
            self.pool.close_session(session).await;
        }
    }
}

impl<F: SessionFactory, C: Clock> Drop for SharedConnection<F, C> {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(session) = self.pool.checkin(self.id) else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let pool = Arc::clone(&self.pool);
                runtime.spawn(async move { pool.close_session(session).await });
            }
            Err(_) => {
                tracing::warn!("no runtime available to close released session");
            }
        }
    }
}

impl<F: SessionFactory, C: Clock> std::fmt::Debug for SharedConnection<F, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedConnection")
            .field("generation", &self.id)
            .field("released", &self.released.load(Ordering::Acquire))
            .finish()
    }
}

#[cfg(test)]
#[path = "shared_pool_tests.rs"]
mod tests;
