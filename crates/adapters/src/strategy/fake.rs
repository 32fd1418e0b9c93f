// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake exclusive-lock backend for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::SynchronizationStrategy;
use crate::connection::{DatabaseConnection, FakeConnection};
use crate::error::BackendError;
use async_trait::async_trait;
use muxlock_core::TimeoutValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Connection id used for names held by "another process"
const EXTERNAL_HOLDER: u64 = 0;

/// Recorded strategy call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyCall {
    TryAcquire { name: String, timeout: TimeoutValue },
    Release { name: String },
}

/// Proof of a fake acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeCookie {
    pub id: u64,
}

#[derive(Debug, Default)]
struct BackendState {
    /// name -> (connection id, cookie id)
    holders: HashMap<String, (u64, u64)>,
    next_cookie: u64,
    calls: Vec<StrategyCall>,
    break_on_next_acquire: bool,
    release_fails: bool,
    acquire_delay: Duration,
}

/// In-memory stand-in for the coordination service: grants each name to at
/// most one connection at a time.
#[derive(Clone, Debug, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strategy acquiring exclusive locks against this backend
    pub fn strategy(&self) -> FakeStrategy {
        FakeStrategy {
            backend: self.clone(),
        }
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<StrategyCall> {
        self.lock().calls.clone()
    }

    pub fn release_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, StrategyCall::Release { .. }))
            .count()
    }

    /// Connection id holding `name`, if any
    pub fn holder_of(&self, name: &str) -> Option<u64> {
        self.lock().holders.get(name).map(|(conn, _)| *conn)
    }

    pub fn held_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().holders.keys().cloned().collect();
        names.sort();
        names
    }

    /// Simulate another process holding `name`
    pub fn hold_externally(&self, name: &str) {
        self.lock()
            .holders
            .insert(name.to_string(), (EXTERNAL_HOLDER, 0));
    }

    pub fn release_externally(&self, name: &str) {
        let mut state = self.lock();
        if state.holders.get(name).is_some_and(|(c, _)| *c == EXTERNAL_HOLDER) {
            state.holders.remove(name);
        }
    }

    /// Kill the connection during the next acquisition attempt
    pub fn break_connection_on_next_acquire(&self) {
        self.lock().break_on_next_acquire = true;
    }

    /// Configure release to fail for testing error paths
    pub fn set_release_fails(&self, fails: bool) {
        self.lock().release_fails = fails;
    }

    /// Delay every acquisition before it reaches the lock table
    pub fn set_acquire_delay(&self, delay: Duration) {
        self.lock().acquire_delay = delay;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn try_grant(&self, name: &str, connection_id: u64) -> Option<FakeCookie> {
        let mut state = self.lock();
        if state.holders.contains_key(name) {
            return None;
        }
        state.next_cookie += 1;
        let cookie = state.next_cookie;
        state
            .holders
            .insert(name.to_string(), (connection_id, cookie));
        Some(FakeCookie { id: cookie })
    }

    fn free(&self, name: &str, cookie: &FakeCookie) {
        let mut state = self.lock();
        if state.holders.get(name).is_some_and(|(_, c)| *c == cookie.id) {
            state.holders.remove(name);
        }
    }
}

/// Exclusive-lock strategy over a `FakeBackend`
#[derive(Clone, Debug)]
pub struct FakeStrategy {
    backend: FakeBackend,
}

impl FakeStrategy {
    pub fn backend(&self) -> &FakeBackend {
        &self.backend
    }
}

#[async_trait]
impl SynchronizationStrategy<FakeConnection> for FakeStrategy {
    type Cookie = FakeCookie;

    async fn try_acquire(
        &self,
        connection: &mut FakeConnection,
        name: &str,
        timeout: TimeoutValue,
        cancel: &CancellationToken,
    ) -> Result<Option<FakeCookie>, BackendError> {
        let (break_now, delay) = {
            let mut state = self.backend.lock();
            state.calls.push(StrategyCall::TryAcquire {
                name: name.to_string(),
                timeout,
            });
            (
                std::mem::take(&mut state.break_on_next_acquire),
                state.acquire_delay,
            )
        };

        if break_now {
            connection.break_connection();
            return Err(BackendError::ConnectionBroken);
        }
        if !connection.can_execute_queries() {
            return Err(BackendError::ConnectionBroken);
        }
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(BackendError::Cancelled),
            }
        }

        let deadline = timeout
            .as_duration()
            .map(|d| tokio::time::Instant::now() + d);
        loop {
            if let Some(cookie) = self.backend.try_grant(name, connection.id()) {
                return Ok(Some(cookie));
            }
            if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                return Ok(None);
            }
            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = cancel.cancelled() => return Err(BackendError::Cancelled),
            }
        }
    }

    async fn release(
        &self,
        connection: &mut FakeConnection,
        name: &str,
        cookie: &FakeCookie,
    ) -> Result<(), BackendError> {
        let fails = {
            let mut state = self.backend.lock();
            state.calls.push(StrategyCall::Release {
                name: name.to_string(),
            });
            state.release_fails
        };
        if fails {
            return Err(BackendError::Protocol("fake release failure".to_string()));
        }

        // the service drops a dead session's locks on its own
        self.backend.free(name, cookie);
        if !connection.can_execute_queries() {
            return Err(BackendError::ConnectionBroken);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
