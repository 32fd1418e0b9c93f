// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake connection for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ConnectionFactory, ConnectionMonitor, DatabaseConnection};
use crate::error::BackendError;
use async_trait::async_trait;
use muxlock_core::TimeoutValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Recorded connection call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCall {
    Open,
    Close,
    Dispose,
    BeginTransaction,
    SetKeepaliveCadence(TimeoutValue),
}

#[derive(Debug, Default)]
struct FakeConnectionState {
    open: bool,
    broken: bool,
    disposed: bool,
    in_transaction: bool,
    open_fails: bool,
    keepalive_cadence: TimeoutValue,
    calls: Vec<ConnectionCall>,
}

/// Fake connection. Clones share state, so a test can keep one clone to observe
/// while the engine owns another.
#[derive(Clone, Debug)]
pub struct FakeConnection {
    id: u64,
    state: Arc<Mutex<FakeConnectionState>>,
    monitor: ConnectionMonitor,
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl Default for FakeConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeConnection {
    pub fn new() -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            state: Arc::new(Mutex::new(FakeConnectionState::default())),
            monitor: ConnectionMonitor::new(),
        }
    }

    /// Process-unique id, used by the fake backend to attribute held names
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).open
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).disposed
    }

    pub fn keepalive_cadence(&self) -> TimeoutValue {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keepalive_cadence
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ConnectionCall> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .clone()
    }

    pub fn open_count(&self) -> usize {
        self.count(|c| matches!(c, ConnectionCall::Open))
    }

    pub fn close_count(&self) -> usize {
        self.count(|c| matches!(c, ConnectionCall::Close))
    }

    /// Kill the transport: queries fail and the monitor reports loss
    pub fn break_connection(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).broken = true;
        self.monitor.notify_lost();
    }

    /// Configure open to fail for testing error paths
    pub fn set_open_fails(&self, fails: bool) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).open_fails = fails;
    }

    fn count(&self, predicate: impl Fn(&ConnectionCall) -> bool) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .iter()
            .filter(|c| predicate(c))
            .count()
    }
}

#[async_trait]
impl DatabaseConnection for FakeConnection {
    async fn open(&mut self, cancel: &CancellationToken) -> Result<(), BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.calls.push(ConnectionCall::Open);
            if state.open_fails {
                return Err(BackendError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "fake open failure",
                )));
            }
            state.open = true;
            state.broken = false;
        }
        self.monitor.reset();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push(ConnectionCall::Close);
        state.open = false;
        state.in_transaction = false;
        Ok(())
    }

    async fn begin_transaction(&mut self) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push(ConnectionCall::BeginTransaction);
        if !state.open {
            return Err(BackendError::Protocol(
                "transaction on a closed connection".to_string(),
            ));
        }
        state.in_transaction = true;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .in_transaction
    }

    async fn dispose(&mut self) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push(ConnectionCall::Dispose);
        state.open = false;
        state.in_transaction = false;
        state.disposed = true;
        Ok(())
    }

    fn can_execute_queries(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.open && !state.broken
    }

    fn set_keepalive_cadence(&mut self, cadence: TimeoutValue) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push(ConnectionCall::SetKeepaliveCadence(cadence));
        state.keepalive_cadence = cadence;
    }

    fn monitor(&self) -> ConnectionMonitor {
        self.monitor.clone()
    }
}

/// Factory handing out fake connections and remembering them per key
#[derive(Clone, Default)]
pub struct FakeConnectionFactory {
    created: Arc<Mutex<Vec<(String, FakeConnection)>>>,
}

impl FakeConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connection created so far, in creation order
    pub fn connections(&self) -> Vec<FakeConnection> {
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Connections created for one key
    pub fn connections_for(&self, key: &str) -> Vec<FakeConnection> {
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

impl ConnectionFactory<FakeConnection> for FakeConnectionFactory {
    fn create(&self, key: &str) -> FakeConnection {
        let connection = FakeConnection::new();
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((key.to_string(), connection.clone()));
        connection
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
