// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake session factory for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::SessionFactory;
use crate::error::BackendError;
use async_trait::async_trait;
use muxlock_core::SessionDescriptor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Recorded session call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Connect { connection_string: String },
    Close { id: u64 },
}

/// Fake session
#[derive(Debug)]
pub struct FakeSession {
    pub id: u64,
    pub descriptor: SessionDescriptor,
    closed: AtomicBool,
}

impl FakeSession {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct FactoryState {
    next_id: u64,
    calls: Vec<SessionCall>,
    connect_delay: Duration,
    connect_fails: bool,
}

/// Fake session factory for testing
#[derive(Clone, Default)]
pub struct FakeSessionFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl FakeSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<SessionCall> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .clone()
    }

    pub fn connect_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SessionCall::Connect { .. }))
            .count()
    }

    pub fn close_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SessionCall::Close { .. }))
            .count()
    }

    /// Make connects take this long
    pub fn set_connect_delay(&self, delay: Duration) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .connect_delay = delay;
    }

    /// Configure connect to fail for testing error paths
    pub fn set_connect_fails(&self, fails: bool) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .connect_fails = fails;
    }
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    type Descriptor = SessionDescriptor;
    type Session = FakeSession;

    async fn connect(
        &self,
        descriptor: &SessionDescriptor,
        cancel: &CancellationToken,
    ) -> Result<FakeSession, BackendError> {
        let (delay, fails) = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.calls.push(SessionCall::Connect {
                connection_string: descriptor.connection_string.clone(),
            });
            (state.connect_delay, state.connect_fails)
        };

        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(BackendError::Cancelled),
            }
        }
        if fails {
            return Err(BackendError::ConnectionLoss("fake connect failure".to_string()));
        }

        let id = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.next_id += 1;
            state.next_id
        };
        Ok(FakeSession {
            id,
            descriptor: descriptor.clone(),
            closed: AtomicBool::new(false),
        })
    }

    async fn close(&self, session: Arc<FakeSession>) -> Result<(), BackendError> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .push(SessionCall::Close { id: session.id });
        session.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
