// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection-loss signalling
//!
//! A connection owns one `ConnectionMonitor`. Lock handles register
//! `MonitoringHandle`s on it lazily; when the connection notices its
//! transport died (a failed keepalive probe, a reset socket) it calls
//! `notify_lost`, which fires the token of every registered handle.
//! Dropping a handle unregisters it, so a released lock never reports loss.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct MonitorState {
    lost: bool,
    next_id: u64,
    watchers: HashMap<u64, CancellationToken>,
}

#[derive(Clone, Default)]
pub struct ConnectionMonitor {
    state: Arc<Mutex<MonitorState>>,
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a watcher. Its token is already cancelled if the connection
    /// was lost and not reset since.
    pub fn monitoring_handle(&self) -> MonitoringHandle {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let token = CancellationToken::new();
        if state.lost {
            token.cancel();
        }
        let id = state.next_id;
        state.next_id += 1;
        state.watchers.insert(id, token.clone());

        MonitoringHandle {
            id,
            token,
            state: Arc::downgrade(&self.state),
        }
    }

    /// Report that the connection was lost
    pub fn notify_lost(&self) {
        let watchers: Vec<CancellationToken> = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.lost = true;
            state.watchers.values().cloned().collect()
        };
        tracing::debug!(watchers = watchers.len(), "connection lost");
        for token in watchers {
            token.cancel();
        }
    }

    /// Re-arm after the connection was reopened
    pub fn reset(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).lost = false;
    }

    pub fn is_lost(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).lost
    }

    pub fn watcher_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .watchers
            .len()
    }
}

impl std::fmt::Debug for ConnectionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionMonitor")
            .field("lost", &self.is_lost())
            .field("watchers", &self.watcher_count())
            .finish()
    }
}

/// Registration of one lock handle on a connection's monitor
#[derive(Debug)]
pub struct MonitoringHandle {
    id: u64,
    token: CancellationToken,
    state: Weak<Mutex<MonitorState>>,
}

impl MonitoringHandle {
    /// Fires when the monitored connection is lost
    pub fn connection_lost_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for MonitoringHandle {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .watchers
                .remove(&self.id);
        }
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
