// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock handles
//!
//! A handle proves that a named lock is held. It is consumed exactly once:
//! its state lives in a [`Slot`], release swaps the slot to empty, and only
//! the caller that observed the previous snapshot talks to the backend.
//! Every other release (concurrent, repeated, or from the drop guard) is a
//! no-op.
//!
//! A started release always runs to completion, even if the caller stops
//! awaiting it.
//!
//! Callers are expected to `release().await` a handle. Dropping an
//! unreleased handle is a caller error: the guard logs it and, inside a tokio
//! runtime, spawns the release so the name does not stay held forever.

use crate::error::LockError;
use async_trait::async_trait;
use muxlock_adapters::{ConnectionMonitor, MonitoringHandle};
use muxlock_core::Slot;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Releases whatever a handle holds on the backend
#[async_trait]
pub trait ReleaseAction: Send + Sync + 'static {
    async fn release(&self) -> Result<(), LockError>;
}

struct HandleState {
    releaser: Arc<dyn ReleaseAction>,
    monitor: ConnectionMonitor,
    monitoring: Option<Arc<MonitoringHandle>>,
}

/// A held distributed lock
pub struct LockHandle {
    name: String,
    state: Slot<HandleState>,
}

impl LockHandle {
    pub fn new(
        name: impl Into<String>,
        releaser: Arc<dyn ReleaseAction>,
        monitor: ConnectionMonitor,
    ) -> Self {
        Self {
            name: name.into(),
            state: Slot::new(HandleState {
                releaser,
                monitor,
                monitoring: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_released(&self) -> bool {
        self.state.is_empty()
    }

    /// Token cancelled once the connection backing this lock is lost.
    ///
    /// Monitoring is attached on first use and detached on release.
    pub fn handle_lost_token(&self) -> Result<CancellationToken, LockError> {
        loop {
            let current = self.state.load().ok_or(LockError::HandleReleased)?;
            if let Some(monitoring) = &current.monitoring {
                return Ok(monitoring.connection_lost_token());
            }

            let monitoring = Arc::new(current.monitor.monitoring_handle());
            let next = Arc::new(HandleState {
                releaser: Arc::clone(&current.releaser),
                monitor: current.monitor.clone(),
                monitoring: Some(Arc::clone(&monitoring)),
            });
            match self.state.compare_and_swap(&current, next) {
                Some(previous) if Arc::ptr_eq(&previous, &current) => {
                    return Ok(monitoring.connection_lost_token());
                }
                // lost the race to another caller or to release; the loop
                // picks up whichever snapshot won
                _ => continue,
            }
        }
    }

    /// Release the lock. Only the first call reaches the backend.
    ///
    /// Once claimed, the release runs on its own task: dropping this future
    /// (a timeout, a losing `select!` branch) stops the wait, not the release.
    pub async fn release(&self) -> Result<(), LockError> {
        let Some(state) = self.state.take() else {
            return Ok(());
        };
        tracing::debug!(name = %self.name, "releasing handle");
        let releaser = Arc::clone(&state.releaser);
        drop(state);
        tokio::spawn(async move { releaser.release().await })
            .await
            .map_err(|e| LockError::ReleaseAborted(e.to_string()))?
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };
        let releaser = Arc::clone(&state.releaser);
        drop(state);

        tracing::warn!(name = %self.name, "lock handle dropped without release");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let name = std::mem::take(&mut self.name);
                runtime.spawn(async move {
                    if let Err(e) = releaser.release().await {
                        tracing::warn!(name = %name, error = %e, "background release failed");
                    }
                });
            }
            Err(_) => {
                tracing::error!(name = %self.name, "no runtime available; lock leaked until its connection closes");
            }
        }
    }
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("name", &self.name)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
#[path = "handle_tests.rs"]
mod tests;
