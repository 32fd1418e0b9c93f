// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the multiplexing engine

use muxlock_adapters::BackendError;
use muxlock_core::TimeoutValue;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by locks, handles and pools
#[derive(Debug, Error)]
pub enum LockError {
    #[error("backend error: {0}")]
    Backend(#[source] BackendError),
    #[error("operation cancelled")]
    Cancelled,
    #[error("timed out after {timeout} acquiring {name}")]
    Timeout { name: String, timeout: TimeoutValue },
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("handle already released")]
    HandleReleased,
    #[error("release task aborted: {0}")]
    ReleaseAborted(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl From<BackendError> for LockError {
    fn from(err: BackendError) -> Self {
        match err {
            // a backend observing our token is the same cancellation
            BackendError::Cancelled => LockError::Cancelled,
            other => LockError::Backend(other),
        }
    }
}

impl LockError {
    /// True when the underlying backend reported the connection as gone
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, LockError::Backend(e) if e.is_connection_loss())
    }
}
