// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors reported by backend connections and strategies

use thiserror::Error;

/// Errors from backend operations
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("connection is broken")]
    ConnectionBroken,
    #[error("connection lost: {0}")]
    ConnectionLoss(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("backend operation timed out")]
    Timeout,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Transient loss of the session that a fresh attempt may survive
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, BackendError::ConnectionLoss(_))
    }
}
