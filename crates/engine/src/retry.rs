// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retrying backend operations across transient connection loss

use muxlock_adapters::BackendError;
use std::future::Future;

/// Attempts made by [`retry_on_connection_loss`] callers that have no
/// reason to pick their own
pub const DEFAULT_CONNECTION_LOSS_ATTEMPTS: usize = 3;

/// Run `op` until it succeeds, fails with something other than connection
/// loss, or `attempts` runs out. The last error is returned.
pub async fn retry_on_connection_loss<T, F, Fut>(
    attempts: usize,
    mut op: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_connection_loss() && attempt < attempts => {
                tracing::warn!(attempt, attempts, error = %e, "connection lost, retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
