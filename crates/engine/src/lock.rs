// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application-facing lock interface

use crate::error::LockError;
use crate::handle::LockHandle;
use async_trait::async_trait;
use muxlock_core::TimeoutValue;
use tokio_util::sync::CancellationToken;

/// A named lock backed by an external coordination service
#[async_trait]
pub trait DistributedLock: Send + Sync {
    fn name(&self) -> &str;

    /// Acquire within `timeout`; `Ok(None)` when it timed out
    async fn try_acquire(
        &self,
        timeout: TimeoutValue,
        cancel: &CancellationToken,
    ) -> Result<Option<LockHandle>, LockError>;

    /// Acquire within `timeout`, treating a timeout as an error
    async fn acquire(
        &self,
        timeout: TimeoutValue,
        cancel: &CancellationToken,
    ) -> Result<LockHandle, LockError> {
        self.try_acquire(timeout, cancel)
            .await?
            .ok_or_else(|| LockError::Timeout {
                name: self.name().to_string(),
                timeout,
            })
    }
}
