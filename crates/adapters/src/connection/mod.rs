// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Physical backend connections

mod monitor;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use monitor::{ConnectionMonitor, MonitoringHandle};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{ConnectionCall, FakeConnection, FakeConnectionFactory};

use crate::error::BackendError;
use async_trait::async_trait;
use muxlock_core::TimeoutValue;
use tokio_util::sync::CancellationToken;

/// A stateful channel to the backend.
///
/// A connection is owned by exactly one multiplexed lock (or one dedicated
/// lock), which serializes every call on it.
#[async_trait]
pub trait DatabaseConnection: Send + Sync + 'static {
    /// Open the transport
    async fn open(&mut self, cancel: &CancellationToken) -> Result<(), BackendError>;

    /// Close the transport; the connection may be opened again later
    async fn close(&mut self) -> Result<(), BackendError>;

    /// Release everything the connection owns; it is not used afterwards
    async fn dispose(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Start a transaction that scopes locks taken on this connection.
    /// Closing the connection ends it.
    async fn begin_transaction(&mut self) -> Result<(), BackendError> {
        Err(BackendError::Protocol(
            "connection does not support transactions".to_string(),
        ))
    }

    fn in_transaction(&self) -> bool {
        false
    }

    /// False once the transport is known to be broken
    fn can_execute_queries(&self) -> bool;

    /// Interval at which an idle connection should be pinged
    fn set_keepalive_cadence(&mut self, cadence: TimeoutValue);

    /// Loss signal shared with handles of locks held on this connection
    fn monitor(&self) -> ConnectionMonitor;
}

/// Builds connections for a connection key (typically a connection string)
pub trait ConnectionFactory<C>: Send + Sync + 'static {
    fn create(&self, key: &str) -> C;
}

impl<C, F> ConnectionFactory<C> for F
where
    F: Fn(&str) -> C + Send + Sync + 'static,
{
    fn create(&self, key: &str) -> C {
        self(key)
    }
}
