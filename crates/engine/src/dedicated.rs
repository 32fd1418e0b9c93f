// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Locks that do not share their connection
//!
//! By default every acquisition opens its own connection (optionally inside
//! a transaction) and releasing the handle closes it. A lock can instead run
//! on a connection or transaction the caller owns; such a connection is never
//! opened, closed, committed or disposed here.

use crate::error::LockError;
use crate::handle::{LockHandle, ReleaseAction};
use crate::lock::DistributedLock;
use async_trait::async_trait;
use muxlock_adapters::{ConnectionFactory, DatabaseConnection, SynchronizationStrategy};
use muxlock_core::TimeoutValue;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Where a dedicated lock gets its connection from
enum ConnectionSource<C> {
    Owned {
        key: String,
        factory: Arc<dyn ConnectionFactory<C>>,
        use_transaction: bool,
    },
    External {
        connection: Arc<Mutex<C>>,
        scope: ExternalScope,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExternalScope {
    Connection,
    Transaction,
}

/// Non-multiplexed lock
pub struct DedicatedConnectionLock<C, S> {
    name: String,
    source: ConnectionSource<C>,
    strategy: Arc<S>,
    keepalive_cadence: TimeoutValue,
}

impl<C, S> DedicatedConnectionLock<C, S>
where
    C: DatabaseConnection,
    S: SynchronizationStrategy<C>,
{
    /// Lock that opens a connection for `key` on every acquisition
    pub fn new(
        name: impl Into<String>,
        key: impl Into<String>,
        factory: Arc<dyn ConnectionFactory<C>>,
        strategy: Arc<S>,
        keepalive_cadence: TimeoutValue,
    ) -> Self {
        Self {
            name: name.into(),
            source: ConnectionSource::Owned {
                key: key.into(),
                factory,
                use_transaction: false,
            },
            strategy,
            keepalive_cadence,
        }
    }

    /// Lock on a connection the caller opens and closes. It must be open
    /// whenever the lock is acquired.
    pub fn on_connection(
        name: impl Into<String>,
        connection: Arc<Mutex<C>>,
        strategy: Arc<S>,
    ) -> Self {
        Self::external(name, connection, strategy, ExternalScope::Connection)
    }

    /// Lock scoped to a transaction the caller began and will end
    pub fn on_transaction(
        name: impl Into<String>,
        connection: Arc<Mutex<C>>,
        strategy: Arc<S>,
    ) -> Self {
        Self::external(name, connection, strategy, ExternalScope::Transaction)
    }

    fn external(
        name: impl Into<String>,
        connection: Arc<Mutex<C>>,
        strategy: Arc<S>,
        scope: ExternalScope,
    ) -> Self {
        Self {
            name: name.into(),
            source: ConnectionSource::External { connection, scope },
            strategy,
            keepalive_cadence: TimeoutValue::infinite(),
        }
    }

    /// Begin a transaction on each owned connection before acquiring, so the
    /// lock lives exactly as long as that transaction. No effect on locks
    /// over a caller's connection.
    pub fn with_use_transaction(mut self, enabled: bool) -> Self {
        if let ConnectionSource::Owned {
            use_transaction, ..
        } = &mut self.source
        {
            *use_transaction = enabled;
        }
        self
    }

    async fn acquire_owned(
        &self,
        key: &str,
        factory: &Arc<dyn ConnectionFactory<C>>,
        use_transaction: bool,
        timeout: TimeoutValue,
        cancel: &CancellationToken,
    ) -> Result<Option<LockHandle>, LockError> {
        let mut connection = factory.create(key);
        if let Err(e) = connection.open(cancel).await {
            if let Err(dispose_err) = connection.dispose().await {
                tracing::debug!(name = %self.name, error = %dispose_err, "dispose after failed open");
            }
            return Err(e.into());
        }
        if !self.keepalive_cadence.is_infinite() {
            connection.set_keepalive_cadence(self.keepalive_cadence);
        }

        let acquired = if use_transaction {
            match connection.begin_transaction().await {
                Ok(()) => {
                    self.strategy
                        .try_acquire(&mut connection, &self.name, timeout, cancel)
                        .await
                }
                Err(e) => Err(e),
            }
        } else {
            self.strategy
                .try_acquire(&mut connection, &self.name, timeout, cancel)
                .await
        };
        let cookie = match acquired {
            Ok(Some(cookie)) => cookie,
            Ok(None) => {
                shut_down(&mut connection).await?;
                return Ok(None);
            }
            Err(e) => {
                if let Err(close_err) = shut_down(&mut connection).await {
                    tracing::debug!(name = %self.name, error = %close_err, "close after failed acquire");
                }
                return Err(e.into());
            }
        };

        tracing::debug!(name = %self.name, use_transaction, "acquired on dedicated connection");
        let monitor = connection.monitor();
        let releaser = Arc::new(DedicatedRelease {
            connection: Mutex::new(connection),
            strategy: Arc::clone(&self.strategy),
            name: self.name.clone(),
            cookie,
        });
        Ok(Some(LockHandle::new(self.name.clone(), releaser, monitor)))
    }

    async fn acquire_external(
        &self,
        shared: &Arc<Mutex<C>>,
        scope: ExternalScope,
        timeout: TimeoutValue,
        cancel: &CancellationToken,
    ) -> Result<Option<LockHandle>, LockError> {
        let mut connection = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LockError::Cancelled),
            connection = shared.lock() => connection,
        };
        if !connection.can_execute_queries() {
            return Err(LockError::InvalidOperation(
                "externally owned connection must be open".to_string(),
            ));
        }
        if scope == ExternalScope::Transaction && !connection.in_transaction() {
            return Err(LockError::InvalidOperation(
                "externally owned transaction has already ended".to_string(),
            ));
        }

        let Some(cookie) = self
            .strategy
            .try_acquire(&mut *connection, &self.name, timeout, cancel)
            .await?
        else {
            return Ok(None);
        };

        tracing::debug!(name = %self.name, ?scope, "acquired on caller's connection");
        let releaser = Arc::new(ExternalRelease {
            connection: Arc::clone(shared),
            strategy: Arc::clone(&self.strategy),
            name: self.name.clone(),
            cookie,
        });
        Ok(Some(LockHandle::new(
            self.name.clone(),
            releaser,
            connection.monitor(),
        )))
    }
}

#[async_trait]
impl<C, S> DistributedLock for DedicatedConnectionLock<C, S>
where
    C: DatabaseConnection,
    S: SynchronizationStrategy<C>,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn try_acquire(
        &self,
        timeout: TimeoutValue,
        cancel: &CancellationToken,
    ) -> Result<Option<LockHandle>, LockError> {
        if cancel.is_cancelled() {
            return Err(LockError::Cancelled);
        }
        match &self.source {
            ConnectionSource::Owned {
                key,
                factory,
                use_transaction,
            } => {
                self.acquire_owned(key, factory, *use_transaction, timeout, cancel)
                    .await
            }
            ConnectionSource::External { connection, scope } => {
                self.acquire_external(connection, *scope, timeout, cancel)
                    .await
            }
        }
    }
}

/// Close ends any transaction along with the connection
async fn shut_down<C: DatabaseConnection>(connection: &mut C) -> Result<(), LockError> {
    connection.close().await?;
    connection.dispose().await?;
    Ok(())
}

struct DedicatedRelease<C, S: SynchronizationStrategy<C>>
where
    C: DatabaseConnection,
{
    connection: Mutex<C>,
    strategy: Arc<S>,
    name: String,
    cookie: S::Cookie,
}

#[async_trait]
impl<C, S> ReleaseAction for DedicatedRelease<C, S>
where
    C: DatabaseConnection,
    S: SynchronizationStrategy<C>,
{
    async fn release(&self) -> Result<(), LockError> {
        let mut connection = self.connection.lock().await;
        let released = self
            .strategy
            .release(&mut *connection, &self.name, &self.cookie)
            .await;
        if let Err(e) = &released {
            tracing::warn!(name = %self.name, error = %e, "backend release failed");
        }
        let closed = shut_down(&mut *connection).await;

        released?;
        closed
    }
}

/// Releases on the caller's connection and leaves it as found
struct ExternalRelease<C, S: SynchronizationStrategy<C>>
where
    C: DatabaseConnection,
{
    connection: Arc<Mutex<C>>,
    strategy: Arc<S>,
    name: String,
    cookie: S::Cookie,
}

#[async_trait]
impl<C, S> ReleaseAction for ExternalRelease<C, S>
where
    C: DatabaseConnection,
    S: SynchronizationStrategy<C>,
{
    async fn release(&self) -> Result<(), LockError> {
        let mut connection = self.connection.lock().await;
        self.strategy
            .release(&mut *connection, &self.name, &self.cookie)
            .await
            .map_err(|e| {
                tracing::warn!(name = %self.name, error = %e, "backend release failed");
                LockError::from(e)
            })
    }
}

#[cfg(test)]
#[path = "dedicated_tests.rs"]
mod tests;
