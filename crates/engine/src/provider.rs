// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Creates locks for one backend connection key

use crate::dedicated::DedicatedConnectionLock;
use crate::lock::DistributedLock;
use crate::optimistic::OptimisticMultiplexingLock;
use crate::pool::MultiplexedLockPool;
use muxlock_adapters::{
    ConnectionFactory, DatabaseConnection, SynchronizationStrategy, TracedStrategy,
};
use muxlock_core::{ConnectionOptions, MultiplexingConfig};
use std::sync::Arc;

/// Builds named locks that talk to one backend.
///
/// Multiplexed locks created by the same provider share its pool, so
/// differently-named locks can ride the same physical connection.
pub struct LockProvider<C, S> {
    key: String,
    strategy: Arc<TracedStrategy<S>>,
    factory: Arc<dyn ConnectionFactory<C>>,
    options: ConnectionOptions,
    pool: Arc<MultiplexedLockPool<C>>,
}

impl<C, S> LockProvider<C, S>
where
    C: DatabaseConnection,
    S: SynchronizationStrategy<C>,
{
    pub fn new(
        key: impl Into<String>,
        strategy: S,
        factory: impl ConnectionFactory<C>,
        options: ConnectionOptions,
    ) -> Self {
        Self::build(
            key.into(),
            strategy,
            Arc::new(factory),
            options,
            MultiplexingConfig::default().max_connections_per_key,
        )
    }

    pub fn from_config(
        key: impl Into<String>,
        strategy: S,
        factory: impl ConnectionFactory<C>,
        config: &MultiplexingConfig,
    ) -> Self {
        Self::build(
            key.into(),
            strategy,
            Arc::new(factory),
            config.connection_options(),
            config.max_connections_per_key,
        )
    }

    fn build(
        key: String,
        strategy: S,
        factory: Arc<dyn ConnectionFactory<C>>,
        options: ConnectionOptions,
        max_connections_per_key: usize,
    ) -> Self {
        let pool = Arc::new(MultiplexedLockPool::new(
            Arc::clone(&factory),
            max_connections_per_key,
        ));
        Self {
            key,
            strategy: Arc::new(TracedStrategy::new(strategy)),
            factory,
            options,
            pool,
        }
    }

    pub fn create_lock(&self, name: impl Into<String>) -> Arc<dyn DistributedLock> {
        let name = name.into();
        // transaction-scoped locks need a connection of their own
        if self.options.use_multiplexing && !self.options.use_transaction {
            Arc::new(OptimisticMultiplexingLock::new(
                name,
                self.key.clone(),
                Arc::clone(&self.pool),
                Arc::clone(&self.strategy),
                self.options.keepalive_cadence,
            ))
        } else {
            Arc::new(
                DedicatedConnectionLock::new(
                    name,
                    self.key.clone(),
                    Arc::clone(&self.factory),
                    Arc::clone(&self.strategy),
                    self.options.keepalive_cadence,
                )
                .with_use_transaction(self.options.use_transaction),
            )
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn options(&self) -> ConnectionOptions {
        self.options
    }

    pub fn pool(&self) -> &Arc<MultiplexedLockPool<C>> {
        &self.pool
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
