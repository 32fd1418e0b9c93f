// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of multiplexed connection locks per connection key

use crate::error::LockError;
use crate::multiplexed::MultiplexedConnectionLock;
use muxlock_adapters::{ConnectionFactory, DatabaseConnection};
use muxlock_core::MultiplexingConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

type Instance<C> = Arc<MultiplexedConnectionLock<C>>;

struct Pooled<C> {
    lock: Instance<C>,
    last_chosen: u64,
}

struct KeyEntry<C> {
    instances: Vec<Pooled<C>>,
    /// Bumped on every candidate request; orders instances by last use
    tick: u64,
}

impl<C> Default for KeyEntry<C> {
    fn default() -> Self {
        Self {
            instances: Vec::new(),
            tick: 0,
        }
    }
}

/// Hands out multiplexed locks, bounded per connection key
pub struct MultiplexedLockPool<C> {
    factory: Arc<dyn ConnectionFactory<C>>,
    max_connections_per_key: usize,
    registry: Mutex<HashMap<String, KeyEntry<C>>>,
}

impl<C: DatabaseConnection> MultiplexedLockPool<C> {
    pub fn new(factory: Arc<dyn ConnectionFactory<C>>, max_connections_per_key: usize) -> Self {
        Self {
            factory,
            max_connections_per_key: max_connections_per_key.max(1),
            registry: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(factory: Arc<dyn ConnectionFactory<C>>, config: &MultiplexingConfig) -> Self {
        Self::new(factory, config.max_connections_per_key)
    }

    pub fn max_connections_per_key(&self) -> usize {
        self.max_connections_per_key
    }

    /// Pick an instance for `key`, skipping `exclude`.
    ///
    /// Prefers an idle instance, then a new one while under the limit, then
    /// the busy instance chosen least recently.
    pub fn candidate(&self, key: &str, exclude: &[Instance<C>]) -> Option<Instance<C>> {
        let mut registry = self.registry();
        let entry = registry.entry(key.to_string()).or_default();
        entry.tick += 1;
        let tick = entry.tick;
        let excluded = |lock: &Instance<C>| exclude.iter().any(|e| Arc::ptr_eq(e, lock));

        if let Some(pooled) = entry
            .instances
            .iter_mut()
            .find(|p| !excluded(&p.lock) && !p.lock.is_in_use())
        {
            pooled.last_chosen = tick;
            tracing::trace!(key, id = %pooled.lock.id(), "reusing idle instance");
            return Some(Arc::clone(&pooled.lock));
        }

        if entry.instances.len() < self.max_connections_per_key {
            let lock = Arc::new(MultiplexedConnectionLock::new(self.factory.create(key)));
            tracing::debug!(key, id = %lock.id(), count = entry.instances.len() + 1, "new instance");
            entry.instances.push(Pooled {
                lock: Arc::clone(&lock),
                last_chosen: tick,
            });
            return Some(lock);
        }

        let pooled = entry
            .instances
            .iter_mut()
            .filter(|p| !excluded(&p.lock))
            .min_by_key(|p| p.last_chosen)?;
        pooled.last_chosen = tick;
        Some(Arc::clone(&pooled.lock))
    }

    /// Fresh instance outside the registry for a last blocking attempt. It
    /// disposes its connection once nothing is held on it.
    pub fn overflow_instance(&self, key: &str) -> Instance<C> {
        let lock = Arc::new(MultiplexedConnectionLock::transient(self.factory.create(key)));
        tracing::debug!(key, id = %lock.id(), "overflow instance");
        lock
    }

    /// Drop `instance` from the registry and dispose it if it is idle.
    ///
    /// Returns whether it was disposed. A busy instance stays registered.
    pub async fn reclaim(&self, key: &str, instance: &Instance<C>) -> Result<bool, LockError> {
        let removed = {
            let mut registry = self.registry();
            let Some(entry) = registry.get_mut(key) else {
                return Ok(false);
            };
            if instance.is_in_use() {
                return Ok(false);
            }
            let before = entry.instances.len();
            entry.instances.retain(|p| !Arc::ptr_eq(&p.lock, instance));
            let removed = entry.instances.len() != before;
            if entry.instances.is_empty() {
                registry.remove(key);
            }
            removed
        };
        if !removed {
            return Ok(false);
        }

        let disposed = instance.dispose_if_idle().await?;
        if disposed {
            tracing::debug!(key, id = %instance.id(), "instance reclaimed");
        } else {
            // picked up between the idle check and disposal
            let mut registry = self.registry();
            let entry = registry.entry(key.to_string()).or_default();
            if entry.instances.len() < self.max_connections_per_key {
                entry.instances.push(Pooled {
                    lock: Arc::clone(instance),
                    last_chosen: entry.tick,
                });
            }
        }
        Ok(disposed)
    }

    pub fn instance_count(&self, key: &str) -> usize {
        self.registry()
            .get(key)
            .map(|entry| entry.instances.len())
            .unwrap_or(0)
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, KeyEntry<C>>> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
