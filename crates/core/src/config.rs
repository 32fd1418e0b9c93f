// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multiplexing configuration
//!
//! Loaded from TOML; durations use humantime strings (`"15s"`, `"1m"`).

use crate::error::ConfigError;
use crate::timeout::TimeoutValue;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Engine-wide configuration for connection multiplexing and shared pools
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MultiplexingConfig {
    /// Upper bound on pooled physical connections per connection key
    pub max_connections_per_key: usize,
    /// Share connections between differently-named locks
    pub use_multiplexing: bool,
    /// Scope dedicated locks to a transaction on their connection. Takes
    /// precedence over `use_multiplexing`.
    pub use_transaction: bool,
    /// Keepalive cadence requested by locks created from this config
    pub keepalive_cadence: TimeoutValue,
    /// How long a shared session may be handed out before it is replaced
    #[serde(with = "humantime_serde")]
    pub shared_pool_max_age: Duration,
    /// Bound on establishing a shared session
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for MultiplexingConfig {
    fn default() -> Self {
        Self {
            max_connections_per_key: 4,
            use_multiplexing: true,
            use_transaction: false,
            keepalive_cadence: TimeoutValue::infinite(),
            shared_pool_max_age: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(15),
        }
    }
}

impl MultiplexingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections_per_key == 0 {
            return Err(ConfigError::Invalid(
                "max_connections_per_key must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_max_connections_per_key(mut self, max: usize) -> Self {
        self.max_connections_per_key = max;
        self
    }

    pub fn with_use_multiplexing(mut self, enabled: bool) -> Self {
        self.use_multiplexing = enabled;
        self
    }

    pub fn with_use_transaction(mut self, enabled: bool) -> Self {
        self.use_transaction = enabled;
        self
    }

    pub fn with_keepalive_cadence(mut self, cadence: TimeoutValue) -> Self {
        self.keepalive_cadence = cadence;
        self
    }

    pub fn with_shared_pool_max_age(mut self, max_age: Duration) -> Self {
        self.shared_pool_max_age = max_age;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Per-lock options derived from this config
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            keepalive_cadence: self.keepalive_cadence,
            // a transaction needs a connection of its own
            use_multiplexing: self.use_multiplexing && !self.use_transaction,
            use_transaction: self.use_transaction,
        }
    }
}

/// Options applied to each lock a provider creates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub keepalive_cadence: TimeoutValue,
    pub use_multiplexing: bool,
    pub use_transaction: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        MultiplexingConfig::default().connection_options()
    }
}

impl ConnectionOptions {
    pub fn with_keepalive_cadence(mut self, cadence: TimeoutValue) -> Self {
        self.keepalive_cadence = cadence;
        self
    }

    pub fn with_use_multiplexing(mut self, enabled: bool) -> Self {
        self.use_multiplexing = enabled;
        self
    }

    /// Enabling transactions turns multiplexing off
    pub fn with_use_transaction(mut self, enabled: bool) -> Self {
        self.use_transaction = enabled;
        if enabled {
            self.use_multiplexing = false;
        }
        self
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
