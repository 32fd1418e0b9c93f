// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for configuration values

use std::path::PathBuf;
use thiserror::Error;

/// Errors from parsing or loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
