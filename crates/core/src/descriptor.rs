// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection descriptors for shared coordination-tree sessions
//!
//! Two descriptors compare equal (and hash equally) exactly when every
//! connection parameter matches, auth entries included, so equal descriptors
//! can share one pooled session.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One authentication entry presented when a session is established
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthInfo {
    pub scheme: String,
    pub auth: Vec<u8>,
}

impl AuthInfo {
    pub fn new(scheme: impl Into<String>, auth: impl Into<Vec<u8>>) -> Self {
        Self {
            scheme: scheme.into(),
            auth: auth.into(),
        }
    }
}

/// Parameters identifying a shareable session
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub connection_string: String,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub session_timeout: Duration,
    #[serde(default)]
    pub auth_info: Vec<AuthInfo>,
}

impl SessionDescriptor {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            connect_timeout: Duration::from_secs(15),
            session_timeout: Duration::from_secs(20),
            auth_info: Vec::new(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_auth(mut self, auth: AuthInfo) -> Self {
        self.auth_info.push(auth);
        self
    }
}

#[cfg(test)]
#[path = "descriptor_tests.rs"]
mod tests;
