// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durations that may be infinite
//!
//! Used for acquisition timeouts and keepalive cadences. Every finite value
//! orders before infinite, so the minimum over a set of cadences is the
//! tightest finite one, or infinite when none is finite.

use crate::error::ConfigError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const INFINITE: &str = "infinite";

/// A timeout or cadence: either a finite duration or infinite
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeoutValue(Option<Duration>);

impl TimeoutValue {
    pub const fn finite(duration: Duration) -> Self {
        Self(Some(duration))
    }

    pub const fn infinite() -> Self {
        Self(None)
    }

    pub const fn zero() -> Self {
        Self(Some(Duration::ZERO))
    }

    pub fn is_infinite(&self) -> bool {
        self.0.is_none()
    }

    pub fn is_zero(&self) -> bool {
        self.0 == Some(Duration::ZERO)
    }

    /// The finite duration, or `None` when infinite
    pub fn as_duration(&self) -> Option<Duration> {
        self.0
    }

    /// Smallest value in `values`; infinite for an empty iterator
    pub fn min_of<'a>(values: impl IntoIterator<Item = &'a TimeoutValue>) -> TimeoutValue {
        values
            .into_iter()
            .copied()
            .fold(TimeoutValue::infinite(), std::cmp::min)
    }
}

impl Default for TimeoutValue {
    fn default() -> Self {
        Self::infinite()
    }
}

impl From<Duration> for TimeoutValue {
    fn from(duration: Duration) -> Self {
        Self::finite(duration)
    }
}

impl Ord for TimeoutValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0, other.0) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

impl PartialOrd for TimeoutValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TimeoutValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(duration) => write!(f, "{}", humantime::format_duration(duration)),
            None => f.write_str(INFINITE),
        }
    }
}

impl FromStr for TimeoutValue {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case(INFINITE) {
            return Ok(Self::infinite());
        }
        humantime::parse_duration(trimmed)
            .map(Self::finite)
            .map_err(|e| ConfigError::InvalidDuration {
                value: s.to_string(),
                reason: e.to_string(),
            })
    }
}

impl Serialize for TimeoutValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeoutValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "timeout_tests.rs"]
mod tests;
