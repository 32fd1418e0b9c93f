// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Contracts for the backends muxlock talks to
//!
//! The engine never speaks a wire protocol itself. It drives:
//! - a `DatabaseConnection` that can be opened, closed and monitored for loss
//! - a `SynchronizationStrategy` that acquires and releases named primitives on it
//! - a `SessionFactory` that establishes shareable coordination-tree sessions

pub mod connection;
pub mod error;
pub mod session;
pub mod strategy;
pub mod traced;

pub use connection::{
    ConnectionFactory, ConnectionMonitor, DatabaseConnection, MonitoringHandle,
};
pub use error::BackendError;
pub use session::SessionFactory;
pub use strategy::SynchronizationStrategy;
pub use traced::TracedStrategy;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use connection::{ConnectionCall, FakeConnection, FakeConnectionFactory};
#[cfg(any(test, feature = "test-support"))]
pub use session::{FakeSession, FakeSessionFactory, SessionCall};
#[cfg(any(test, feature = "test-support"))]
pub use strategy::{FakeBackend, FakeCookie, FakeStrategy, StrategyCall};
