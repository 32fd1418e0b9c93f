// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! muxlock-core: value types shared by every muxlock layer
//!
//! This crate provides:
//! - `TimeoutValue`, a duration that may be infinite
//! - A clock abstraction for testable connection ages
//! - An atomic single-slot cell for exactly-once consumption
//! - Multiplexing configuration loaded from TOML
//! - Connection descriptors for shared session pools

pub mod clock;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod slot;
pub mod timeout;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{ConnectionOptions, MultiplexingConfig};
pub use descriptor::{AuthInfo, SessionDescriptor};
pub use error::ConfigError;
pub use slot::Slot;
pub use timeout::TimeoutValue;
