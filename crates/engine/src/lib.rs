// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! muxlock connection multiplexing engine
//!
//! Many independently requested named locks share a small number of backend
//! connections. Failed attempts come back as retry verdicts so callers can
//! move to another connection instead of blocking one that others share.

mod dedicated;
mod error;
mod handle;
mod lock;
mod multiplexed;
mod optimistic;
mod pool;
mod provider;
mod retry;
mod shared_pool;

pub use dedicated::DedicatedConnectionLock;
pub use error::LockError;
pub use handle::{LockHandle, ReleaseAction};
pub use lock::DistributedLock;
pub use multiplexed::{AcquireOutcome, MultiplexedConnectionLock, RetryVerdict, Verdict};
pub use optimistic::OptimisticMultiplexingLock;
pub use pool::MultiplexedLockPool;
pub use provider::LockProvider;
pub use retry::{retry_on_connection_loss, DEFAULT_CONNECTION_LOSS_ATTEMPTS};
pub use shared_pool::{SharedConnection, SharedConnectionPool};
