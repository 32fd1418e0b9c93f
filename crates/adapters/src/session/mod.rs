// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shareable coordination-tree sessions
//!
//! Unlike database connections, a session can be used verbatim by many
//! unrelated callers at once, so it is shared through a reference-counted
//! pool instead of being multiplexed.

#[cfg(any(test, feature = "test-support"))]
mod fake;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSession, FakeSessionFactory, SessionCall};

use crate::error::BackendError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Establishes and tears down shared sessions
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    /// Connection parameters; equal descriptors may share a session
    type Descriptor: Clone + Eq + Hash + Debug + Send + Sync + 'static;
    type Session: Send + Sync + 'static;

    async fn connect(
        &self,
        descriptor: &Self::Descriptor,
        cancel: &CancellationToken,
    ) -> Result<Self::Session, BackendError>;

    async fn close(&self, session: Arc<Self::Session>) -> Result<(), BackendError>;
}
