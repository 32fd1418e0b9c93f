// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic single-slot cell
//!
//! Holds an immutable snapshot behind an `Arc`. Readers load the current
//! snapshot; writers replace it only if it is still the snapshot they read
//! (compare-and-swap by pointer identity); a consumer takes the snapshot out
//! exactly once, after which the slot stays empty.

use std::sync::{Arc, Mutex};

pub struct Slot<T> {
    value: Mutex<Option<Arc<T>>>,
}

impl<T> Slot<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(Some(Arc::new(value))),
        }
    }

    pub fn empty() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }

    /// Current snapshot, if the slot has not been consumed
    pub fn load(&self) -> Option<Arc<T>> {
        self.value.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Swap the slot to empty, returning the previous snapshot.
    ///
    /// Only one caller ever observes `Some`.
    pub fn take(&self) -> Option<Arc<T>> {
        self.value.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Replace the snapshot with `new` if the slot still holds `current`.
    ///
    /// Returns the snapshot held before the call; the swap happened iff that
    /// snapshot is `current` itself.
    pub fn compare_and_swap(&self, current: &Arc<T>, new: Arc<T>) -> Option<Arc<T>> {
        let mut value = self.value.lock().unwrap_or_else(|e| e.into_inner());
        let previous = value.clone();
        if previous
            .as_ref()
            .is_some_and(|existing| Arc::ptr_eq(existing, current))
        {
            *value = Some(new);
        }
        previous
    }

    pub fn is_empty(&self) -> bool {
        self.value.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }
}

impl<T> std::fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("consumed", &self.is_empty())
            .finish()
    }
}

#[cfg(test)]
#[path = "slot_tests.rs"]
mod tests;
