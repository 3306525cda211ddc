// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::error::Result;
use parking_lot::{const_rwlock, RwLock};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Lazily initialized value guarded by a single-writer/multiple-reader lock.
///
/// The first caller of [`LoadGate::get_or_load`] runs the loader while
/// holding the write lock; concurrent callers block on the lock and then
/// observe the stored outcome. Failures are stored as well, so a failed load
/// is reported to every later caller without running the loader again.
///
/// Unlike a plain `OnceLock` the gate can be created per test, which makes
/// the first-load race observable through [`LoadGate::attempts`].
pub struct LoadGate<T> {
    slot: RwLock<Option<Result<Arc<T>>>>,
    attempts: AtomicUsize,
}

impl<T> LoadGate<T> {
    pub const fn new() -> Self {
        Self {
            slot: const_rwlock(None),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Returns the stored value, running `load` if nothing is stored yet.
    pub fn get_or_load<F>(&self, load: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Some(outcome) = self.slot.read().as_ref() {
            return outcome.clone();
        }

        let mut slot = self.slot.write();
        if let Some(outcome) = slot.as_ref() {
            return outcome.clone();
        }
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = load().map(Arc::new);
        *slot = Some(outcome.clone());
        outcome
    }

    /// The stored outcome, without loading.
    pub fn get(&self) -> Option<Result<Arc<T>>> {
        self.slot.read().clone()
    }

    /// How many times a loader has run.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl<T> Default for LoadGate<T> {
    fn default() -> Self {
        Self::new()
    }
}
