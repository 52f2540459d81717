/*
 *   Copyright (c) 2024 R3BL LLC
 *   All rights reserved.
 *
 *   Licensed under the Apache License, Version 2.0 (the "License");
 *   you may not use this file except in compliance with the License.
 *   You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 *   Unless required by applicable law or agreed to in writing, software
 *   distributed under the License is distributed on an "AS IS" BASIS,
 *   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *   See the License for the specific language governing permissions and
 *   limitations under the License.
 */

//! Scoped-closure wrappers around [`Mutex`]/[`RwLock`] so callers never hold
//! a guard past the closure that needed it.

use std::sync::{Mutex, RwLock};

/// A mutex whose only access is through a closure, so a guard can never
/// outlive the call that took it. Poisoning is treated as "the previous
/// holder panicked while mutating, but the data itself is still usable" —
/// the lock recovers the guard and carries on rather than propagating a
/// poison error to every caller.
pub struct ManagedLock<T> {
    inner: Mutex<T>,
}

impl<T> ManagedLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

/// As [`ManagedLock`], but backed by a reader/writer lock.
pub struct ManagedRwLock<T> {
    inner: RwLock<T>,
}

impl<T> ManagedRwLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
        }
    }

    pub fn with_read_lock<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    pub fn with_write_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}
