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

use std::sync::{Arc, Mutex};

use crate::error::StrandResult;

use super::cell::Lazy;

/// A [`Lazy`] cell that can be thrown away and recomputed on demand.
///
/// `reset` swaps in a brand-new, empty [`Lazy`]; callers mid-`get` on the old
/// cell still observe its value (or error) since they're holding their own
/// [`Arc`] to it — `reset` doesn't cancel or disturb them.
#[derive(Default)]
pub struct ResettableLazy<V> {
    current: Mutex<Arc<Lazy<V>>>,
}

impl<V> ResettableLazy<V> {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Arc::new(Lazy::new())),
        }
    }

    pub fn get<F>(&self, factory: F) -> StrandResult<Arc<V>>
    where
        F: FnOnce() -> StrandResult<V>,
    {
        let cell = Arc::clone(&self.current.lock().unwrap());
        cell.get(factory)
    }

    /// Installs a fresh, empty cell and returns the one being replaced.
    pub fn reset(&self) -> Arc<Lazy<V>> {
        let mut guard = self.current.lock().unwrap();
        std::mem::replace(&mut *guard, Arc::new(Lazy::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn reset_forces_recomputation() {
        let cell = ResettableLazy::new();
        let calls = AtomicUsize::new(0);
        let first = cell.get(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });
        assert_eq!(*first.unwrap(), 1);
        cell.reset();
        let second = cell.get(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(2)
        });
        assert_eq!(*second.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
