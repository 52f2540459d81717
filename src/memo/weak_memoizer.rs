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

//! A map that remembers a value for as long as something else is still
//! holding onto it, and nothing more.
//!
//! This crate targets Rust, where reclamation is deterministic `Drop` rather
//! than a JVM-style `ReferenceQueue` with asynchronous GC notification — so
//! instead of draining a queue of cleared references, [`WeakMemoizer`] scans
//! for dead entries inline, lazily, on every [`WeakMemoizer::get`] call.
//! There's no background thread and no notification; a key's entry is
//! reclaimed the next time *any* key is looked up after the value itself has
//! been dropped.

use std::{collections::HashMap, hash::Hash, sync::{Arc, Mutex, Weak}};

/// Caches values behind [`Weak`] pointers: a value stays cached only as long
/// as some caller elsewhere is holding a strong [`Arc`] to it.
pub struct WeakMemoizer<K, V> {
    entries: Mutex<HashMap<K, Weak<V>>>,
}

impl<K, V> Default for WeakMemoizer<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> WeakMemoizer<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value for `key`, computing and caching it with
    /// `factory` if it's absent or its last strong reference was dropped.
    /// Two calls for the same `key` while a previous value is still strongly
    /// reachable return `Arc`s to the very same allocation (`Arc::ptr_eq`
    /// holds); `factory` may still run redundantly for different keys racing
    /// concurrently, which is fine since it's expected to be a pure
    /// constructor.
    pub fn get<F>(&self, key: &K, factory: F) -> Arc<V>
    where
        F: FnOnce(&K) -> V,
    {
        let mut entries = self.entries.lock().unwrap();
        self.expunge_dead_locked(&mut entries);

        if let Some(weak) = entries.get(key) {
            if let Some(strong) = weak.upgrade() {
                return strong;
            }
        }

        let value = Arc::new(factory(key));
        entries.insert(key.clone(), Arc::downgrade(&value));
        value
    }

    /// Number of entries currently tracked, including ones whose value has
    /// been dropped but hasn't been scanned away yet.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry whose value is no longer strongly reachable. Called
    /// automatically at the start of every [`Self::get`]; exposed so callers
    /// that only ever read (never insert) can still reclaim memory.
    pub fn expunge(&self) {
        self.expunge_dead_locked(&mut self.entries.lock().unwrap());
    }

    fn expunge_dead_locked(&self, entries: &mut HashMap<K, Weak<V>>) {
        entries.retain(|_, weak| weak.strong_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_gets_return_the_same_allocation() {
        let memoizer: WeakMemoizer<String, u32> = WeakMemoizer::new();
        let a = memoizer.get(&"k".to_string(), |_| 1);
        let b = memoizer.get(&"k".to_string(), |_| 2);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*b, 1);
    }

    #[test]
    fn dropping_every_strong_reference_lets_the_factory_run_again() {
        let memoizer: WeakMemoizer<&str, u32> = WeakMemoizer::new();
        {
            let value = memoizer.get(&"k", |_| 1);
            assert_eq!(*value, 1);
        }
        let value = memoizer.get(&"k", |_| 2);
        assert_eq!(*value, 2);
    }

    #[test]
    fn expunge_reclaims_dead_entries() {
        let memoizer: WeakMemoizer<&str, u32> = WeakMemoizer::new();
        memoizer.get(&"a", |_| 1);
        assert_eq!(memoizer.len(), 1);
        memoizer.expunge();
        assert_eq!(memoizer.len(), 0);
    }

    #[test]
    fn distinct_keys_are_independent() {
        let memoizer: WeakMemoizer<&str, u32> = WeakMemoizer::new();
        let a = memoizer.get(&"a", |_| 1);
        let b = memoizer.get(&"b", |_| 2);
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
