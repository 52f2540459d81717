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

//! Lock striping: hand out one lock per *stripe key* instead of one global
//! lock or one lock per input, so unrelated inputs that happen to hash to the
//! same stripe share contention while most inputs don't contend at all.

use std::{hash::Hash, marker::PhantomData};

use super::{managed_lock::{ManagedLock, ManagedRwLock}, weak_memoizer::WeakMemoizer};
use std::sync::Arc;

/// Maps inputs to a [`ManagedLock`] keyed by a caller-supplied stripe
/// function. Locks are memoized weakly (see [`WeakMemoizer`]): a stripe's
/// lock is reclaimed once nobody is holding onto it anymore, so the stripe
/// space doesn't grow unbounded even if the input space is unbounded.
pub struct WeakManagedLockFactory<Input, D, SF> {
    stripe_fn: SF,
    locks: WeakMemoizer<D, ManagedLock<()>>,
    _input: PhantomData<fn(&Input)>,
}

impl<Input, D, SF> WeakManagedLockFactory<Input, D, SF>
where
    D: Eq + Hash + Clone,
    SF: Fn(&Input) -> D,
{
    pub fn new(stripe_fn: SF) -> Self {
        Self {
            stripe_fn,
            locks: WeakMemoizer::new(),
            _input: PhantomData,
        }
    }

    /// Returns the lock for whichever stripe `input` maps to. Two inputs
    /// that stripe to the same key get the same lock (reference-equal for as
    /// long as either caller keeps holding it).
    pub fn lock_for(&self, input: &Input) -> Arc<ManagedLock<()>> {
        let key = (self.stripe_fn)(input);
        self.locks.get(&key, |_| ManagedLock::new(()))
    }
}

/// As [`WeakManagedLockFactory`], but hands out reader/writer locks.
pub struct WeakManagedRwLockFactory<Input, D, SF> {
    stripe_fn: SF,
    locks: WeakMemoizer<D, ManagedRwLock<()>>,
    _input: PhantomData<fn(&Input)>,
}

impl<Input, D, SF> WeakManagedRwLockFactory<Input, D, SF>
where
    D: Eq + Hash + Clone,
    SF: Fn(&Input) -> D,
{
    pub fn new(stripe_fn: SF) -> Self {
        Self {
            stripe_fn,
            locks: WeakMemoizer::new(),
            _input: PhantomData,
        }
    }

    pub fn lock_for(&self, input: &Input) -> Arc<ManagedRwLock<()>> {
        let key = (self.stripe_fn)(input);
        self.locks.get(&key, |_| ManagedRwLock::new(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_striping_to_the_same_key_share_a_lock() {
        let factory = WeakManagedLockFactory::new(|n: &u32| n % 4);
        let a = factory.lock_for(&1);
        let b = factory.lock_for(&5);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn inputs_striping_to_different_keys_get_independent_locks() {
        let factory = WeakManagedLockFactory::new(|n: &u32| n % 4);
        let a = factory.lock_for(&1);
        let b = factory.lock_for(&2);
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn rw_variant_stripes_the_same_way() {
        let factory = WeakManagedRwLockFactory::new(|s: &String| s.len());
        let a = factory.lock_for(&"ab".to_string());
        let b = factory.lock_for(&"cd".to_string());
        assert!(Arc::ptr_eq(&a, &b));
    }
}
