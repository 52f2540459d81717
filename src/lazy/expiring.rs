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

use crate::error::{StrandError, StrandResult};

use super::{cell::Lazy, predicates::LivenessPredicate};

#[derive(Clone)]
struct Slot<V> {
    cell: Arc<Lazy<V>>,
    predicate: Arc<dyn LivenessPredicate>,
}

/// A [`Lazy`] cell paired with a [`LivenessPredicate`] (see
/// [`crate::lazy::TtlPredicate`]/[`crate::lazy::TtiPredicate`]): once the
/// predicate says the cached value is stale, the next `get` replaces both the
/// value and the predicate with fresh ones instead of serving the stale
/// value.
pub struct ExpiringLazy<V, F, PF> {
    factory: F,
    predicate_factory: PF,
    slot: Mutex<Option<Slot<V>>>,
}

impl<V, F, PF> ExpiringLazy<V, F, PF>
where
    F: Fn() -> StrandResult<V> + Send + Sync,
    PF: Fn() -> Arc<dyn LivenessPredicate> + Send + Sync,
    V: Send + Sync + 'static,
{
    const MAX_RETRIES: u32 = 64;

    pub fn new(factory: F, predicate_factory: PF) -> Self {
        Self {
            factory,
            predicate_factory,
            slot: Mutex::new(None),
        }
    }

    /// Returns the current value, recomputing it if the predicate reports it
    /// stale. Bounded retries guard against livelock if many threads are
    /// racing to replace an expired slot at once; hitting the bound surfaces
    /// as a caller-visible [`StrandError::Argument`] rather than looping
    /// forever.
    pub fn get(&self) -> StrandResult<Arc<V>> {
        for _ in 0..Self::MAX_RETRIES {
            let current = self.slot.lock().unwrap().clone();
            if let Some(slot) = &current {
                if slot.predicate.is_alive() {
                    return slot.cell.get(|| (self.factory)());
                }
            }

            let fresh = Slot {
                cell: Arc::new(Lazy::new()),
                predicate: (self.predicate_factory)(),
            };
            let mut guard = self.slot.lock().unwrap();
            let still_current = match (guard.as_ref(), current.as_ref()) {
                (Some(g), Some(c)) => Arc::ptr_eq(&g.cell, &c.cell),
                (None, None) => true,
                _ => false,
            };
            if still_current {
                *guard = Some(fresh);
            }
            // Otherwise another thread already replaced the slot between our
            // read and this write; loop around and reconsider the new one.
        }
        Err(StrandError::Argument(
            "expiring reference exceeded its retry bound under contention".to_string(),
        ))
    }

    /// Forces the next `get` to recompute, regardless of what the predicate
    /// says.
    pub fn invalidate(&self) {
        self.slot.lock().unwrap().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lazy::TtlPredicate;
    use std::{sync::atomic::{AtomicUsize, Ordering}, thread, time::Duration};

    #[test]
    fn recomputes_once_the_predicate_goes_stale() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let expiring = ExpiringLazy::new(
            move || {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StrandError>(calls2.load(Ordering::SeqCst))
            },
            || Arc::new(TtlPredicate::new(Duration::from_millis(20))) as Arc<dyn LivenessPredicate>,
        );
        let first = *expiring.get().unwrap();
        assert_eq!(first, 1);
        assert_eq!(*expiring.get().unwrap(), 1); // still fresh, no recompute
        thread::sleep(Duration::from_millis(35));
        let second = *expiring.get().unwrap();
        assert_eq!(second, 2);
    }

    #[test]
    fn invalidate_forces_recomputation_even_if_fresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let expiring = ExpiringLazy::new(
            move || {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StrandError>(())
            },
            || Arc::new(TtlPredicate::new(Duration::from_secs(60))) as Arc<dyn LivenessPredicate>,
        );
        expiring.get().unwrap();
        expiring.invalidate();
        expiring.get().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
