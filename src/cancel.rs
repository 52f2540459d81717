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

//! A cooperative cancellation flag, shared between whoever requests cancellation
//! and whoever is in a position to check for it.
//!
//! Rust threads have no OS-level "interrupt flag" the way a JVM thread does, so
//! every blocking wait in this crate that needs to be best-effort-cancellable
//! (a queued job, a `flatMap`'d inner promise, a `when` aggregate's children)
//! checks a [`CancelToken`] rather than relying on interruption. Using
//! [`AtomicBool`] (not a [`Mutex<bool>`]) keeps the check lock-free so it can be
//! polled from a completion callback without risking nested locking.

use std::{sync::{atomic::{AtomicBool, Ordering},
                 Arc},
          time::Duration};

/// How often an interruptible blocking wait re-checks its [`CancelToken`]
/// between condvar wakeups. The token itself has no way to wake a sleeping
/// waiter, so interruptible waits poll on this cadence rather than blocking
/// indefinitely between checks.
pub(crate) const INTERRUPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A shared, clonable cancellation flag. Cloning a token gives another handle to
/// the *same* underlying flag — it does not create an independent one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Requests cancellation. Idempotent; best-effort and non-blocking — it does
    /// not wait for whoever is checking the token to notice.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
