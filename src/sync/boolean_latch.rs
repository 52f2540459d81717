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

use std::{sync::{Condvar, Mutex},
          time::Duration};

use crate::{cancel::{CancelToken, INTERRUPT_POLL_INTERVAL},
            error::{StrandError, StrandResult},
            timeout::Timeout};

/// A reusable boolean latch: `release` wakes exactly one waiter, and the
/// latch resets to unavailable the instant that waiter consumes it. Unlike
/// `std::sync::Barrier` this can be released and awaited any number of times;
/// unlike a condvar used bare, releases that race ahead of an `await` are not
/// lost as long as at most one `release` happens between two `await`s.
#[derive(Debug, Default)]
pub struct BooleanLatch {
    available: Mutex<bool>,
    cv: Condvar,
}

impl BooleanLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the latch available and wakes exactly one waiter. A release
    /// with nobody waiting is remembered: the next `await` returns
    /// immediately instead of blocking.
    pub fn release(&self) {
        *self.available.lock().unwrap() = true;
        self.cv.notify_one();
    }

    /// Blocks until the latch is released, then consumes the release.
    pub fn await_latch(&self) {
        let mut guard = self.available.lock().unwrap();
        while !*guard {
            guard = self.cv.wait(guard).unwrap();
        }
        *guard = false;
    }

    /// Like [`Self::await_latch`], but stops re-entering the wait the moment
    /// `token` is cancelled, surfacing [`StrandError::Interrupted`] instead of
    /// blocking until release. A token already cancelled before the call is
    /// honored immediately.
    pub fn await_interruptibly(&self, token: &CancelToken) -> StrandResult<()> {
        let mut guard = self.available.lock().unwrap();
        loop {
            if *guard {
                *guard = false;
                return Ok(());
            }
            if token.is_cancelled() {
                tracing::debug!("boolean latch await interrupted");
                return Err(StrandError::Interrupted);
            }
            let (next_guard, _) = self.cv.wait_timeout(guard, INTERRUPT_POLL_INTERVAL).unwrap();
            guard = next_guard;
        }
    }

    /// Like [`Self::await_latch`], but gives up once `timeout`'s remaining
    /// budget is spent. The remaining budget is recomputed from `timeout` on
    /// every spurious wake, so a latch passed the same [`Timeout`] across
    /// several calls spends down one shared budget.
    pub fn await_timeout(&self, timeout: &Timeout) -> StrandResult<()> {
        let mut guard = self.available.lock().unwrap();
        loop {
            if *guard {
                *guard = false;
                return Ok(());
            }
            let remaining = timeout.remaining();
            if remaining.is_zero() {
                tracing::debug!("boolean latch await timed out");
                return Err(timeout.err_timed_out());
            }
            let (next_guard, _) = self.cv.wait_timeout(guard, remaining).unwrap();
            guard = next_guard;
        }
    }

    /// Fixed-duration convenience over [`Self::await_timeout`], for callers
    /// that don't need to share a budget across several waits.
    pub fn await_for(&self, duration: Duration) -> bool {
        self.await_timeout(&Timeout::from_duration(duration)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn release_wakes_a_blocked_waiter() {
        let latch = Arc::new(BooleanLatch::new());
        let latch2 = Arc::clone(&latch);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            latch2.release();
        });
        latch.await_latch();
        handle.join().unwrap();
    }

    #[test]
    fn release_before_await_is_remembered() {
        let latch = BooleanLatch::new();
        latch.release();
        latch.await_latch(); // must not block
    }

    #[test]
    fn exactly_one_waiter_is_released_per_release() {
        let latch = Arc::new(BooleanLatch::new());
        let (tx, rx) = std::sync::mpsc::channel();
        for _ in 0..3 {
            let latch = Arc::clone(&latch);
            let tx = tx.clone();
            thread::spawn(move || {
                latch.await_latch();
                tx.send(()).unwrap();
            });
        }
        thread::sleep(Duration::from_millis(20));
        latch.release();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_ok());
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn await_timeout_expires_when_never_released() {
        let latch = BooleanLatch::new();
        let timeout = Timeout::from_millis(20);
        assert!(latch.await_timeout(&timeout).is_err());
    }

    #[test]
    fn await_interruptibly_returns_interrupted_without_rewaiting() {
        let latch = Arc::new(BooleanLatch::new());
        let token = crate::cancel::CancelToken::new();
        let latch2 = Arc::clone(&latch);
        let token2 = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            token2.cancel();
        });
        let result = latch.await_interruptibly(&token);
        handle.join().unwrap();
        assert!(matches!(result, Err(crate::error::StrandError::Interrupted)));
        assert!(!*latch2.available.lock().unwrap());
    }

    #[test]
    fn await_interruptibly_succeeds_if_released_first() {
        let latch = BooleanLatch::new();
        let token = crate::cancel::CancelToken::new();
        latch.release();
        assert!(latch.await_interruptibly(&token).is_ok());
    }
}
