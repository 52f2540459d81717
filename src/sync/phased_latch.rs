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

use std::sync::{Condvar, Mutex};

use crate::{cancel::{CancelToken, INTERRUPT_POLL_INTERVAL},
            error::{StrandError, StrandResult},
            timeout::Timeout};

/// A latch that every waiter observes, as many times as it's released.
/// `release` advances a phase counter and wakes everybody currently waiting
/// on the phase they arrived at; unlike [`crate::sync::BooleanLatch`], no
/// waiter consumes the release for the others.
#[derive(Debug, Default)]
pub struct PhasedLatch {
    phase: Mutex<u64>,
    cv: Condvar,
}

/// `true` if `current` is strictly ahead of `observed_at`, accounting for
/// wraparound the way TCP sequence numbers do.
fn phase_advanced(current: u64, observed_at: u64) -> bool {
    (current.wrapping_sub(observed_at) as i64) > 0
}

impl PhasedLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_phase(&self) -> u64 {
        *self.phase.lock().unwrap()
    }

    /// Advances the phase and wakes every current waiter. Returns the new
    /// phase.
    pub fn release(&self) -> u64 {
        let mut guard = self.phase.lock().unwrap();
        *guard = guard.wrapping_add(1);
        let new_phase = *guard;
        drop(guard);
        self.cv.notify_all();
        new_phase
    }

    /// Blocks until the phase has advanced past `observed_at`.
    pub fn await_phase(&self, observed_at: u64) {
        let mut guard = self.phase.lock().unwrap();
        while !phase_advanced(*guard, observed_at) {
            guard = self.cv.wait(guard).unwrap();
        }
    }

    /// Like [`Self::await_phase`], but surfaces [`StrandError::Interrupted`]
    /// the moment `token` is cancelled instead of re-entering the wait.
    pub fn await_phase_interruptibly(&self, observed_at: u64, token: &CancelToken) -> StrandResult<()> {
        let mut guard = self.phase.lock().unwrap();
        loop {
            if phase_advanced(*guard, observed_at) {
                return Ok(());
            }
            if token.is_cancelled() {
                tracing::debug!(observed_at, "phased latch await interrupted");
                return Err(StrandError::Interrupted);
            }
            let (next_guard, _) = self.cv.wait_timeout(guard, INTERRUPT_POLL_INTERVAL).unwrap();
            guard = next_guard;
        }
    }

    pub fn await_phase_timeout(&self, observed_at: u64, timeout: &Timeout) -> StrandResult<()> {
        let mut guard = self.phase.lock().unwrap();
        loop {
            if phase_advanced(*guard, observed_at) {
                return Ok(());
            }
            let remaining = timeout.remaining();
            if remaining.is_zero() {
                tracing::debug!(observed_at, "phased latch await timed out");
                return Err(timeout.err_timed_out());
            }
            let (next_guard, _) = self.cv.wait_timeout(guard, remaining).unwrap();
            guard = next_guard;
        }
    }

    /// Blocks until the *next* release after this call, whatever phase that
    /// turns out to be.
    pub fn await_next(&self) {
        let observed_at = self.current_phase();
        self.await_phase(observed_at);
    }

    pub fn await_next_timeout(&self, timeout: &Timeout) -> StrandResult<()> {
        let observed_at = self.current_phase();
        self.await_phase_timeout(observed_at, timeout)
    }

    pub fn await_next_interruptibly(&self, token: &CancelToken) -> StrandResult<()> {
        let observed_at = self.current_phase();
        self.await_phase_interruptibly(observed_at, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread, time::Duration};

    #[test]
    fn every_waiter_observes_one_release() {
        let latch = Arc::new(PhasedLatch::new());
        let (tx, rx) = std::sync::mpsc::channel();
        for _ in 0..4 {
            let latch = Arc::clone(&latch);
            let tx = tx.clone();
            thread::spawn(move || {
                latch.await_next();
                tx.send(()).unwrap();
            });
        }
        thread::sleep(Duration::from_millis(20));
        latch.release();
        for _ in 0..4 {
            assert!(rx.recv_timeout(Duration::from_millis(200)).is_ok());
        }
    }

    #[test]
    fn await_phase_returns_immediately_if_already_advanced() {
        let latch = PhasedLatch::new();
        let observed_at = latch.current_phase();
        latch.release();
        latch.await_phase(observed_at); // must not block
    }

    #[test]
    fn await_phase_timeout_expires_without_a_release() {
        let latch = PhasedLatch::new();
        let observed_at = latch.current_phase();
        let timeout = Timeout::from_millis(20);
        assert!(latch.await_phase_timeout(observed_at, &timeout).is_err());
    }

    #[test]
    fn await_next_interruptibly_surfaces_interrupted() {
        let latch = Arc::new(PhasedLatch::new());
        let token = crate::cancel::CancelToken::new();
        let latch2 = Arc::clone(&latch);
        let token2 = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            token2.cancel();
        });
        let result = latch2.await_next_interruptibly(&token);
        handle.join().unwrap();
        assert!(matches!(result, Err(crate::error::StrandError::Interrupted)));
    }
}
