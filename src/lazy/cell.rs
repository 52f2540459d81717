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

//! One-shot lazy initialization.

use std::{panic,
          sync::{Arc, Condvar, Mutex}};

use crate::{cancel::{CancelToken, INTERRUPT_POLL_INTERVAL},
            error::{PanicPayload, StrandError, StrandResult}};

enum State<V> {
    Uninitialized,
    Initializing,
    Ready(Arc<V>),
    Failed(StrandError),
    Cancelled,
}

/// A cell that runs its factory at most once. Concurrent callers racing on
/// [`Lazy::get`] block on whichever one of them won the race to run the
/// factory rather than each running it themselves; the result (success,
/// failure, or cancellation) is frozen and replayed to every later caller.
#[derive(Default)]
pub struct Lazy<V> {
    state: Mutex<State<V>>,
    cv: Condvar,
}

impl<V> Default for State<V> {
    fn default() -> Self {
        State::Uninitialized
    }
}

impl<V> Lazy<V> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Uninitialized),
            cv: Condvar::new(),
        }
    }

    /// Returns the memoized value, computing it with `factory` if this is the
    /// first (non-cancelled) call. `factory` is never called more than once;
    /// a panic inside it is caught and surfaces as
    /// [`StrandError::InitializationFailed`] to every caller, including the
    /// one that triggered it.
    pub fn get<F>(&self, factory: F) -> StrandResult<Arc<V>>
    where
        F: FnOnce() -> StrandResult<V>,
    {
        self.get_impl(factory, None)
    }

    /// As [`Self::get`], but surfaces [`StrandError::Interrupted`] the moment
    /// `token` is cancelled while this call is blocked on another thread's
    /// in-flight factory, instead of re-entering the wait. Does not apply
    /// once this call itself has won the race to run `factory` — a running
    /// factory cannot be interrupted, only a wait for someone else's can.
    pub fn get_interruptibly<F>(&self, factory: F, token: &CancelToken) -> StrandResult<Arc<V>>
    where
        F: FnOnce() -> StrandResult<V>,
    {
        self.get_impl(factory, Some(token))
    }

    fn get_impl<F>(&self, factory: F, token: Option<&CancelToken>) -> StrandResult<Arc<V>>
    where
        F: FnOnce() -> StrandResult<V>,
    {
        loop {
            let mut guard = self.state.lock().unwrap();
            match &*guard {
                State::Ready(v) => return Ok(Arc::clone(v)),
                State::Failed(e) => return Err(e.clone()),
                State::Cancelled => return Err(StrandError::Cancelled),
                State::Initializing => {
                    match token {
                        None => {
                            tracing::trace!("blocking on lazy cell already initializing");
                            guard = self.cv.wait(guard).unwrap();
                        }
                        Some(token) => {
                            if token.is_cancelled() {
                                tracing::debug!("lazy cell get interrupted");
                                return Err(StrandError::Interrupted);
                            }
                            tracing::trace!("blocking on lazy cell already initializing (interruptible)");
                            let (next_guard, _) =
                                self.cv.wait_timeout(guard, INTERRUPT_POLL_INTERVAL).unwrap();
                            guard = next_guard;
                        }
                    }
                    drop(guard);
                    continue;
                }
                State::Uninitialized => {
                    *guard = State::Initializing;
                    drop(guard);
                    let outcome = panic::catch_unwind(panic::AssertUnwindSafe(factory));
                    let mut guard = self.state.lock().unwrap();
                    let (new_state, result) = match outcome {
                        Ok(Ok(value)) => {
                            tracing::debug!("lazy cell initialized");
                            let value = Arc::new(value);
                            (State::Ready(Arc::clone(&value)), Ok(value))
                        }
                        Ok(Err(e)) => {
                            tracing::debug!(error = %e, "lazy cell factory returned an error");
                            (State::Failed(e.clone()), Err(e))
                        }
                        Err(payload) => {
                            let e = StrandError::initialization_failed(PanicPayload::from_box(payload));
                            tracing::debug!(error = %e, "lazy cell factory panicked");
                            (State::Failed(e.clone()), Err(e))
                        }
                    };
                    *guard = new_state;
                    drop(guard);
                    self.cv.notify_all();
                    return result;
                }
            }
        }
    }

    /// Cancels the cell if it hasn't started initializing yet. Returns
    /// `false` if initialization is already underway or the cell is already
    /// terminal — cancellation cannot interrupt a factory already running.
    pub fn cancel(&self) -> bool {
        let mut guard = self.state.lock().unwrap();
        if matches!(*guard, State::Uninitialized) {
            *guard = State::Cancelled;
            drop(guard);
            self.cv.notify_all();
            true
        } else {
            false
        }
    }

    pub fn is_done(&self) -> bool {
        !matches!(*self.state.lock().unwrap(), State::Uninitialized | State::Initializing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::atomic::{AtomicUsize, Ordering}, thread};

    #[test]
    fn factory_runs_exactly_once_under_contention() {
        let cell = Arc::new(Lazy::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cell = Arc::clone(&cell);
            let calls = Arc::clone(&calls);
            handles.push(thread::spawn(move || {
                cell.get(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(std::time::Duration::from_millis(10));
                    Ok::<_, StrandError>(42)
                })
            }));
        }
        for handle in handles {
            assert_eq!(*handle.join().unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_is_replayed_without_rerunning_the_factory() {
        let cell: Lazy<u32> = Lazy::new();
        let calls = AtomicUsize::new(0);
        let first = cell.get(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StrandError::Argument("bad".into()))
        });
        assert!(first.is_err());
        let second = cell.get(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });
        assert!(second.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_factory_surfaces_as_initialization_failed() {
        let cell: Lazy<u32> = Lazy::new();
        let result = cell.get(|| -> StrandResult<u32> { panic!("kaboom") });
        match result {
            Err(StrandError::InitializationFailed(cause)) => {
                assert!(cause.to_string().contains("kaboom"));
            }
            other => panic!("expected InitializationFailed, got {other:?}"),
        }
    }

    #[test]
    fn cancel_before_first_access_short_circuits_get() {
        let cell: Lazy<u32> = Lazy::new();
        assert!(cell.cancel());
        assert!(matches!(cell.get(|| Ok(1)), Err(StrandError::Cancelled)));
    }

    #[test]
    fn get_interruptibly_stops_waiting_on_someone_elses_factory() {
        let cell = Arc::new(Lazy::new());
        let token = crate::cancel::CancelToken::new();

        let cell2 = Arc::clone(&cell);
        let runner = thread::spawn(move || {
            cell2.get(|| {
                thread::sleep(std::time::Duration::from_millis(200));
                Ok::<_, StrandError>(1)
            })
        });
        thread::sleep(std::time::Duration::from_millis(20));

        let token2 = token.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(20));
            token2.cancel();
        });

        let result = cell.get_interruptibly(|| Ok(2), &token);
        assert!(matches!(result, Err(StrandError::Interrupted)));

        canceller.join().unwrap();
        assert_eq!(*runner.join().unwrap().unwrap(), 1);
    }
}
