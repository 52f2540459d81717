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

//! A settable, composable future: [`CompletablePromise`] is the write side,
//! [`Promise`] the read side, and [`map`](Promise::map)/[`flat_map`](Promise::flat_map)/
//! [`recover`](Promise::recover)/[`fold`](Promise::fold) build new promises out
//! of existing ones without ever blocking the calling thread.
//!
//! Every promise in a derived chain shares the executor of the promise it was
//! derived from, so `p.map(f).map(g)` runs `f` and `g` on whatever executor
//! `p` was built with (inline, by default).

use std::{
    panic,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Condvar, Mutex,
    },
};

use crate::{
    cancel::{CancelToken, INTERRUPT_POLL_INTERVAL},
    error::{PanicPayload, StrandError, StrandResult},
    executor::{Executor, ImmediateExecutor},
};

/// The terminal value of a [`Promise`]: its value on success, or the error it
/// failed or was cancelled with (cancellation surfaces as [`StrandError::Cancelled`]).
pub type Outcome<V> = Result<Arc<V>, StrandError>;
type Callback<V> = Box<dyn FnOnce(Outcome<V>) + Send>;
type CancelHook = Box<dyn Fn(bool) + Send + Sync>;

enum State<V> {
    Pending,
    Fulfilled(Arc<V>),
    Rejected(StrandError),
    Cancelled,
}

struct Inner<V> {
    state: Mutex<State<V>>,
    cv: Condvar,
    callbacks: Mutex<Vec<Callback<V>>>,
    on_cancel: Mutex<Vec<CancelHook>>,
    executor: Arc<dyn Executor>,
}

impl<V: Send + Sync + 'static> Inner<V> {
    fn new(executor: Arc<dyn Executor>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::Pending),
            cv: Condvar::new(),
            callbacks: Mutex::new(Vec::new()),
            on_cancel: Mutex::new(Vec::new()),
            executor,
        })
    }

    /// Transitions out of `Pending`. Returns `false` (first setter wins,
    /// silently) if the promise was already terminal.
    fn complete(&self, new_state: State<V>) -> bool {
        {
            let mut guard = self.state.lock().unwrap();
            if !matches!(*guard, State::Pending) {
                return false;
            }
            *guard = new_state;
        }
        self.cv.notify_all();
        self.run_callbacks();
        true
    }

    fn snapshot_outcome(&self) -> Outcome<V> {
        match &*self.state.lock().unwrap() {
            State::Fulfilled(v) => Ok(Arc::clone(v)),
            State::Rejected(e) => Err(e.clone()),
            State::Cancelled => Err(StrandError::Cancelled),
            State::Pending => unreachable!("snapshot_outcome called on a pending promise"),
        }
    }

    fn run_callbacks(&self) {
        let callbacks = std::mem::take(&mut *self.callbacks.lock().unwrap());
        if callbacks.is_empty() {
            return;
        }
        let outcome = self.snapshot_outcome();
        for callback in callbacks {
            let outcome = outcome.clone();
            self.executor.execute(Box::new(move || callback(outcome)));
        }
    }

    fn on_complete(&self, callback: Callback<V>) {
        // Hold `callbacks` across the pending check so a `complete()` racing
        // on another thread can't drain the queue between the check and the
        // push: either this lands before that drain (and runs with the rest)
        // or the state was already terminal and we take the immediate path.
        let mut callbacks = self.callbacks.lock().unwrap();
        if matches!(*self.state.lock().unwrap(), State::Pending) {
            callbacks.push(callback);
            return;
        }
        drop(callbacks);
        let outcome = self.snapshot_outcome();
        self.executor.execute(Box::new(move || callback(outcome)));
    }

    fn claim(&self) -> StrandResult<Arc<V>> {
        let mut guard = self.state.lock().unwrap();
        loop {
            match &*guard {
                State::Pending => {
                    tracing::trace!("blocking on promise claim");
                    guard = self.cv.wait(guard).unwrap();
                }
                State::Fulfilled(v) => return Ok(Arc::clone(v)),
                State::Rejected(e) => return Err(e.clone().unwrap_cause()),
                State::Cancelled => return Err(StrandError::Cancelled),
            }
        }
    }

    /// As [`Self::claim`], but surfaces [`StrandError::Interrupted`] the
    /// moment `token` is cancelled instead of re-entering the wait.
    fn claim_interruptibly(&self, token: &CancelToken) -> StrandResult<Arc<V>> {
        let mut guard = self.state.lock().unwrap();
        loop {
            match &*guard {
                State::Pending => {
                    if token.is_cancelled() {
                        tracing::debug!("promise claim interrupted");
                        return Err(StrandError::Interrupted);
                    }
                    tracing::trace!("blocking on promise claim (interruptible)");
                    let (next_guard, _) = self.cv.wait_timeout(guard, INTERRUPT_POLL_INTERVAL).unwrap();
                    guard = next_guard;
                }
                State::Fulfilled(v) => return Ok(Arc::clone(v)),
                State::Rejected(e) => return Err(e.clone().unwrap_cause()),
                State::Cancelled => return Err(StrandError::Cancelled),
            }
        }
    }

    fn cancel(&self, interrupt_running: bool) -> bool {
        let did = self.complete(State::Cancelled);
        if did {
            tracing::debug!(interrupt_running, "promise cancelled");
            for hook in std::mem::take(&mut *self.on_cancel.lock().unwrap()) {
                hook(interrupt_running);
            }
        }
        did
    }
}

/// Runs `f`, converting a panic into an [`StrandError::ExecutionFailed`]
/// instead of unwinding across the promise callback boundary.
fn run_captured<F, R>(f: F) -> Result<R, StrandError>
where
    F: FnOnce() -> R,
{
    panic::catch_unwind(panic::AssertUnwindSafe(f))
        .map_err(|payload| StrandError::execution_failed(PanicPayload::from_box(payload)))
}

/// The write side of a promise: set its value or reject it exactly once.
pub struct CompletablePromise<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for CompletablePromise<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Send + Sync + 'static> CompletablePromise<V> {
    pub fn new() -> Self {
        Self::with_executor(Arc::new(ImmediateExecutor))
    }

    pub fn with_executor(executor: Arc<dyn Executor>) -> Self {
        Self {
            inner: Inner::new(executor),
        }
    }

    pub fn promise(&self) -> Promise<V> {
        Promise {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Fulfils the promise. Returns `false` if it was already terminal — the
    /// first caller to settle a promise wins, every later one is a silent
    /// no-op.
    pub fn set(&self, value: V) -> bool {
        self.inner.complete(State::Fulfilled(Arc::new(value)))
    }

    pub fn reject(&self, error: StrandError) -> bool {
        self.inner.complete(State::Rejected(error))
    }
}

impl<V: Send + Sync + 'static> Default for CompletablePromise<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// The read side of a promise.
pub struct Promise<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for Promise<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Send + Sync + 'static> Promise<V> {
    /// Blocks the calling thread until the promise reaches a terminal state.
    pub fn claim(&self) -> StrandResult<Arc<V>> {
        self.inner.claim()
    }

    /// As [`Self::claim`], but stops waiting and returns
    /// [`StrandError::Interrupted`] the moment `token` is cancelled, rather
    /// than blocking until the promise itself settles.
    pub fn claim_interruptibly(&self, token: &CancelToken) -> StrandResult<Arc<V>> {
        self.inner.claim_interruptibly(token)
    }

    pub fn is_done(&self) -> bool {
        !matches!(*self.inner.state.lock().unwrap(), State::Pending)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.inner.state.lock().unwrap(), State::Cancelled)
    }

    /// Requests cancellation. Best-effort: if a [`flat_map`](Self::flat_map)
    /// chain or a [`when`] aggregate depends on this promise, cancellation
    /// propagates to whatever it's currently waiting on.
    pub fn cancel(&self, interrupt_running: bool) -> bool {
        self.inner.cancel(interrupt_running)
    }

    /// Runs `f` with the value, only on success. Returns `self` so calls can
    /// be chained with [`fail`](Self::fail)/[`then`](Self::then).
    pub fn done<F>(self, f: F) -> Self
    where
        F: FnOnce(Arc<V>) + Send + 'static,
    {
        self.inner.on_complete(Box::new(move |outcome| {
            if let Ok(v) = outcome {
                f(v);
            }
        }));
        self
    }

    /// Runs `f` with the error, only on failure (including cancellation).
    pub fn fail<F>(self, f: F) -> Self
    where
        F: FnOnce(StrandError) + Send + 'static,
    {
        self.inner.on_complete(Box::new(move |outcome| {
            if let Err(e) = outcome {
                f(e.unwrap_cause());
            }
        }));
        self
    }

    /// Runs `f` with the full outcome, success or failure. A failure's cause
    /// is unwrapped the same way [`Self::fail`]'s is before `f` sees it.
    pub fn then<F>(self, f: F) -> Self
    where
        F: FnOnce(Outcome<V>) + Send + 'static,
    {
        self.inner
            .on_complete(Box::new(move |outcome| f(outcome.map_err(StrandError::unwrap_cause))));
        self
    }

    /// Transforms a successful value. A panic inside `f` rejects the derived
    /// promise rather than propagating.
    pub fn map<F, R>(&self, f: F) -> Promise<R>
    where
        F: FnOnce(Arc<V>) -> R + Send + 'static,
        R: Send + Sync + 'static,
    {
        let derived = CompletablePromise::<R>::with_executor(Arc::clone(&self.inner.executor));
        let out = derived.promise();
        self.inner.on_complete(Box::new(move |outcome| match outcome {
            Ok(v) => match run_captured(move || f(v)) {
                Ok(r) => {
                    derived.set(r);
                }
                Err(e) => {
                    derived.reject(e);
                }
            },
            Err(e) => {
                derived.reject(e);
            }
        }));
        out
    }

    /// Chains to a promise produced by `f`. Cancelling the derived promise
    /// propagates to whichever inner promise it is currently bound to.
    pub fn flat_map<F, R>(&self, f: F) -> Promise<R>
    where
        F: FnOnce(Arc<V>) -> Promise<R> + Send + 'static,
        R: Send + Sync + 'static,
    {
        let derived = CompletablePromise::<R>::with_executor(Arc::clone(&self.inner.executor));
        let out = derived.promise();
        let out_for_hook = out.clone();
        self.inner.on_complete(Box::new(move |outcome| match outcome {
            Ok(v) => match run_captured(move || f(v)) {
                Ok(inner_promise) => {
                    let for_cancel = inner_promise.clone();
                    out_for_hook
                        .inner
                        .on_cancel
                        .lock()
                        .unwrap()
                        .push(Box::new(move |interrupt| {
                            for_cancel.cancel(interrupt);
                        }));
                    let derived = derived.clone();
                    inner_promise
                        .inner
                        .on_complete(Box::new(move |inner_outcome| {
                            derived.inner.complete(match inner_outcome {
                                Ok(v) => State::Fulfilled(v),
                                Err(e) => State::Rejected(e),
                            });
                        }));
                }
                Err(e) => {
                    derived.reject(e);
                }
            },
            Err(e) => {
                derived.reject(e);
            }
        }));
        out
    }

    /// Supplies a replacement value on failure; a successful value passes
    /// through unchanged.
    pub fn recover<F>(&self, f: F) -> Promise<V>
    where
        F: FnOnce(StrandError) -> V + Send + 'static,
    {
        let derived = CompletablePromise::<V>::with_executor(Arc::clone(&self.inner.executor));
        let out = derived.promise();
        self.inner.on_complete(Box::new(move |outcome| match outcome {
            Ok(v) => {
                derived.inner.complete(State::Fulfilled(v));
            }
            Err(e) => match run_captured(move || f(e.unwrap_cause())) {
                Ok(v) => {
                    derived.set(v);
                }
                Err(e) => {
                    derived.reject(e);
                }
            },
        }));
        out
    }

    /// Total transform: `f` runs on success, `h` on failure, and exactly one
    /// of them runs. If `f` panics, `h` is given the resulting
    /// [`StrandError::ExecutionFailed`] as a fallback; if `h` itself panics,
    /// the derived promise is rejected.
    pub fn fold<H, F, R>(&self, h: H, f: F) -> Promise<R>
    where
        H: FnOnce(StrandError) -> R + Send + 'static,
        F: FnOnce(Arc<V>) -> R + Send + 'static,
        R: Send + Sync + 'static,
    {
        let derived = CompletablePromise::<R>::with_executor(Arc::clone(&self.inner.executor));
        let out = derived.promise();
        self.inner.on_complete(Box::new(move |outcome| {
            let result: Result<R, StrandError> = match outcome {
                Ok(v) => run_captured(move || f(v))
                    .or_else(|cause| run_captured(move || h(cause.unwrap_cause()))),
                Err(e) => run_captured(move || h(e.unwrap_cause())),
            };
            match result {
                Ok(r) => {
                    derived.set(r);
                }
                Err(e) => {
                    derived.reject(e);
                }
            }
        }));
        out
    }
}

/// Aggregates a batch of promises: fulfilled with every value (in input
/// order) once all succeed, or rejected with the first failure's cause while
/// every still-pending sibling is cancelled. An empty input is immediately
/// fulfilled with an empty vector.
pub fn when<V>(promises: Vec<Promise<V>>) -> Promise<Vec<Arc<V>>>
where
    V: Send + Sync + 'static,
{
    let executor: Arc<dyn Executor> = promises
        .first()
        .map(|p| Arc::clone(&p.inner.executor))
        .unwrap_or_else(|| Arc::new(ImmediateExecutor));
    let derived = CompletablePromise::<Vec<Arc<V>>>::with_executor(executor);
    let out = derived.promise();

    if promises.is_empty() {
        derived.set(Vec::new());
        return out;
    }

    let total = promises.len();
    let promises = Arc::new(promises);
    let results: Arc<Mutex<Vec<Option<Arc<V>>>>> = Arc::new(Mutex::new(vec![None; total]));
    let remaining = Arc::new(AtomicUsize::new(total));
    let failed = Arc::new(AtomicBool::new(false));

    {
        let siblings = Arc::clone(&promises);
        out.inner
            .on_cancel
            .lock()
            .unwrap()
            .push(Box::new(move |interrupt| {
                for sibling in siblings.iter() {
                    sibling.cancel(interrupt);
                }
            }));
    }

    for (index, promise) in promises.iter().enumerate() {
        let derived = derived.clone();
        let results = Arc::clone(&results);
        let remaining = Arc::clone(&remaining);
        let failed = Arc::clone(&failed);
        let siblings = Arc::clone(&promises);
        promise.inner.on_complete(Box::new(move |outcome| match outcome {
            Ok(v) => {
                let all_in = {
                    let mut guard = results.lock().unwrap();
                    guard[index] = Some(v);
                    remaining.fetch_sub(1, Ordering::AcqRel) == 1
                };
                if all_in && !failed.load(Ordering::Acquire) {
                    let guard = results.lock().unwrap();
                    let finals: Vec<Arc<V>> = guard.iter().cloned().map(|v| v.unwrap()).collect();
                    derived.inner.complete(State::Fulfilled(Arc::new(finals)));
                }
            }
            Err(e) => {
                if !failed.swap(true, Ordering::AcqRel) {
                    for sibling in siblings.iter() {
                        sibling.cancel(false);
                    }
                    derived.inner.complete(State::Rejected(e));
                }
            }
        }));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn claim_blocks_until_set() {
        let completable = CompletablePromise::<u32>::new();
        let promise = completable.promise();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            completable.set(42);
        });
        assert_eq!(*promise.claim().unwrap(), 42);
        handle.join().unwrap();
    }

    #[test]
    fn second_set_is_a_silent_no_op() {
        let completable = CompletablePromise::<u32>::new();
        assert!(completable.set(1));
        assert!(!completable.set(2));
        assert_eq!(*completable.promise().claim().unwrap(), 1);
    }

    #[test]
    fn map_transforms_the_value() {
        let completable = CompletablePromise::<u32>::new();
        let mapped = completable.promise().map(|v| *v * 2);
        completable.set(21);
        assert_eq!(*mapped.claim().unwrap(), 42);
    }

    #[test]
    fn map_turns_a_panic_into_execution_failed() {
        let completable = CompletablePromise::<u32>::new();
        let mapped = completable.promise().map(|_| -> u32 { panic!("boom") });
        completable.set(1);
        match mapped.claim() {
            Err(StrandError::ExecutionFailed(cause)) => assert!(cause.to_string().contains("boom")),
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
    }

    #[test]
    fn flat_map_chains_to_the_inner_promise() {
        let outer = CompletablePromise::<u32>::new();
        let chained = outer.promise().flat_map(|v| {
            let inner = CompletablePromise::<u32>::new();
            inner.set(*v + 1);
            inner.promise()
        });
        outer.set(41);
        assert_eq!(*chained.claim().unwrap(), 42);
    }

    #[test]
    fn recover_replaces_a_failure() {
        let completable = CompletablePromise::<u32>::new();
        let recovered = completable.promise().recover(|_| 7);
        completable.reject(StrandError::Argument("bad".into()));
        assert_eq!(*recovered.claim().unwrap(), 7);
    }

    #[test]
    fn fold_runs_exactly_one_branch() {
        let ok = CompletablePromise::<u32>::new();
        ok.set(10);
        let folded_ok = ok.promise().fold(|_| 0u32, |v| *v + 1);
        assert_eq!(*folded_ok.claim().unwrap(), 11);

        let err = CompletablePromise::<u32>::new();
        err.reject(StrandError::Cancelled);
        let folded_err = err.promise().fold(|_| 99u32, |v| *v + 1);
        assert_eq!(*folded_err.claim().unwrap(), 99);
    }

    #[test]
    fn when_aggregates_in_order() {
        let a = CompletablePromise::<u32>::new();
        let b = CompletablePromise::<u32>::new();
        let aggregate = when(vec![a.promise(), b.promise()]);
        b.set(2);
        a.set(1);
        let values: Vec<u32> = aggregate.claim().unwrap().iter().map(|v| **v).collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn when_rejects_and_cancels_siblings_on_first_failure() {
        let a = CompletablePromise::<u32>::new();
        let b = CompletablePromise::<u32>::new();
        let b_promise = b.promise();
        let aggregate = when(vec![a.promise(), b_promise.clone()]);
        a.reject(StrandError::Argument("bad".into()));
        assert!(aggregate.claim().is_err());
        assert!(b_promise.is_cancelled());
    }

    #[test]
    fn when_with_no_promises_is_immediately_fulfilled() {
        let aggregate: Promise<Vec<Arc<u32>>> = when(Vec::new());
        assert!(aggregate.claim().unwrap().is_empty());
    }

    #[test]
    fn claim_interruptibly_surfaces_interrupted_without_rewaiting() {
        let completable = CompletablePromise::<u32>::new();
        let promise = completable.promise();
        let token = crate::cancel::CancelToken::new();
        let token2 = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            token2.cancel();
        });
        let result = promise.claim_interruptibly(&token);
        handle.join().unwrap();
        assert!(matches!(result, Err(StrandError::Interrupted)));
        // The promise itself is still pending; interruption didn't settle it.
        assert!(!promise.is_done());
        completable.set(1);
    }

    #[test]
    fn claim_interruptibly_succeeds_if_already_settled() {
        let completable = CompletablePromise::<u32>::new();
        completable.set(7);
        let token = crate::cancel::CancelToken::new();
        assert_eq!(*completable.promise().claim_interruptibly(&token).unwrap(), 7);
    }

    #[test]
    fn fail_and_claim_unwrap_a_nested_strand_error_cause() {
        let completable = CompletablePromise::<u32>::new();
        completable.reject(StrandError::execution_failed(StrandError::Argument("bad".into())));

        match completable.promise().claim() {
            Err(StrandError::Argument(msg)) => assert_eq!(msg, "bad"),
            other => panic!("expected unwrapped Argument, got {other:?}"),
        }

        let completable2 = CompletablePromise::<u32>::new();
        let (tx, rx) = std::sync::mpsc::channel();
        completable2.promise().fail(move |e| {
            tx.send(e).unwrap();
        });
        completable2.reject(StrandError::execution_failed(StrandError::Argument("bad".into())));
        match rx.recv().unwrap() {
            StrandError::Argument(msg) => assert_eq!(msg, "bad"),
            other => panic!("expected unwrapped Argument, got {other:?}"),
        }
    }

    #[test]
    fn recover_receives_the_unwrapped_cause() {
        let completable = CompletablePromise::<u32>::new();
        let recovered = completable.promise().recover(|e| match e {
            StrandError::Argument(msg) if msg == "bad" => 1,
            _ => 0,
        });
        completable.reject(StrandError::execution_failed(StrandError::Argument("bad".into())));
        assert_eq!(*recovered.claim().unwrap(), 1);
    }
}
