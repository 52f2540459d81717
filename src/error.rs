/*
 *   Copyright (c) 2022 R3BL LLC
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

//! The error taxonomy shared by every component in this crate.
//!
//! There is a single public error enum, [`StrandError`], rather than one type per
//! component. Each blocking call in the crate (latch `await`, promise `claim`,
//! lazy `get`, completer iteration) surfaces exactly one of these variants from
//! the call that observed the failure — never from an unrelated call. See the
//! crate-level docs for the propagation policy.

use std::{error::Error as StdError, fmt, sync::Arc};

/// Type alias to make it easy to work with [`Result`]s, one error type for
/// the whole crate rather than one per module.
pub type StrandResult<T> = Result<T, StrandError>;

/// The original cause of an [`StrandError::ExecutionFailed`] or
/// [`StrandError::InitializationFailed`]. Carried directly, never double-wrapped
/// (see the "wrapper-cause unwrapping" design note) — callers that pattern-match
/// on the cause see the real error, not a `CompletionException`-shaped box around
/// another box. An [`Arc`], not a [`Box`], because a [`Lazy`](crate::lazy::Lazy)
/// cell or a settled [`Promise`](crate::promise::Promise) freezes its terminal
/// error and replays it to every later caller — that requires `StrandError`
/// itself to be `Clone`.
pub type Cause = std::sync::Arc<dyn StdError + Send + Sync + 'static>;

/// The six error kinds this crate's API surfaces. Recoverable failures
/// (cancellation, and execution failures under the `Ignore` exception policy) are
/// handled internally and never reach this enum; everything else is surfaced here.
#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic)]
pub enum StrandError {
    /// A timed wait (latch, blocking reference, or async-completer batch) expired
    /// before the awaited condition became true. Carries the original budget so
    /// callers can log or retry with the same unit they configured.
    #[error("timed out after {budget} {unit}")]
    #[diagnostic(
        code(strand::timed_out),
        help("increase the timeout budget, or check whether the awaited work is stuck")
    )]
    TimedOut {
        budget: u64,
        unit: &'static str,
    },

    /// A blocking wait was asked to stop via a [`crate::cancel::CancelToken`]
    /// before its condition became true. This is this crate's analogue of a
    /// JVM `InterruptedException`: Rust threads have no OS-level interrupt flag,
    /// so cooperative cancellation tokens are checked at every suspension point
    /// instead.
    #[error("blocking wait was cancelled before it completed")]
    #[diagnostic(code(strand::interrupted))]
    Interrupted,

    /// A job body run by an [`crate::executor::Executor`] returned an error or
    /// panicked. The original cause is carried directly (see [`Cause`]); under
    /// the async completer's `Ignore` exception policy this variant never
    /// surfaces, it is converted to a filtered-out placeholder instead.
    #[error("job execution failed: {0}")]
    #[diagnostic(code(strand::execution_failed), help("see the wrapped cause for the job's own error"))]
    ExecutionFailed(#[source] Cause),

    /// A [`crate::lazy`] factory returned an error or panicked while computing
    /// the cached value. Subsequent `get` calls on the same cell re-surface this
    /// same error without re-running the factory (state is frozen once terminal).
    #[error("lazy initialization failed: {0}")]
    #[diagnostic(code(strand::initialization_failed))]
    InitializationFailed(#[source] Cause),

    /// A promise, future handle, or lazy cell was cancelled before it reached a
    /// terminal value. Cancellation is best-effort and non-blocking; this is the
    /// terminal state observed by callers after the fact, not an exception
    /// raised mid-flight.
    #[error("operation was cancelled")]
    #[diagnostic(code(strand::cancelled))]
    Cancelled,

    /// A caller-supplied argument was invalid: `None`/null passed where a value
    /// was required (e.g. `BlockingReference::set`), a negative parallelism
    /// limit, or similar caller-side misuse.
    #[error("invalid argument: {0}")]
    #[diagnostic(code(strand::argument))]
    Argument(String),
}

impl StrandError {
    /// Constructs an [`StrandError::ExecutionFailed`] from any `Send + Sync`
    /// error, boxing it without an extra layer of wrapping.
    pub fn execution_failed<E>(cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        StrandError::ExecutionFailed(std::sync::Arc::new(cause))
    }

    /// Constructs an [`StrandError::InitializationFailed`] from any `Send + Sync`
    /// error.
    pub fn initialization_failed<E>(cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        StrandError::InitializationFailed(std::sync::Arc::new(cause))
    }

    /// True for the two kinds that carry a [`Cause`] (execution/initialization
    /// failure); these are the only variants `fail`/`recover`/`fold` style
    /// combinators unwrap to hand callers the underlying error.
    pub fn is_wrapped_cause(&self) -> bool {
        matches!(
            self,
            StrandError::ExecutionFailed(_) | StrandError::InitializationFailed(_)
        )
    }

    /// Strips one layer of wrapping if this is an `ExecutionFailed` /
    /// `InitializationFailed` whose cause is itself a `StrandError` — the
    /// case where a promise or lazy reference nested inside another job
    /// failed, and the outer one boxed that failure up as its own cause
    /// rather than propagating it directly. Anything else (including a
    /// wrapped cause that *isn't* a `StrandError`, e.g. a panic payload) is
    /// returned unchanged. `claim`/`fail`/`then`/`recover`/`fold` call this
    /// on every error they hand to a caller so nobody has to unwrap a
    /// wrapper around a wrapper to find the real cause.
    pub fn unwrap_cause(self) -> Self {
        if !self.is_wrapped_cause() {
            return self;
        }
        let cause = match &self {
            StrandError::ExecutionFailed(cause) | StrandError::InitializationFailed(cause) => {
                Arc::clone(cause)
            }
            _ => unreachable!("is_wrapped_cause guards this match"),
        };
        match (&*cause as &(dyn StdError + 'static)).downcast_ref::<StrandError>() {
            Some(inner) => inner.clone(),
            None => self,
        }
    }
}

/// A panic payload captured via `std::panic::catch_unwind`, downcast to a
/// human-readable message where possible. Rust threads have no built-in
/// uncaught-exception handler the way a JVM thread does, so every job run by a
/// [`crate::executor::Executor`] and every factory invoked by a
/// [`crate::lazy`] cell is wrapped in `catch_unwind`; a panic is converted to
/// this type and then into [`StrandError::ExecutionFailed`] /
/// [`StrandError::InitializationFailed`] exactly as a returned `Err` would be.
#[derive(Debug, Clone)]
pub struct PanicPayload {
    pub message: String,
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job panicked: {}", self.message)
    }
}

impl StdError for PanicPayload {}

impl PanicPayload {
    pub fn from_box(payload: Box<dyn std::any::Any + Send>) -> Self {
        Self::from_box_ref(&payload)
    }

    /// As [`Self::from_box`], but borrows rather than consumes — for callers
    /// that need to inspect the payload and then resume unwinding it (e.g. a
    /// [`crate::thread_factory::ThreadFactoryBuilder::on_panic`] hook).
    pub fn from_box_ref(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        PanicPayload { message }
    }
}
