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

//! Concurrency primitives for coordinating work across OS threads: composable
//! promises, reusable latches, memoizing references, weak-reference caches,
//! lock striping, and a completion-order job runner.
//!
//! Nothing in this crate spawns a background runtime on your behalf — every
//! blocking primitive takes a plain [`std::sync`] wait, and everything that
//! runs jobs does so through the [`executor::Executor`] you hand it. Start
//! with [`promise`] for a `CompletableFuture`-style settable future,
//! [`sync`] for reusable latches and a single-slot blocking reference,
//! [`lazy`] for memoizing references, [`memo`] for weak caches and lock
//! striping, and [`completer`] for running a batch of jobs and consuming
//! results as they finish.

pub mod cancel;
pub mod completer;
pub mod decl_macros;
pub mod error;
pub mod executor;
pub mod lazy;
pub mod logging;
pub mod memo;
pub mod promise;
pub mod sync;
pub mod thread_factory;
pub mod timeout;

pub use cancel::CancelToken;
pub use completer::{AsyncCompleter, AsyncCompleterBuilder, CompletionOrderIter, ExceptionPolicy};
pub use decl_macros::*;
pub use error::{StrandError, StrandResult};
pub use executor::{Executor, Executors, ImmediateExecutor, Job, LimitedExecutor, Submitter, ThreadPoolExecutor};
pub use lazy::{ExpiringLazy, Lazy, LivenessPredicate, ResettableLazy, TtiPredicate, TtlPredicate};
pub use memo::{ManagedLock, ManagedRwLock, WeakManagedLockFactory, WeakManagedRwLockFactory, WeakMemoizer};
pub use promise::{when, CompletablePromise, Outcome, Promise};
pub use sync::{BlockingReference, BooleanLatch, MultiReaderRef, PhasedLatch, SingleReaderRef};
pub use thread_factory::{ThreadFactory, ThreadFactoryBuilder, ThreadPriority};
pub use timeout::{Timeout, TimeoutFactory};
