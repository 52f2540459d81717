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

//! The job-running seam every [`crate::promise`] and [`crate::completer`] type
//! is built against.
//!
//! Nothing in this crate's core data structures spawns threads directly — they
//! all take an [`Executor`] trait object and hand it boxed jobs. That keeps the
//! blocking primitives (latches, promises) agnostic to *how* work actually
//! runs: inline on the completing thread ([`ImmediateExecutor`]), on a fixed
//! worker pool ([`ThreadPoolExecutor`]), or behind a parallelism cap
//! ([`LimitedExecutor`]).

use std::{collections::VecDeque,
          panic,
          sync::{Arc, Mutex},
          thread};

use tokio::sync::Semaphore;

use crate::{error::{StrandError, StrandResult},
            promise::{CompletablePromise, Promise},
            thread_factory::ThreadFactory};

/// A unit of work handed to an [`Executor`]. Jobs are responsible for their own
/// error handling — an `Executor` only promises to *run* the job, not to
/// report how it went; that's what [`crate::promise`] and
/// [`crate::completer`] build on top of it for.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    fn execute(&self, job: Job);
}

/// Runs every job synchronously, on whichever thread calls `execute`. This is
/// the default executor for a bare [`crate::promise::CompletablePromise`] —
/// callbacks registered with `.done()`/`.then()` run inline unless a different
/// executor is supplied.
#[derive(Debug, Default)]
pub struct ImmediateExecutor;

impl Executor for ImmediateExecutor {
    fn execute(&self, job: Job) {
        job();
    }
}

/// A fixed pool of worker threads reading off a shared job queue. A panicking
/// job is caught and logged; it never takes down the worker thread.
pub struct ThreadPoolExecutor {
    sender: Option<std::sync::mpsc::Sender<Job>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl ThreadPoolExecutor {
    pub fn new(size: usize, factory: &ThreadFactory) -> StrandResult<Self> {
        if size == 0 {
            return Err(StrandError::Argument(
                "thread pool size must be positive".to_string(),
            ));
        }
        let (sender, receiver) = std::sync::mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::with_capacity(size);
        for _ in 0..size {
            let receiver = Arc::clone(&receiver);
            workers.push(factory.spawn(move || Self::worker_loop(&receiver)));
        }
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    fn worker_loop(receiver: &Arc<Mutex<std::sync::mpsc::Receiver<Job>>>) {
        loop {
            let job = receiver.lock().unwrap().recv();
            match job {
                Ok(job) => {
                    if let Err(payload) = panic::catch_unwind(panic::AssertUnwindSafe(job)) {
                        let message = crate::error::PanicPayload::from_box(payload);
                        tracing::warn!(%message, "job panicked inside ThreadPoolExecutor");
                    }
                }
                Err(_) => break,
            }
        }
    }
}

impl Executor for ThreadPoolExecutor {
    fn execute(&self, job: Job) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(job);
        }
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        // Dropping the sender closes the channel, which unblocks every worker's
        // `recv()` with an `Err` and lets `worker_loop` return.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Wraps a delegate executor with a permit count: at most `limit` jobs run
/// concurrently through it, the rest queue in submission order and are drained
/// one at a time as running jobs finish.
pub struct LimitedExecutor {
    delegate: Arc<dyn Executor>,
    semaphore: Arc<Semaphore>,
    overflow: Arc<Mutex<VecDeque<Job>>>,
}

impl LimitedExecutor {
    pub fn new(delegate: Arc<dyn Executor>, limit: usize) -> StrandResult<Self> {
        if limit == 0 {
            return Err(StrandError::Argument(
                "parallelism limit must be positive".to_string(),
            ));
        }
        Ok(Self {
            delegate,
            semaphore: Arc::new(Semaphore::new(limit)),
            overflow: Arc::new(Mutex::new(VecDeque::new())),
        })
    }

    fn drain_overflow(
        delegate: &Arc<dyn Executor>,
        semaphore: &Arc<Semaphore>,
        overflow: &Arc<Mutex<VecDeque<Job>>>,
    ) {
        let mut guard = overflow.lock().unwrap();
        let Some(job) = guard.pop_front() else {
            return;
        };
        let Ok(permit) = Arc::clone(semaphore).try_acquire_owned() else {
            guard.push_front(job);
            return;
        };
        drop(guard);

        let delegate_inner = Arc::clone(delegate);
        let semaphore_inner = Arc::clone(semaphore);
        let overflow_inner = Arc::clone(overflow);
        delegate.execute(Box::new(move || {
            job();
            drop(permit);
            LimitedExecutor::drain_overflow(&delegate_inner, &semaphore_inner, &overflow_inner);
        }));
    }
}

impl Executor for LimitedExecutor {
    fn execute(&self, job: Job) {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => {
                let delegate = Arc::clone(&self.delegate);
                let semaphore = Arc::clone(&self.semaphore);
                let overflow = Arc::clone(&self.overflow);
                self.delegate.execute(Box::new(move || {
                    job();
                    drop(permit);
                    LimitedExecutor::drain_overflow(&delegate, &semaphore, &overflow);
                }));
            }
            Err(_) => {
                self.overflow.lock().unwrap().push_back(job);
            }
        }
    }
}

/// Namespace for the handful of `Executor` compositions this crate ships,
/// kept as a small static-method namespace (`Executors::limited(...)`)
/// rather than free functions scattered across the crate root.
pub struct Executors;

impl Executors {
    pub fn limited(delegate: Arc<dyn Executor>, limit: usize) -> StrandResult<Arc<LimitedExecutor>> {
        Ok(Arc::new(LimitedExecutor::new(delegate, limit)?))
    }

    pub fn submitter(delegate: Arc<dyn Executor>) -> Submitter {
        Submitter { delegate }
    }
}

/// Turns plain fallible closures into [`Promise`]s, run through a configured
/// [`Executor`].
pub struct Submitter {
    delegate: Arc<dyn Executor>,
}

impl Submitter {
    pub fn submit<F, T>(&self, job: F) -> Promise<T>
    where
        F: FnOnce() -> StrandResult<T> + Send + 'static,
        T: Send + Sync + 'static,
    {
        let completable = CompletablePromise::<T>::new();
        let promise = completable.promise();
        self.delegate.execute(Box::new(move || {
            match panic::catch_unwind(panic::AssertUnwindSafe(job)) {
                Ok(Ok(value)) => {
                    completable.set(value);
                }
                Ok(Err(error)) => {
                    completable.reject(error);
                }
                Err(payload) => {
                    completable.reject(StrandError::execution_failed(
                        crate::error::PanicPayload::from_box(payload),
                    ));
                }
            }
        }));
        promise
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn immediate_executor_runs_inline() {
        let executor = ImmediateExecutor;
        let flag = Arc::new(AtomicUsize::new(0));
        let flag2 = Arc::clone(&flag);
        executor.execute(Box::new(move || {
            flag2.store(1, Ordering::SeqCst);
        }));
        assert_eq!(flag.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn thread_pool_executor_runs_all_jobs() {
        let factory = ThreadFactory::default();
        let pool = ThreadPoolExecutor::new(2, &factory).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            pool.execute(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn thread_pool_executor_survives_panicking_jobs() {
        let factory = ThreadFactory::default();
        let pool = ThreadPoolExecutor::new(1, &factory).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        pool.execute(Box::new(|| panic!("boom")));
        let counter2 = Arc::clone(&counter);
        pool.execute(Box::new(move || {
            counter2.store(1, Ordering::SeqCst);
        }));
        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn limited_executor_caps_concurrency() {
        let factory = ThreadFactory::default();
        let pool = Arc::new(ThreadPoolExecutor::new(8, &factory).unwrap());
        let limited = Executors::limited(pool, 2).unwrap();
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let concurrent = Arc::clone(&concurrent);
            let max_seen = Arc::clone(&max_seen);
            limited.execute(Box::new(move || {
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                thread::sleep(std::time::Duration::from_millis(15));
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        thread::sleep(std::time::Duration::from_millis(200));
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }
}
