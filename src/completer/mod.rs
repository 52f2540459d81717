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

//! Submits a batch of jobs to an [`crate::executor::Executor`] and hands back
//! an iterator that yields their results in *completion* order rather than
//! submission order.

use std::{collections::HashSet,
          panic,
          sync::{mpsc, Arc}};

use crate::{cancel::CancelToken,
            error::{PanicPayload, StrandError, StrandResult},
            executor::{Executor, Executors},
            timeout::Timeout};

/// What a [`CompletionOrderIter`] does when a job failed or was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExceptionPolicy {
    /// Surface the failure to the iterator's consumer as an `Err` item.
    #[default]
    Throw,
    /// Silently skip failed/cancelled jobs; the iterator only ever yields
    /// successful values.
    Ignore,
}

/// A job submitted through [`AsyncCompleter::invoke_all`].
pub type CompletionJob<T> = Box<dyn FnOnce() -> StrandResult<T> + Send>;

pub struct AsyncCompleterBuilder {
    executor: Arc<dyn Executor>,
    exception_policy: ExceptionPolicy,
    parallelism_limit: Option<usize>,
    identity_check: bool,
}

impl AsyncCompleterBuilder {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            exception_policy: ExceptionPolicy::Throw,
            parallelism_limit: None,
            identity_check: false,
        }
    }

    pub fn exception_policy(mut self, policy: ExceptionPolicy) -> Self {
        self.exception_policy = policy;
        self
    }

    pub fn parallelism_limit(mut self, limit: usize) -> Self {
        self.parallelism_limit = Some(limit);
        self
    }

    /// Opt-in assertion that every completion the iterator observes
    /// corresponds to a job this exact batch submitted. Off by default: it
    /// costs a `HashSet` lookup per completion and only matters if you
    /// suspect a bug is feeding the iterator someone else's results.
    pub fn identity_check(mut self, enabled: bool) -> Self {
        self.identity_check = enabled;
        self
    }

    pub fn build(self) -> StrandResult<AsyncCompleter> {
        let executor = match self.parallelism_limit {
            Some(limit) => Executors::limited(self.executor, limit)? as Arc<dyn Executor>,
            None => self.executor,
        };
        Ok(AsyncCompleter {
            executor,
            exception_policy: self.exception_policy,
            identity_check: self.identity_check,
        })
    }
}

/// Runs a batch of jobs and lets callers consume results as they finish,
/// rather than in submission order.
pub struct AsyncCompleter {
    executor: Arc<dyn Executor>,
    exception_policy: ExceptionPolicy,
    identity_check: bool,
}

enum Slot<T> {
    Value(T),
    Error(StrandError),
    Cancelled,
}

impl AsyncCompleter {
    pub fn builder(executor: Arc<dyn Executor>) -> AsyncCompleterBuilder {
        AsyncCompleterBuilder::new(executor)
    }

    pub fn invoke_all<T, J>(&self, jobs: J) -> CompletionOrderIter<T>
    where
        T: Send + Sync + 'static,
        J: IntoIterator<Item = CompletionJob<T>>,
    {
        self.submit_batch(jobs, None)
    }

    /// As [`Self::invoke_all`], but the returned iterator surfaces
    /// [`StrandError::TimedOut`] (and best-effort-cancels every job still
    /// registered) once `timeout`'s budget runs out.
    pub fn invoke_all_with_timeout<T, J>(&self, jobs: J, timeout: Timeout) -> CompletionOrderIter<T>
    where
        T: Send + Sync + 'static,
        J: IntoIterator<Item = CompletionJob<T>>,
    {
        self.submit_batch(jobs, Some(timeout))
    }

    fn submit_batch<T, J>(&self, jobs: J, timeout: Option<Timeout>) -> CompletionOrderIter<T>
    where
        T: Send + Sync + 'static,
        J: IntoIterator<Item = CompletionJob<T>>,
    {
        let (sender, receiver) = mpsc::channel::<(u64, Slot<T>)>();
        let mut cancel_tokens = Vec::new();
        let mut outstanding_ids = self.identity_check.then(HashSet::new);
        let mut count = 0u64;

        for job in jobs {
            let id = count;
            count += 1;
            let cancel = CancelToken::new();
            cancel_tokens.push(cancel.clone());
            if let Some(ids) = &mut outstanding_ids {
                ids.insert(id);
            }
            let sender = sender.clone();
            self.executor.execute(Box::new(move || {
                if cancel.is_cancelled() {
                    let _ = sender.send((id, Slot::Cancelled));
                    return;
                }
                let slot = match panic::catch_unwind(panic::AssertUnwindSafe(job)) {
                    Ok(Ok(value)) => Slot::Value(value),
                    Ok(Err(error)) => Slot::Error(error),
                    Err(payload) => Slot::Error(StrandError::execution_failed(PanicPayload::from_box(payload))),
                };
                let _ = sender.send((id, slot));
            }));
        }

        CompletionOrderIter {
            receiver,
            remaining: count,
            cancel_tokens,
            outstanding_ids,
            exception_policy: self.exception_policy,
            timeout,
        }
    }
}

/// Yields each submitted job's result as it completes, not in submission
/// order. Dropping the iterator early does not cancel outstanding jobs; call
/// [`CompletionOrderIter::cancel_remaining`] explicitly if that's wanted.
pub struct CompletionOrderIter<T> {
    receiver: mpsc::Receiver<(u64, Slot<T>)>,
    remaining: u64,
    cancel_tokens: Vec<CancelToken>,
    outstanding_ids: Option<HashSet<u64>>,
    exception_policy: ExceptionPolicy,
    timeout: Option<Timeout>,
}

impl<T> CompletionOrderIter<T> {
    /// Best-effort-cancels every job that hasn't started running yet.
    pub fn cancel_remaining(&self) {
        for token in &self.cancel_tokens {
            token.cancel();
        }
    }

    fn check_identity(&mut self, id: u64) -> Option<StrandError> {
        if let Some(ids) = &mut self.outstanding_ids {
            if !ids.remove(&id) {
                return Some(StrandError::Argument(
                    "completion queue returned a result for an unregistered job".to_string(),
                ));
            }
        }
        None
    }
}

impl<T> Iterator for CompletionOrderIter<T> {
    type Item = StrandResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining == 0 {
                return None;
            }

            let received = match &self.timeout {
                None => self.receiver.recv().ok(),
                Some(timeout) => {
                    let remaining_budget = timeout.remaining();
                    if remaining_budget.is_zero() {
                        tracing::debug!(remaining = self.remaining, "async completer batch timed out");
                        self.cancel_remaining();
                        self.remaining = 0;
                        return Some(Err(timeout.err_timed_out()));
                    }
                    match self.receiver.recv_timeout(remaining_budget) {
                        Ok(item) => Some(item),
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            tracing::debug!(remaining = self.remaining, "async completer batch timed out");
                            self.cancel_remaining();
                            self.remaining = 0;
                            return Some(Err(timeout.err_timed_out()));
                        }
                        Err(mpsc::RecvTimeoutError::Disconnected) => None,
                    }
                }
            };

            let Some((id, slot)) = received else {
                return None;
            };
            self.remaining -= 1;

            if let Some(error) = self.check_identity(id) {
                return Some(Err(error));
            }

            match slot {
                Slot::Value(value) => return Some(Ok(value)),
                Slot::Cancelled => match self.exception_policy {
                    ExceptionPolicy::Throw => return Some(Err(StrandError::Cancelled)),
                    ExceptionPolicy::Ignore => continue,
                },
                Slot::Error(error) => match self.exception_policy {
                    ExceptionPolicy::Throw => return Some(Err(error)),
                    ExceptionPolicy::Ignore => continue,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{executor::ThreadPoolExecutor, thread_factory::ThreadFactory};
    use std::{thread, time::Duration};

    fn pool(size: usize) -> Arc<ThreadPoolExecutor> {
        Arc::new(ThreadPoolExecutor::new(size, &ThreadFactory::default()).unwrap())
    }

    #[test]
    fn yields_results_in_completion_order() {
        let completer = AsyncCompleter::builder(pool(4)).build().unwrap();
        let jobs: Vec<CompletionJob<u32>> = vec![
            Box::new(|| {
                thread::sleep(Duration::from_millis(60));
                Ok(1)
            }),
            Box::new(|| {
                thread::sleep(Duration::from_millis(10));
                Ok(2)
            }),
        ];
        let results: Vec<u32> = completer.invoke_all(jobs).map(|r| r.unwrap()).collect();
        assert_eq!(results, vec![2, 1]);
    }

    #[test]
    fn ignore_policy_filters_out_failures() {
        let completer = AsyncCompleter::builder(pool(2))
            .exception_policy(ExceptionPolicy::Ignore)
            .build()
            .unwrap();
        let jobs: Vec<CompletionJob<u32>> = vec![
            Box::new(|| Ok(1)),
            Box::new(|| Err(StrandError::Argument("bad".into()))),
            Box::new(|| Ok(3)),
        ];
        let mut results: Vec<u32> = completer.invoke_all(jobs).map(|r| r.unwrap()).collect();
        results.sort();
        assert_eq!(results, vec![1, 3]);
    }

    #[test]
    fn throw_policy_surfaces_failures() {
        let completer = AsyncCompleter::builder(pool(2)).build().unwrap();
        let jobs: Vec<CompletionJob<u32>> = vec![Box::new(|| Err(StrandError::Argument("bad".into())))];
        let mut results = completer.invoke_all(jobs);
        assert!(results.next().unwrap().is_err());
    }

    #[test]
    fn timeout_cancels_still_registered_jobs() {
        let completer = AsyncCompleter::builder(pool(1)).build().unwrap();
        let jobs: Vec<CompletionJob<u32>> = vec![
            Box::new(|| {
                thread::sleep(Duration::from_millis(200));
                Ok(1)
            }),
            Box::new(|| Ok(2)),
        ];
        let mut results = completer.invoke_all_with_timeout(jobs, Timeout::from_millis(20));
        match results.next() {
            Some(Err(StrandError::TimedOut { .. })) => {}
            other => panic!("expected TimedOut, got {other:?}"),
        }
    }
}
