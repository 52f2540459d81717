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

//! Builder for [`ThreadFactory`], the knob every [`crate::executor::ThreadPoolExecutor`]
//! uses to name and spawn its worker threads.

use std::{panic,
          sync::{atomic::{AtomicU64, Ordering},
                 Arc},
          thread};

use crate::error::PanicPayload;

/// Best-effort priority hint. `std::thread` has no portable priority knob, so
/// anything other than `Normal` is logged and otherwise ignored — see
/// [`ThreadFactoryBuilder::build`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThreadPriority {
    Low,
    #[default]
    Normal,
    High,
}

type PanicHook = Arc<dyn Fn(PanicPayload) + Send + Sync>;

#[derive(Default)]
pub struct ThreadFactoryBuilder {
    name_prefix: Option<String>,
    priority: ThreadPriority,
    daemon: bool,
    on_panic: Option<PanicHook>,
}

impl ThreadFactoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Worker threads are named `{prefix}-{n}` for an increasing `n`.
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    pub fn priority(mut self, priority: ThreadPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Whether this factory's threads should be treated as background threads
    /// by their owning executor (informational only: `std::thread` doesn't
    /// distinguish daemon/non-daemon, so this just changes whether
    /// [`crate::executor::ThreadPoolExecutor::drop`] waits for them to drain).
    pub fn daemon(mut self, daemon: bool) -> Self {
        self.daemon = daemon;
        self
    }

    /// Installs an uncaught-panic hook: called with the panic payload just
    /// before a thread spawned by this factory exits due to an unwinding
    /// panic. The panic still propagates to the `JoinHandle` afterwards —
    /// this only gets a look at it first.
    pub fn on_panic<F>(mut self, handler: F) -> Self
    where
        F: Fn(PanicPayload) + Send + Sync + 'static,
    {
        self.on_panic = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> ThreadFactory {
        if self.priority != ThreadPriority::Normal {
            tracing::warn!(
                requested = ?self.priority,
                "thread priority is not portable via std::thread; ignoring"
            );
        }
        ThreadFactory {
            name_prefix: self.name_prefix,
            counter: Arc::new(AtomicU64::new(0)),
            daemon: self.daemon,
            on_panic: self.on_panic,
        }
    }
}

/// Spawns OS threads with a shared naming scheme. Cheap to clone; clones share
/// the same naming counter so two clones of one factory never hand out the
/// same thread name twice.
#[derive(Clone)]
pub struct ThreadFactory {
    name_prefix: Option<String>,
    counter: Arc<AtomicU64>,
    daemon: bool,
    on_panic: Option<PanicHook>,
}

impl ThreadFactory {
    pub fn spawn<F>(&self, job: F) -> thread::JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut builder = thread::Builder::new();
        if let Some(prefix) = &self.name_prefix {
            let index = self.counter.fetch_add(1, Ordering::Relaxed);
            builder = builder.name(format!("{prefix}-{index}"));
        }
        let on_panic = self.on_panic.clone();
        let wrapped = move || match on_panic {
            None => job(),
            Some(hook) => match panic::catch_unwind(panic::AssertUnwindSafe(job)) {
                Ok(()) => {}
                Err(payload) => {
                    hook(PanicPayload::from_box_ref(&payload));
                    panic::resume_unwind(payload);
                }
            },
        };
        builder
            .spawn(wrapped)
            .expect("failed to spawn OS thread for ThreadFactory")
    }

    pub fn is_daemon(&self) -> bool {
        self.daemon
    }
}

impl Default for ThreadFactory {
    fn default() -> Self {
        ThreadFactoryBuilder::new().build()
    }
}
