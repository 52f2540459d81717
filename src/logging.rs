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

//! Thin [`tracing`] wiring for this crate.
//!
//! This is a library, so it never installs a global subscriber on its own —
//! every suspension point (latch `await`, promise `claim`, lazy `get`, completer
//! polling) emits `tracing::trace!`/`debug!` events, and it's the embedding
//! application's job to install a subscriber if it wants to see them.
//! [`init_thread_local_tracing`] is a convenience for tests and doctests,
//! scoped to a single thread so concurrent test runs don't fight over the
//! global dispatcher.

use tracing_core::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a compact, thread-local `fmt` subscriber filtered by `RUST_LOG` (or
/// `level_filter` if the environment variable isn't set) and returns the guard
/// that resets the previous subscriber for this thread when dropped.
///
/// Intended for tests: `let _guard = strand::logging::init_thread_local_tracing(LevelFilter::DEBUG);`
pub fn init_thread_local_tracing(level_filter: LevelFilter) -> tracing::dispatcher::DefaultGuard {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level_filter.to_string()));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .without_time()
        .with_thread_ids(true)
        .with_thread_names(false)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .set_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_local_tracing_can_be_installed_and_dropped() {
        let guard = init_thread_local_tracing(LevelFilter::TRACE);
        tracing::info!("hello from strand logging test");
        drop(guard);
    }
}
