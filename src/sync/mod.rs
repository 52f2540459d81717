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

//! Reusable latches and a single-slot blocking reference built on them.
//!
//! Both latches here are `Mutex` + `Condvar` pairs rather than the atomic-only
//! style of [`crate::cancel::CancelToken`]: they need to block a thread until
//! a condition holds, which a bare `AtomicBool` can't do on its own.

mod boolean_latch;
mod phased_latch;
mod blocking_reference;

pub use blocking_reference::{BlockingReference, MultiReaderRef, SingleReaderRef};
pub use boolean_latch::BooleanLatch;
pub use phased_latch::PhasedLatch;
