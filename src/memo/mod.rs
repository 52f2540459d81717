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

//! Weak-reference memoization and the lock-striping built on top of it.

mod weak_memoizer;
mod managed_lock;
mod lock_striping;

pub use lock_striping::{WeakManagedLockFactory, WeakManagedRwLockFactory};
pub use managed_lock::{ManagedLock, ManagedRwLock};
pub use weak_memoizer::WeakMemoizer;
