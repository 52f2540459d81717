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

use std::{sync::Mutex, time::Duration};

use crate::timeout::Timeout;

/// Tells an [`crate::lazy::ExpiringLazy`] whether its currently-cached value
/// is still good. Implementations are expected to be cheap — they're
/// consulted on every [`crate::lazy::ExpiringLazy::get`] call.
pub trait LivenessPredicate: Send + Sync {
    fn is_alive(&self) -> bool;
}

/// Dies once a fixed budget has elapsed since it was created, and stays dead.
pub struct TtlPredicate {
    timeout: Timeout,
}

impl TtlPredicate {
    pub fn new(budget: Duration) -> Self {
        Self {
            timeout: Timeout::from_duration(budget),
        }
    }
}

impl LivenessPredicate for TtlPredicate {
    fn is_alive(&self) -> bool {
        !self.timeout.expired()
    }
}

/// Dies if `budget` elapses between two `is_alive` observations; every alive
/// observation refreshes the countdown. Once it dies it stays dead — it's not
/// possible to revive a time-to-idle predicate by observing it again.
pub struct TtiPredicate {
    state: Mutex<TtiState>,
    budget: Duration,
}

enum TtiState {
    Alive(Timeout),
    Dead,
}

impl TtiPredicate {
    pub fn new(budget: Duration) -> Self {
        Self {
            state: Mutex::new(TtiState::Alive(Timeout::from_duration(budget))),
            budget,
        }
    }
}

impl LivenessPredicate for TtiPredicate {
    fn is_alive(&self) -> bool {
        let mut guard = self.state.lock().unwrap();
        match &*guard {
            TtiState::Dead => false,
            TtiState::Alive(timeout) => {
                if timeout.expired() {
                    *guard = TtiState::Dead;
                    false
                } else {
                    *guard = TtiState::Alive(Timeout::from_duration(self.budget));
                    true
                }
            }
        }
    }
}
