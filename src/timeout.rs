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

//! A reusable time budget threaded through every blocking wait in this crate.
//!
//! A [`Timeout`] is created once (usually from a [`TimeoutFactory`]) and then
//! handed to however many blocking calls make up one logical operation — a
//! latch wait, a promise `claim`, an async-completer batch. Each call asks for
//! [`Timeout::remaining`] rather than being given a fixed duration, so a retry
//! loop spanning several suspension points spends down a single shared budget
//! instead of restarting the clock at each step.

use std::time::{Duration, Instant};

use crate::error::StrandError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeUnit {
    Nanos,
    Millis,
}

impl TimeUnit {
    fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Nanos => "ns",
            TimeUnit::Millis => "ms",
        }
    }
}

/// A countdown from the moment it's created. Cloning a `Timeout` does not
/// reset it — the clone shares the same deadline.
#[derive(Debug, Clone)]
pub struct Timeout {
    created_at: Instant,
    budget: Duration,
    original_value: u64,
    unit: TimeUnit,
}

impl Timeout {
    pub fn from_nanos(nanos: u64) -> Self {
        Self {
            created_at: Instant::now(),
            budget: Duration::from_nanos(nanos),
            original_value: nanos,
            unit: TimeUnit::Nanos,
        }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self {
            created_at: Instant::now(),
            budget: Duration::from_millis(millis),
            original_value: millis,
            unit: TimeUnit::Millis,
        }
    }

    pub(crate) fn from_duration(budget: Duration) -> Self {
        Self {
            created_at: Instant::now(),
            budget,
            original_value: budget.as_millis().min(u64::MAX as u128) as u64,
            unit: TimeUnit::Millis,
        }
    }

    /// Time left in the budget, clamped at zero. Never goes negative; a
    /// `Timeout` that has already expired keeps reporting [`Duration::ZERO`]
    /// rather than wrapping.
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.created_at.elapsed())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// The [`StrandError::TimedOut`] a caller should surface once this budget
    /// is spent, reported in the unit it was originally constructed with.
    pub fn err_timed_out(&self) -> StrandError {
        StrandError::TimedOut {
            budget: self.original_value,
            unit: self.unit.as_str(),
        }
    }
}

/// Stamps out fresh [`Timeout`]s that all start from the same budget. Useful
/// where a fixed per-call budget needs to be re-applied to many independent
/// operations (e.g. one timeout per request in a loop), as opposed to a single
/// [`Timeout`] shared across several steps of one operation.
#[derive(Debug, Clone)]
pub struct TimeoutFactory {
    value: u64,
    unit: TimeUnit,
}

impl TimeoutFactory {
    pub fn with_nanos(nanos: u64) -> Self {
        Self {
            value: nanos,
            unit: TimeUnit::Nanos,
        }
    }

    pub fn with_millis(millis: u64) -> Self {
        Self {
            value: millis,
            unit: TimeUnit::Millis,
        }
    }

    pub fn create(&self) -> Timeout {
        match self.unit {
            TimeUnit::Nanos => Timeout::from_nanos(self.value),
            TimeUnit::Millis => Timeout::from_millis(self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_counts_down_and_clamps_at_zero() {
        let timeout = Timeout::from_millis(10);
        assert!(!timeout.expired());
        std::thread::sleep(Duration::from_millis(25));
        assert!(timeout.expired());
        assert_eq!(timeout.remaining(), Duration::ZERO);
    }

    #[test]
    fn err_timed_out_reports_original_unit() {
        let timeout = Timeout::from_nanos(500);
        match timeout.err_timed_out() {
            StrandError::TimedOut { budget, unit } => {
                assert_eq!(budget, 500);
                assert_eq!(unit, "ns");
            }
            other => panic!("expected TimedOut, got {other:?}"),
        }
    }

    #[test]
    fn factory_stamps_out_independent_timeouts() {
        let factory = TimeoutFactory::with_millis(50);
        let a = factory.create();
        std::thread::sleep(Duration::from_millis(10));
        let b = factory.create();
        assert!(b.remaining() > a.remaining());
    }
}
