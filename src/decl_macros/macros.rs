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

/// Wrap the given block or stmt so that it returns a `Result<()>`. Syntactic sugar
/// that saves having to write `Ok(())` at the end of a fallible function.
///
/// ```
/// use strand::{throws, StrandResult};
///
/// fn example() -> StrandResult<()> {
///     throws! {
///         let _ = 1 + 1;
///     }
/// }
/// ```
#[macro_export]
macro_rules! throws {
    ($it: block) => {{
        $it
        return Ok(())
    }};
    ($it: stmt) => {{
        $it
        return Ok(())
    }};
}

/// Simple macro to create a [`Result`] with an [`Ok`] variant. Just syntactic
/// sugar that saves having to write `Ok(())` or `Ok($value)`.
#[macro_export]
macro_rules! ok {
    // No args.
    () => {
        Ok(())
    };
    // With arg.
    ($value:expr) => {
        Ok($value)
    };
}

/// A wrapper for `pretty_assertions::assert_eq!`, used throughout this crate's
/// tests so a failing assertion prints an aligned diff instead of two opaque
/// `Debug` dumps.
#[macro_export]
macro_rules! assert_eq2 {
    ($($params:tt)*) => {
        pretty_assertions::assert_eq!($($params)*)
    };
}

/// Measures the wall-clock duration of the block it surrounds; returns a tuple of
/// `($expr, duration)`. Used in a couple of places to sanity-check [`crate::Timeout`]
/// budgets in tests without pulling in a benchmarking harness.
///
/// ```
/// use strand::timed;
/// let (retval, _duration) = timed!({ 1 + 1 });
/// assert_eq!(retval, 2);
/// ```
#[macro_export]
macro_rules! timed {
    ($block:block) => {{
        let start = std::time::Instant::now();
        let retval = $block;
        let duration = start.elapsed();
        (retval, duration)
    }};
}
