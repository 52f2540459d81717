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

//! A single-slot reference that readers can block on until a value is set.
//!
//! [`BlockingReference`] is not itself constructible — it's a namespace for
//! the two factories the single-reader/multi-reader distinction is forced
//! through at construction time, so a consuming `take()` can never be called
//! where more than one reader is meant to observe the same release (see
//! the crate's design notes on this Open Question).

use std::sync::Mutex;

use crate::{error::StrandResult,
            sync::{BooleanLatch, PhasedLatch},
            timeout::Timeout};

/// Namespace for the two [`BlockingReference`] flavors. Not constructible on
/// its own.
pub struct BlockingReference<V> {
    _never: std::marker::PhantomData<V>,
}

impl<V> BlockingReference<V> {
    /// A slot with exactly one consumer: `take` blocks until a value is set,
    /// then clears the slot so the next `set`/`take` pair starts fresh.
    pub fn single_reader() -> SingleReaderRef<V> {
        SingleReaderRef::new()
    }

    /// A slot any number of readers can observe: `get` blocks until a value
    /// is set and returns a clone to every reader that was waiting, without
    /// clearing the slot.
    pub fn multi_reader() -> MultiReaderRef<V>
    where
        V: Clone,
    {
        MultiReaderRef::new()
    }
}

/// Single-consumer blocking slot. See [`BlockingReference::single_reader`].
pub struct SingleReaderRef<V> {
    slot: Mutex<Option<V>>,
    latch: BooleanLatch,
}

impl<V> Default for SingleReaderRef<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> SingleReaderRef<V> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            latch: BooleanLatch::new(),
        }
    }

    /// Sets the slot and releases the latch for the next `take`.
    pub fn set(&self, value: V) {
        *self.slot.lock().unwrap() = Some(value);
        self.latch.release();
    }

    /// Blocks until a value is available, then removes and returns it.
    pub fn take(&self) -> V {
        loop {
            self.latch.await_latch();
            if let Some(value) = self.slot.lock().unwrap().take() {
                return value;
            }
            // `clear()` raced ahead of us between the release and our lock
            // acquisition; wait for the next release.
        }
    }

    pub fn take_timeout(&self, timeout: &Timeout) -> StrandResult<V> {
        loop {
            self.latch.await_timeout(timeout)?;
            if let Some(value) = self.slot.lock().unwrap().take() {
                return Ok(value);
            }
        }
    }

    pub fn clear(&self) {
        self.slot.lock().unwrap().take();
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().unwrap().is_none()
    }
}

impl<V: Clone> SingleReaderRef<V> {
    /// Returns a clone of the current value without consuming it, or `None`
    /// if the slot is empty.
    pub fn peek(&self) -> Option<V> {
        self.slot.lock().unwrap().clone()
    }
}

/// Multi-consumer blocking slot. See [`BlockingReference::multi_reader`].
pub struct MultiReaderRef<V> {
    slot: Mutex<Option<V>>,
    latch: PhasedLatch,
}

impl<V: Clone> Default for MultiReaderRef<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> MultiReaderRef<V> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            latch: PhasedLatch::new(),
        }
    }

    pub fn set(&self, value: V) {
        *self.slot.lock().unwrap() = Some(value);
        self.latch.release();
    }

    /// Blocks until a value is available and returns a clone of it. Every
    /// reader blocked on the same release gets its own clone; the slot is
    /// left untouched.
    pub fn get(&self) -> V {
        loop {
            let observed_at = self.latch.current_phase();
            if let Some(value) = self.slot.lock().unwrap().clone() {
                return value;
            }
            self.latch.await_phase(observed_at);
        }
    }

    pub fn get_timeout(&self, timeout: &Timeout) -> StrandResult<V> {
        loop {
            let observed_at = self.latch.current_phase();
            if let Some(value) = self.slot.lock().unwrap().clone() {
                return Ok(value);
            }
            self.latch.await_phase_timeout(observed_at, timeout)?;
        }
    }

    pub fn clear(&self) {
        self.slot.lock().unwrap().take();
    }

    pub fn peek(&self) -> Option<V> {
        self.slot.lock().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().unwrap().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread, time::Duration};

    #[test]
    fn single_reader_take_blocks_until_set() {
        let slot = Arc::new(BlockingReference::<u32>::single_reader());
        let slot2 = Arc::clone(&slot);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            slot2.set(7);
        });
        assert_eq!(slot.take(), 7);
        handle.join().unwrap();
        assert!(slot.is_empty());
    }

    #[test]
    fn single_reader_take_timeout_expires() {
        let slot = BlockingReference::<u32>::single_reader();
        let timeout = Timeout::from_millis(20);
        assert!(slot.take_timeout(&timeout).is_err());
    }

    #[test]
    fn single_reader_peek_does_not_consume() {
        let slot = BlockingReference::<u32>::single_reader();
        slot.set(5);
        assert_eq!(slot.peek(), Some(5));
        assert_eq!(slot.take(), 5);
    }

    #[test]
    fn multi_reader_fans_out_the_same_value() {
        let slot = Arc::new(BlockingReference::<u32>::multi_reader());
        let (tx, rx) = std::sync::mpsc::channel();
        for _ in 0..3 {
            let slot = Arc::clone(&slot);
            let tx = tx.clone();
            thread::spawn(move || tx.send(slot.get()).unwrap());
        }
        thread::sleep(Duration::from_millis(20));
        slot.set(99);
        for _ in 0..3 {
            assert_eq!(rx.recv_timeout(Duration::from_millis(200)).unwrap(), 99);
        }
        assert_eq!(slot.peek(), Some(99));
    }
}
