// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Broadcast-once completion signalling.
//!
//! When several callers request the same archive while one fetch is in
//! flight, every caller must resolve together, exactly once, from that single
//! fetch. This module provides the primitive for that: a [`CompletionSignal`]
//! held by whoever owns the in-flight work, and any number of
//! [`CompletionWaiter`]s subscribed to it.

use tokio::sync::watch;

/// The sending half of a broadcast-once completion.
///
/// The signal starts closed, is opened exactly once when the guarded work
/// completes (successfully or not), and stays open forever after. Opening an
/// already-open signal is a no-op, so competing completion paths do not need
/// to coordinate.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: watch::Sender<bool>,
}

impl CompletionSignal {
    /// Creates a closed signal.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Opens the signal, releasing every current and future waiter.
    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the signal has been opened.
    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscribes a new waiter.
    ///
    /// A waiter subscribed after the signal opened resolves immediately.
    pub fn waiter(&self) -> CompletionWaiter {
        CompletionWaiter {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// The receiving half of a broadcast-once completion.
#[derive(Debug, Clone)]
pub struct CompletionWaiter {
    rx: watch::Receiver<bool>,
}

impl CompletionWaiter {
    /// Waits until the signal opens.
    ///
    /// Also returns if the signal is dropped without opening; callers
    /// re-inspect the guarded state after waking rather than trusting the
    /// wake itself.
    pub async fn wait(mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn waiter_subscribed_after_open_resolves_immediately() {
        let signal = CompletionSignal::new();
        signal.open();
        assert!(signal.is_open());
        signal.waiter().wait().await;
    }

    #[tokio::test]
    async fn all_waiters_release_together() {
        let signal = CompletionSignal::new();
        let first = signal.waiter();
        let second = signal.waiter();

        signal.open();

        tokio::join!(first.wait(), second.wait());
    }

    #[tokio::test]
    async fn opening_twice_is_a_no_op() {
        let signal = CompletionSignal::new();
        signal.open();
        signal.open();
        signal.waiter().wait().await;
    }

    #[tokio::test]
    async fn dropping_the_signal_releases_waiters() {
        let signal = CompletionSignal::new();
        let waiter = signal.waiter();
        drop(signal);
        // The waiter must not hang; the caller re-checks state after waking.
        waiter.wait().await;
    }
}
