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

//! Two-stage delayed reclamation of idle archive units.
//!
//! Units whose reference count drops to zero are not unloaded on the spot:
//! they enter the `pending` stage, are promoted to `confirmed` one sweep
//! later, and are actually unloaded the sweep after that. The net effect is
//! a grace window of one to two full cycles in which a re-request simply
//! cancels the reclamation — the path that prevents unload-then-reload
//! thrashing on assets that bounce in and out of use.
//!
//! Sweeps run on a wall-clock cadence driven by the host's update loop, not
//! per frame.

use super::unit::SharedUnit;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// The two-stage pool of units awaiting reclamation.
pub struct UnloadPool {
    cycle: Duration,
    state: Mutex<PoolState>,
}

#[derive(Default)]
struct PoolState {
    pending: HashMap<String, SharedUnit>,
    confirmed: HashMap<String, SharedUnit>,
    last_sweep: Option<Instant>,
}

impl UnloadPool {
    /// Creates a pool sweeping on the given wall-clock cycle.
    pub fn new(cycle: Duration) -> Self {
        Self {
            cycle,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Enters a unit into the pending stage.
    pub(crate) fn schedule(&self, unit: SharedUnit) {
        let mut state = self.state.lock().unwrap();
        log::trace!("archive '{}' entered the unload pool", unit.name());
        state.pending.insert(unit.location().to_string(), unit);
    }

    /// Removes a unit from both stages; driven by the acquire path.
    pub(crate) fn cancel(&self, location: &str) {
        let mut state = self.state.lock().unwrap();
        if state.pending.remove(location).is_some() | state.confirmed.remove(location).is_some() {
            log::trace!("cancelled scheduled unload of '{location}'");
        }
    }

    /// Runs a sweep if the cycle has elapsed since the previous one.
    ///
    /// The first call only arms the timer, so a unit can never be reclaimed
    /// by the tick that observes it.
    pub(crate) fn update(&self, now: Instant) {
        let due = {
            let mut state = self.state.lock().unwrap();
            match state.last_sweep {
                None => {
                    state.last_sweep = Some(now);
                    false
                }
                Some(last) if now.duration_since(last) >= self.cycle => {
                    state.last_sweep = Some(now);
                    true
                }
                Some(_) => false,
            }
        };
        if due {
            self.sweep();
        }
    }

    /// One sweep: unload everything confirmed, then promote the pending
    /// stage.
    pub(crate) fn sweep(&self) {
        let reap: Vec<SharedUnit> = {
            let mut state = self.state.lock().unwrap();
            let reap: Vec<SharedUnit> = state.confirmed.drain().map(|(_, unit)| unit).collect();
            for unit in &reap {
                state.pending.remove(unit.location());
            }

            let promoted: Vec<(String, SharedUnit)> = state.pending.drain().collect();
            state.confirmed.extend(promoted);
            reap
        };

        // Unload outside the pool lock; a unit re-referenced after its
        // cancellation window is simply dropped from the sweep.
        for unit in reap {
            if unit.reference_count() == 0 {
                unit.unload();
            } else {
                log::debug!(
                    "dropping re-referenced archive '{}' from the unload sweep",
                    unit.name()
                );
            }
        }
    }

    /// Unloads both stages immediately, bypassing the grace window.
    pub(crate) fn flush(&self) {
        let reap: Vec<SharedUnit> = {
            let mut state = self.state.lock().unwrap();
            let mut reap: Vec<SharedUnit> = state.pending.drain().map(|(_, unit)| unit).collect();
            reap.extend(state.confirmed.drain().map(|(_, unit)| unit));
            reap
        };

        log::debug!("flushing {} archives from the unload pool", reap.len());
        for unit in reap {
            if unit.reference_count() == 0 {
                unit.unload();
            }
        }
    }

    /// How many units sit in the pending stage.
    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// How many units sit in the confirmed stage.
    pub fn confirmed_count(&self) -> usize {
        self.state.lock().unwrap().confirmed.len()
    }

    /// Whether either stage holds the given location.
    pub(crate) fn contains(&self, location: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.pending.contains_key(location) || state.confirmed.contains_key(location)
    }
}
