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

use std::sync::atomic::{AtomicU32, Ordering};

/// A lock-free slot holding a load-completion fraction in `0.0..=1.0`.
///
/// A fetch lane writes into the cell as bytes arrive while progress queries
/// read it from the other side, so the value is stored as the bit pattern of
/// an `f32` in an atomic.
#[derive(Debug, Default)]
pub struct ProgressCell(AtomicU32);

impl ProgressCell {
    /// Creates a cell at 0.0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a fraction, clamped into `0.0..=1.0`.
    pub fn set(&self, fraction: f32) {
        self.0
            .store(fraction.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Reads the current fraction.
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Resets the cell to 0.0.
    pub fn reset(&self) {
        self.set(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_clamps_fractions() {
        let cell = ProgressCell::new();
        assert_eq!(cell.get(), 0.0);

        cell.set(0.25);
        assert_eq!(cell.get(), 0.25);

        cell.set(7.0);
        assert_eq!(cell.get(), 1.0);

        cell.set(-1.0);
        assert_eq!(cell.get(), 0.0);
    }

    #[test]
    fn reset_returns_to_zero() {
        let cell = ProgressCell::new();
        cell.set(0.8);
        cell.reset();
        assert_eq!(cell.get(), 0.0);
    }
}
