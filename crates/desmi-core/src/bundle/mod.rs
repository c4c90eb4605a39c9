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

//! Provides the foundational primitive types for Desmi's bundle system.
//!
//! This module defines the "common language" for all bundle-related operations
//! in the runtime. It contains the lifecycle phases, identifiers, and archive
//! descriptors that other crates build on, but it has no knowledge of how
//! archives are fetched or stored.

mod descriptor;
mod error;
mod progress;

pub use descriptor::*;
pub use error::*;
pub use progress::*;

use std::fmt;

/// The lifecycle phase of a single archive unit.
///
/// An archive unit cycles between these phases for its entire lifetime: it is
/// created `NotLoaded`, transitions through `Loading` while its bytes are in
/// flight, and sits `Loaded` until the unload pool reclaims it, at which point
/// it returns to `NotLoaded` for possible reuse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LoadPhase {
    /// No archive bytes are resident.
    #[default]
    NotLoaded,
    /// A fetch is in flight; the archive is not yet usable.
    Loading,
    /// The archive object is resident and usable.
    Loaded,
}

/// The lifecycle phase of a consumer-visible load handle.
///
/// Unlike [`LoadPhase`], a handle's phase is one-way: `Idle → Loading →
/// Finished`, with `Finished` terminal. Unloading a handle tears down its
/// references without re-entering the phase machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HandlePhase {
    /// The handle has been resolved but no load has started.
    #[default]
    Idle,
    /// A load is in flight.
    Loading,
    /// The load has completed (successfully or not).
    Finished,
}

/// A process-unique identifier for a load handle.
///
/// Ids are allocated monotonically by the package registry that owns the
/// counter; they are never recycled, so a stale id simply fails to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    /// Wraps a raw counter value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw counter value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
