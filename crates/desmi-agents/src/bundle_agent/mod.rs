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

//! Acts as the agent for the bundle loading subsystem.
//!
//! This module provides the high-level, tactical logic for runtime bundle
//! management. It is the public-facing API for requesting assets and scenes
//! and querying their state, but it delegates the actual byte-level work —
//! fetching, decryption, archive assembly — to the lanes injected into its
//! [`BundleContext`].
//!
//! The moving parts, leaf-first:
//! - [`ArchiveUnit`]: the atomic, reference-counted loadable unit wrapping
//!   one physical archive.
//! - [`UnloadPool`]: the two-stage, wall-clock-delayed reclamation sweep.
//! - [`LoadHandle`]: one consumer-visible load request, aggregating an
//!   asset's own archive with its declared dependency archives.
//! - [`PackageRegistry`]: per-package manifest tables, lazy unit map, and
//!   outstanding-handle bookkeeping.
//!
//! The primary entry point for users is the [`BundleAgent`], which
//! orchestrates the whole loading lifecycle.

pub mod agent;
pub mod config;
pub mod context;
pub mod handle;
pub mod registry;
pub mod unit;
pub mod unload;

pub use agent::{BundleAgent, SceneLoad};
pub use config::BundleConfig;
pub use context::BundleContext;
pub use handle::{HandleKind, LoadHandle, SharedHandle};
pub use registry::{PackageRegistry, PackageRuntime};
pub use unit::{ArchiveUnit, SharedUnit};
pub use unload::UnloadPool;
