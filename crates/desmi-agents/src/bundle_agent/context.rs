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

use desmi_lanes::cipher_lane::CipherLane;
use desmi_lanes::fetch_lane::ByteFetchLane;
use desmi_lanes::pack_lane::ArchiveAssemblyLane;
use std::sync::Arc;

/// The injected collaborator set the loading pipeline runs on.
///
/// One context is built per agent and shared by every unit it loads. Keeping
/// the lanes here — instead of behind process-wide statics — is what lets
/// multiple independent agents coexist, each with its own byte source.
pub struct BundleContext {
    pub(crate) fetch: Arc<dyn ByteFetchLane>,
    pub(crate) cipher: Arc<dyn CipherLane>,
    pub(crate) assembly: Arc<dyn ArchiveAssemblyLane>,
}

impl BundleContext {
    /// Assembles a context from its three lanes.
    pub fn new(
        fetch: Arc<dyn ByteFetchLane>,
        cipher: Arc<dyn CipherLane>,
        assembly: Arc<dyn ArchiveAssemblyLane>,
    ) -> Self {
        Self {
            fetch,
            cipher,
            assembly,
        }
    }
}

/// Per-package view of the context handed into every load call.
///
/// Owns its data so a load can keep running after the registry lock that
/// produced it has been released.
#[derive(Clone)]
pub(crate) struct LoadEnv {
    pub(crate) ctx: Arc<BundleContext>,
    pub(crate) package: String,
    pub(crate) secret_key: Option<String>,
}
