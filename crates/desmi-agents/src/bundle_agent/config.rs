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

use serde::Deserialize;
use std::path::PathBuf;

/// Runtime configuration for the [`BundleAgent`](super::BundleAgent).
///
/// Hosts typically deserialize this from their own settings file and hand it
/// to the agent at construction.
#[derive(Debug, Clone, Deserialize)]
pub struct BundleConfig {
    /// Root directory the default file fetch lane reads archives from.
    pub fetch_root: PathBuf,
    /// Seconds between unload pool sweeps.
    ///
    /// This is the reclamation grace window: an archive dropping to zero
    /// references survives at least one full cycle before it is unloaded.
    pub unload_cycle_secs: f32,
}

impl Default for BundleConfig {
    /// Provides a working configuration when the host supplies none.
    fn default() -> Self {
        Self {
            fetch_root: PathBuf::from("resources/bundles"),
            unload_cycle_secs: 5.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_usable() {
        let config = BundleConfig::default();
        assert_eq!(config.fetch_root, PathBuf::from("resources/bundles"));
        assert!(config.unload_cycle_secs > 0.0);
    }
}
