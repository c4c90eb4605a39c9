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

use super::{ByteFetchLane, FetchError};
use async_trait::async_trait;
use desmi_core::bundle::ProgressCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A lane serving archive bytes from an in-memory table.
///
/// Counts every fetch it serves, which lets callers assert how many times the
/// engine actually reached for bytes — the load-deduplication contracts lean
/// on that. Also the natural seam for a simulation byte source that never
/// touches disk.
#[derive(Default)]
pub struct MemoryFetchLane {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
}

impl MemoryFetchLane {
    /// Creates an empty lane.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores bytes under a location, replacing any previous entry.
    pub fn insert(&self, location: impl Into<String>, bytes: Vec<u8>) {
        self.entries.lock().unwrap().insert(location.into(), bytes);
    }

    /// How many fetches (blocking or cooperative) this lane has served.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    fn lookup(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .unwrap()
            .get(location)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(location.to_string()))
    }
}

#[async_trait]
impl ByteFetchLane for MemoryFetchLane {
    fn fetch_blocking(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        self.lookup(location)
    }

    async fn fetch(&self, location: &str, progress: &ProgressCell) -> Result<Vec<u8>, FetchError> {
        progress.set(0.0);
        // One suspension point so concurrent requests can observe the
        // in-flight state, mirroring a real byte source.
        tokio::task::yield_now().await;
        let bytes = self.lookup(location)?;
        progress.set(1.0);
        Ok(bytes)
    }
}
