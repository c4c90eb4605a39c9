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

//! Byte-fetching lanes.
//!
//! A fetch lane answers exactly one question for the loading engine: "are
//! this archive's bytes available at location X". Everything above it —
//! reference counting, deduplicating concurrent fetches, retry policy —
//! belongs to the agent; everything below it (disk, memory, a download
//! cache) is the lane's private concern.

mod file;
mod memory;

pub use file::FileFetchLane;
pub use memory::MemoryFetchLane;

use async_trait::async_trait;
use desmi_core::bundle::ProgressCell;
use thiserror::Error;

/// An error produced while fetching archive bytes.
#[derive(Debug, Error)]
pub enum FetchError {
    /// No bytes exist at the requested location.
    #[error("archive bytes not found at '{0}'")]
    NotFound(String),
    /// The underlying byte source failed mid-read.
    #[error("failed to read archive bytes from '{location}'")]
    Io {
        /// The location being read.
        location: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A byte provider for archive locations.
///
/// Both variants must return the same bytes for the same location; the async
/// variant additionally reports its completion fraction into the supplied
/// [`ProgressCell`] and may suspend cooperatively between chunks.
#[async_trait]
pub trait ByteFetchLane: Send + Sync {
    /// Fetches the bytes at `location`, blocking the caller until done.
    fn fetch_blocking(&self, location: &str) -> Result<Vec<u8>, FetchError>;

    /// Fetches the bytes at `location` cooperatively.
    async fn fetch(&self, location: &str, progress: &ProgressCell) -> Result<Vec<u8>, FetchError>;
}
