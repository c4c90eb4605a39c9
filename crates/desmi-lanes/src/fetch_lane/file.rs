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
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

/// How many bytes the cooperative fetch reads between yield points.
const CHUNK_SIZE: usize = 64 * 1024;

/// A lane that reads archive bytes from files under a root directory.
///
/// Locations are package-relative paths (`<package>/<archive_name>`), joined
/// onto the configured root.
pub struct FileFetchLane {
    root: PathBuf,
}

impl FileFetchLane {
    /// Creates a lane rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, location: &str) -> PathBuf {
        self.root.join(location)
    }
}

fn map_io_error(location: &str, source: std::io::Error) -> FetchError {
    if source.kind() == ErrorKind::NotFound {
        FetchError::NotFound(location.to_string())
    } else {
        FetchError::Io {
            location: location.to_string(),
            source,
        }
    }
}

fn open_with_len(path: &Path, location: &str) -> Result<(File, u64), FetchError> {
    let file = File::open(path).map_err(|e| map_io_error(location, e))?;
    let len = file
        .metadata()
        .map_err(|e| map_io_error(location, e))?
        .len();
    Ok((file, len))
}

#[async_trait]
impl ByteFetchLane for FileFetchLane {
    fn fetch_blocking(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        std::fs::read(self.resolve(location)).map_err(|e| map_io_error(location, e))
    }

    async fn fetch(&self, location: &str, progress: &ProgressCell) -> Result<Vec<u8>, FetchError> {
        progress.set(0.0);
        let (mut file, len) = open_with_len(&self.resolve(location), location)?;

        let mut bytes = Vec::with_capacity(len as usize);
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            let read = file
                .read(&mut chunk)
                .map_err(|e| map_io_error(location, e))?;
            if read == 0 {
                break;
            }
            bytes.extend_from_slice(&chunk[..read]);
            if len > 0 {
                progress.set(bytes.len() as f32 / len as f32);
            }
            // Suspension point between chunks keeps large archives from
            // monopolizing the cooperative scheduler.
            tokio::task::yield_now().await;
        }

        progress.set(1.0);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocking_fetch_reads_file_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("base")).expect("mkdir");
        std::fs::write(dir.path().join("base/ui_menu"), b"payload").expect("write");

        let lane = FileFetchLane::new(dir.path());
        let bytes = lane.fetch_blocking("base/ui_menu").expect("fetch");
        assert_eq!(bytes, b"payload");
    }

    #[test]
    fn missing_file_reports_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lane = FileFetchLane::new(dir.path());

        match lane.fetch_blocking("base/absent") {
            Err(FetchError::NotFound(location)) => assert_eq!(location, "base/absent"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cooperative_fetch_completes_progress() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("big"), vec![7u8; CHUNK_SIZE * 2 + 17]).expect("write");

        let lane = FileFetchLane::new(dir.path());
        let progress = ProgressCell::new();
        let bytes = lane.fetch("big", &progress).await.expect("fetch");

        assert_eq!(bytes.len(), CHUNK_SIZE * 2 + 17);
        assert_eq!(progress.get(), 1.0);
    }
}
