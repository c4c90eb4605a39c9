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

//! Archive assembly lanes.
//!
//! The last pipeline step turns decrypted bytes into a queryable
//! [`Archive`]. The engine never looks inside: the container format is the
//! assembly lane's contract with whatever tool packed the archive.
//!
//! The stock container is the record archive: a bincode-encoded sequence of
//! `(entry_path, payload)` records, the same packed-binary-index approach
//! the rest of the workspace uses for its serialized tables.

use desmi_core::archive::{Archive, ArchiveRef, AssetObject};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// An error produced while assembling an archive from bytes.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// The bytes are not a valid archive container.
    #[error("failed to decode archive '{name}'")]
    Decode {
        /// The archive name being assembled.
        name: String,
        /// The underlying decode error.
        #[source]
        source: bincode::error::DecodeError,
    },
}

/// Builds archive objects from decrypted bytes.
pub trait ArchiveAssemblyLane: Send + Sync {
    /// Assembles the archive stored in `bytes` under the given name.
    fn assemble(&self, name: &str, bytes: Vec<u8>) -> Result<ArchiveRef, AssemblyError>;
}

/// A loaded record archive: entry paths mapped to their payloads.
pub struct RecordArchive {
    name: String,
    entries: HashMap<String, Arc<Vec<u8>>>,
}

impl Archive for RecordArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    fn extract(&self, path: &str) -> Option<AssetObject> {
        self.entries
            .get(path)
            .map(|payload| Arc::clone(payload) as AssetObject)
    }
}

/// The assembly lane for the record container format.
#[derive(Debug, Default)]
pub struct RecordArchiveLane;

impl ArchiveAssemblyLane for RecordArchiveLane {
    fn assemble(&self, name: &str, bytes: Vec<u8>) -> Result<ArchiveRef, AssemblyError> {
        let config = bincode::config::standard();
        let (records, _): (Vec<(String, Vec<u8>)>, _) =
            bincode::serde::decode_from_slice(&bytes, config).map_err(|source| {
                AssemblyError::Decode {
                    name: name.to_string(),
                    source,
                }
            })?;

        let entries = records
            .into_iter()
            .map(|(path, payload)| (path, Arc::new(payload)))
            .collect();

        Ok(Arc::new(RecordArchive {
            name: name.to_string(),
            entries,
        }))
    }
}

/// Encodes entries into the record container format.
///
/// This is the packing side of [`RecordArchiveLane`]; build tools and tests
/// use it to produce archive bytes the lane can assemble.
pub fn encode_records(
    records: &[(String, Vec<u8>)],
) -> Result<Vec<u8>, bincode::error::EncodeError> {
    let config = bincode::config::standard();
    bincode::serde::encode_to_vec(records, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use desmi_core::archive::downcast_asset;

    fn packed() -> Vec<u8> {
        encode_records(&[
            ("ui/menu.prefab".to_string(), b"menu bytes".to_vec()),
            ("ui/pause.prefab".to_string(), b"pause bytes".to_vec()),
        ])
        .expect("encode")
    }

    #[test]
    fn assembles_and_extracts_entries() {
        let archive = RecordArchiveLane
            .assemble("ui_menu", packed())
            .expect("assemble");

        assert_eq!(archive.name(), "ui_menu");
        assert!(archive.contains("ui/menu.prefab"));
        assert!(!archive.contains("ui/absent.prefab"));

        let object = archive.extract("ui/menu.prefab").expect("extract");
        let payload = downcast_asset::<Vec<u8>>(&object).expect("payload type");
        assert_eq!(payload, &b"menu bytes".to_vec());
    }

    #[test]
    fn rejects_bytes_that_are_not_a_container() {
        let result = RecordArchiveLane.assemble("broken", vec![0xFF; 11]);
        assert!(matches!(result, Err(AssemblyError::Decode { .. })));
    }
}
