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

/// How an archive entered the manifest.
///
/// The three origins share one loading contract; they only differ in how
/// their dependency lists are populated from the manifest tables. Keeping the
/// origin as a tag on one concrete descriptor avoids a class family coupled
/// to manifest parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveOrigin {
    /// A directly-addressable asset archive from the file table.
    File,
    /// A shared, dependency-only archive from the depend table.
    Depend,
    /// A group archive carrying multiple logical assets under one key.
    Group,
}

/// A static description of one physical archive, parsed from a manifest.
///
/// Descriptors are immutable configuration: the live, reference-counted state
/// for an archive lives in the runtime's archive unit, which is created
/// lazily from a descriptor the first time a handle needs it.
#[derive(Debug, Clone)]
pub struct ArchiveDescriptor {
    /// The logical path this record was keyed under in its table.
    pub logical_path: String,
    /// The stable physical archive name used for fetching.
    pub archive_name: String,
    /// Declared dependency names, one hop, in declaration order.
    ///
    /// Dependency lists are flat: the names declared here are not expanded
    /// recursively beyond this list.
    pub dependencies: Vec<String>,
    /// Which manifest table produced this descriptor.
    pub origin: ArchiveOrigin,
}
