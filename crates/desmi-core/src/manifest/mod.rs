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

//! Manifest parsing for fast, in-memory archive lookups.
//!
//! Each package ships three flat manifest texts describing its archives: a
//! file table (directly-addressable assets with their dependency lists), a
//! depend table (shared dependency-only archives), and a group table
//! (clusters of asset paths sharing one archive). This module parses those
//! texts once, at package initialization, into [`ManifestTables`] — the
//! single source of truth the registry consults for O(1) lookups afterwards.
//!
//! Record syntax is a sequence of `<...>` spans with `|`-separated fields:
//!
//! ```text
//! <filePath|archiveName|depName1|depName2|...>   file and group tables
//! <filePath|archiveName>                         depend table
//! ```
//!
//! Malformed records are logged and skipped; a bad line in a manifest must
//! never take the whole package down.

use crate::bundle::{ArchiveDescriptor, ArchiveOrigin};
use std::collections::HashMap;

/// The three raw manifest texts for one package.
#[derive(Debug, Clone, Default)]
pub struct ManifestSource {
    /// The file table text.
    pub files: String,
    /// The depend table text.
    pub depends: String,
    /// The group table text.
    pub groups: String,
}

/// The parsed lookup tables for one package.
#[derive(Debug, Default)]
pub struct ManifestTables {
    files: HashMap<String, ArchiveDescriptor>,
    depends: HashMap<String, ArchiveDescriptor>,
    groups: HashMap<String, ArchiveDescriptor>,
    /// Group keys ordered longest-first, so membership tests always resolve
    /// to the most specific (and therefore exactly one) group.
    group_keys: Vec<String>,
}

impl ManifestTables {
    /// Parses the three manifest texts into lookup tables.
    pub fn parse(source: &ManifestSource) -> Self {
        let files = parse_table(&source.files, ArchiveOrigin::File);
        let depends = parse_table(&source.depends, ArchiveOrigin::Depend);
        let groups = parse_table(&source.groups, ArchiveOrigin::Group);

        let mut group_keys: Vec<String> = groups.keys().cloned().collect();
        group_keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        Self {
            files,
            depends,
            groups,
            group_keys,
        }
    }

    /// Resolves the archive that carries the given asset path.
    ///
    /// Group membership is tested first: the longest group key that prefixes
    /// the path claims it, exclusively. Only paths claimed by no group fall
    /// through to the file table.
    pub fn resolve_asset(&self, path: &str) -> Option<&ArchiveDescriptor> {
        self.resolve_group(path).or_else(|| self.files.get(path))
    }

    /// Resolves the group, if any, that claims the given asset path.
    pub fn resolve_group(&self, path: &str) -> Option<&ArchiveDescriptor> {
        self.group_keys
            .iter()
            .find(|key| path.starts_with(key.as_str()))
            .and_then(|key| self.groups.get(key))
    }

    /// Classifies a declared dependency name against the tables.
    ///
    /// Probes the depend table, then the file table, then the group table;
    /// the first table containing the name wins. `None` means the manifest
    /// declared a dependency it never defined — a configuration error the
    /// caller logs before proceeding without it.
    pub fn classify_dependency(&self, name: &str) -> Option<&ArchiveDescriptor> {
        self.depends
            .get(name)
            .or_else(|| self.files.get(name))
            .or_else(|| self.groups.get(name))
    }

    /// The file table.
    pub fn files(&self) -> &HashMap<String, ArchiveDescriptor> {
        &self.files
    }

    /// The depend table.
    pub fn depends(&self) -> &HashMap<String, ArchiveDescriptor> {
        &self.depends
    }

    /// The group table.
    pub fn groups(&self) -> &HashMap<String, ArchiveDescriptor> {
        &self.groups
    }

    /// Group keys, ordered longest-first.
    pub fn group_keys(&self) -> &[String] {
        &self.group_keys
    }
}

/// Parses one manifest text into a table keyed by logical path.
fn parse_table(text: &str, origin: ArchiveOrigin) -> HashMap<String, ArchiveDescriptor> {
    let mut table = HashMap::new();

    for record in records(text) {
        let mut fields = record.split('|').map(str::trim);
        let logical_path = fields.next().unwrap_or_default();
        let archive_name = fields.next().unwrap_or_default();

        if logical_path.is_empty() || archive_name.is_empty() {
            log::warn!("skipping malformed {origin:?} manifest record '<{record}>'");
            continue;
        }

        let dependencies: Vec<String> = fields
            .filter(|field| !field.is_empty())
            .map(str::to_string)
            .collect();

        if origin == ArchiveOrigin::Depend && !dependencies.is_empty() {
            log::warn!(
                "depend record '{logical_path}' declares dependencies of its own; ignoring them"
            );
        }

        let descriptor = ArchiveDescriptor {
            logical_path: logical_path.to_string(),
            archive_name: archive_name.to_string(),
            dependencies: if origin == ArchiveOrigin::Depend {
                Vec::new()
            } else {
                dependencies
            },
            origin,
        };

        if table.insert(logical_path.to_string(), descriptor).is_some() {
            log::warn!("duplicate {origin:?} manifest record for '{logical_path}'; keeping the last");
        }
    }

    table
}

/// Iterates the `<...>` spans of a manifest text.
fn records(text: &str) -> impl Iterator<Item = &str> {
    text.split('<')
        .skip(1)
        .filter_map(|span| span.split('>').next())
        .map(str::trim)
        .filter(|record| !record.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tables() -> ManifestTables {
        ManifestTables::parse(&ManifestSource {
            files: "<ui/menu.prefab|ui_menu|shared/atlas|shared/fonts>\n<fx/spark.prefab|fx_spark>".into(),
            depends: "<shared/atlas|atlas>\n<shared/fonts|fonts>".into(),
            groups: "<levels/forest|forest_group|shared/atlas>\n<levels/forest/deep|forest_deep_group>".into(),
        })
    }

    #[test]
    fn parses_all_three_tables() {
        let tables = sample_tables();

        let menu = tables.files().get("ui/menu.prefab").expect("file record");
        assert_eq!(menu.archive_name, "ui_menu");
        assert_eq!(menu.dependencies, vec!["shared/atlas", "shared/fonts"]);
        assert_eq!(menu.origin, ArchiveOrigin::File);

        let atlas = tables.depends().get("shared/atlas").expect("depend record");
        assert_eq!(atlas.archive_name, "atlas");
        assert!(atlas.dependencies.is_empty());

        assert_eq!(tables.groups().len(), 2);
    }

    #[test]
    fn malformed_records_are_skipped() {
        let tables = ManifestTables::parse(&ManifestSource {
            files: "<|missing_path> <no_archive|> <ok/path|ok_archive> garbage outside records".into(),
            ..Default::default()
        });

        assert_eq!(tables.files().len(), 1);
        assert!(tables.files().contains_key("ok/path"));
    }

    #[test]
    fn longest_group_prefix_wins() {
        let tables = sample_tables();

        let deep = tables
            .resolve_group("levels/forest/deep/cave.scene")
            .expect("group claim");
        assert_eq!(deep.archive_name, "forest_deep_group");

        let shallow = tables
            .resolve_group("levels/forest/edge.scene")
            .expect("group claim");
        assert_eq!(shallow.archive_name, "forest_group");

        assert!(tables.resolve_group("ui/menu.prefab").is_none());
    }

    #[test]
    fn group_claim_shadows_the_file_table() {
        let tables = ManifestTables::parse(&ManifestSource {
            files: "<levels/forest/edge.scene|edge_file>".into(),
            groups: "<levels/forest|forest_group>".into(),
            ..Default::default()
        });

        let resolved = tables.resolve_asset("levels/forest/edge.scene").expect("claimed");
        assert_eq!(resolved.archive_name, "forest_group");
        assert_eq!(resolved.origin, ArchiveOrigin::Group);
    }

    #[test]
    fn dependency_classification_probes_depend_then_file_then_group() {
        let tables = ManifestTables::parse(&ManifestSource {
            files: "<shared/atlas|atlas_as_file>\n<only/file|file_archive>".into(),
            depends: "<shared/atlas|atlas_as_depend>".into(),
            groups: "<only/group|group_archive>".into(),
        });

        assert_eq!(
            tables.classify_dependency("shared/atlas").map(|d| d.archive_name.as_str()),
            Some("atlas_as_depend")
        );
        assert_eq!(
            tables.classify_dependency("only/file").map(|d| d.archive_name.as_str()),
            Some("file_archive")
        );
        assert_eq!(
            tables.classify_dependency("only/group").map(|d| d.archive_name.as_str()),
            Some("group_archive")
        );
        assert!(tables.classify_dependency("nowhere").is_none());
    }
}
