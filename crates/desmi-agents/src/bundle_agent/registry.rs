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

//! Per-package runtime bookkeeping.
//!
//! A package is a named partition of the manifest namespace, initialized and
//! torn down as a unit. Its registry entry owns the parsed manifest tables,
//! the lazily-created archive units, the maps of outstanding handles, and
//! the package's always-resident shader archive.

use super::context::{BundleContext, LoadEnv};
use super::handle::SharedHandle;
use super::unit::{ArchiveUnit, SharedUnit};
use super::unload::UnloadPool;
use desmi_core::bundle::{ArchiveDescriptor, ArchiveOrigin, BundleError, HandleId};
use desmi_core::manifest::{ManifestSource, ManifestTables};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The archive name every package's shader bundle is published under.
const SHADER_ARCHIVE: &str = "shaders";

/// All initialized packages, plus the handle id counter they share.
#[derive(Default)]
pub struct PackageRegistry {
    packages: HashMap<String, PackageRuntime>,
    next_handle_id: AtomicU64,
}

impl PackageRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the package's manifests and registers its runtime entry.
    ///
    /// Rejects a name that is already registered. Also loads the package's
    /// shader archive, which stays resident until the package is torn down;
    /// a package without one is tolerated.
    pub(crate) fn initialize(
        &mut self,
        name: &str,
        source: &ManifestSource,
        secret_key: Option<&str>,
        ctx: &Arc<BundleContext>,
        pool: &UnloadPool,
    ) -> Result<(), BundleError> {
        if self.packages.contains_key(name) {
            return Err(BundleError::PackageAlreadyInitialized {
                package: name.to_string(),
            });
        }

        let tables = ManifestTables::parse(source);
        log::info!(
            "initializing package '{name}': {} files, {} depends, {} groups",
            tables.files().len(),
            tables.depends().len(),
            tables.groups().len()
        );

        let mut runtime = PackageRuntime::new(name, secret_key, tables);
        runtime.load_shader_archive(ctx, pool);
        self.packages.insert(name.to_string(), runtime);
        Ok(())
    }

    /// Looks up a package's runtime entry.
    pub(crate) fn get(&self, name: &str) -> Option<&PackageRuntime> {
        self.packages.get(name)
    }

    /// Looks up a package's runtime entry for mutation.
    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut PackageRuntime> {
        self.packages.get_mut(name)
    }

    /// Whether the named package is initialized.
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Allocates the next process-unique handle id.
    pub(crate) fn allocate_handle_id(&self) -> HandleId {
        HandleId::from_raw(self.next_handle_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Tears down a package: every outstanding handle is force-unloaded,
    /// every unit discarded, the shader archive released, the entry removed.
    pub(crate) fn uninitialize(&mut self, name: &str, pool: &UnloadPool) -> bool {
        let Some(mut runtime) = self.packages.remove(name) else {
            log::error!(
                "{}",
                BundleError::UnknownPackage {
                    package: name.to_string()
                }
            );
            return false;
        };
        runtime.teardown(pool);
        true
    }
}

/// The live state of one initialized package.
pub struct PackageRuntime {
    name: String,
    secret_key: Option<String>,
    tables: ManifestTables,
    /// Archive name → unit, created lazily and reused indefinitely.
    units: HashMap<String, SharedUnit>,
    /// Path-addressable handles, for deduplication.
    handles_by_path: HashMap<String, SharedHandle>,
    /// Every outstanding handle, detached ones included, for bulk teardown.
    handles_by_id: HashMap<HandleId, SharedHandle>,
    /// The always-resident shader unit, if the package ships one.
    shader: Option<SharedUnit>,
}

impl PackageRuntime {
    fn new(name: &str, secret_key: Option<&str>, tables: ManifestTables) -> Self {
        Self {
            name: name.to_string(),
            secret_key: secret_key.map(str::to_string),
            tables,
            units: HashMap::new(),
            handles_by_path: HashMap::new(),
            handles_by_id: HashMap::new(),
            shader: None,
        }
    }

    /// The package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the given asset path is indexed by any table.
    pub fn contains_asset(&self, path: &str) -> bool {
        self.tables.resolve_asset(path).is_some()
    }

    /// How many handles are currently outstanding.
    pub fn outstanding_handles(&self) -> usize {
        self.handles_by_id.len()
    }

    /// The unit for an archive name, if one has been created.
    pub fn unit_named(&self, archive_name: &str) -> Option<SharedUnit> {
        self.units.get(archive_name).cloned()
    }

    /// Builds the per-load view of the context for this package.
    pub(crate) fn env(&self, ctx: &Arc<BundleContext>) -> LoadEnv {
        LoadEnv {
            ctx: Arc::clone(ctx),
            package: self.name.clone(),
            secret_key: self.secret_key.clone(),
        }
    }

    /// Resolves the asset path to its primary unit plus dependency units.
    ///
    /// Group membership is probed first (longest prefix, exclusive), then
    /// the file table. Each declared dependency name is classified against
    /// the depend, file, and group tables in that order; an unresolved name
    /// is a configuration error, logged, and the load proceeds without it.
    pub(crate) fn resolve_units(&mut self, path: &str) -> Option<(SharedUnit, Vec<SharedUnit>)> {
        let Some(descriptor) = self.tables.resolve_asset(path).cloned() else {
            log::error!(
                "{}",
                BundleError::AssetNotIndexed {
                    package: self.name.clone(),
                    path: path.to_string()
                }
            );
            return None;
        };

        let primary = self.unit_for(&descriptor);
        let mut dependencies = Vec::with_capacity(descriptor.dependencies.len());
        for dependency_name in &descriptor.dependencies {
            match self.tables.classify_dependency(dependency_name).cloned() {
                Some(dependency) => dependencies.push(self.unit_for(&dependency)),
                None => log::error!(
                    "unresolved dependency '{dependency_name}' declared by '{}' in package '{}'",
                    descriptor.logical_path,
                    self.name
                ),
            }
        }

        Some((primary, dependencies))
    }

    /// Registers an outstanding handle in the id map, and in the path map
    /// when it is keyed.
    pub(crate) fn insert_handle(&mut self, handle: SharedHandle) {
        if handle.keyed() {
            self.handles_by_path
                .insert(handle.path().to_string(), Arc::clone(&handle));
        }
        self.handles_by_id.insert(handle.id(), handle);
    }

    /// The deduplicated handle for a path, if one is outstanding.
    pub(crate) fn handle_by_path(&self, path: &str) -> Option<SharedHandle> {
        self.handles_by_path.get(path).cloned()
    }

    /// Any outstanding handle by id, detached ones included.
    pub(crate) fn handle_by_id(&self, id: HandleId) -> Option<SharedHandle> {
        self.handles_by_id.get(&id).cloned()
    }

    /// Drops an unloaded handle from the maps.
    pub(crate) fn remove_handle(&mut self, handle: &SharedHandle) {
        self.handles_by_id.remove(&handle.id());
        if handle.keyed() {
            self.handles_by_path.remove(handle.path());
        }
    }

    /// The unit for a descriptor, created on first use.
    fn unit_for(&mut self, descriptor: &ArchiveDescriptor) -> SharedUnit {
        if let Some(unit) = self.units.get(&descriptor.archive_name) {
            return Arc::clone(unit);
        }

        let location = format!("{}/{}", self.name, descriptor.archive_name);
        let unit = ArchiveUnit::new(descriptor.archive_name.clone(), location, descriptor.origin);
        self.units
            .insert(descriptor.archive_name.clone(), Arc::clone(&unit));
        unit
    }

    /// Loads the package's shader archive and pins it resident. Missing
    /// shader bytes are tolerated; the package just runs without them.
    fn load_shader_archive(&mut self, ctx: &Arc<BundleContext>, pool: &UnloadPool) {
        let descriptor = ArchiveDescriptor {
            logical_path: SHADER_ARCHIVE.to_string(),
            archive_name: SHADER_ARCHIVE.to_string(),
            dependencies: Vec::new(),
            origin: ArchiveOrigin::Depend,
        };
        let unit = self.unit_for(&descriptor);
        unit.acquire(pool);

        match unit.load_blocking(&self.env(ctx)) {
            Ok(_) => {
                log::debug!("shader archive resident for package '{}'", self.name);
                self.shader = Some(unit);
            }
            Err(err) => {
                log::warn!("package '{}' has no loadable shader archive: {err}", self.name);
                unit.release(pool);
                // The unit never became resident; keep it out of the pool
                // and out of the unit map.
                pool.cancel(unit.location());
                self.units.remove(SHADER_ARCHIVE);
            }
        }
    }

    /// Force-unloads every outstanding handle and discards every unit.
    pub(crate) fn teardown(&mut self, pool: &UnloadPool) {
        let handles: Vec<SharedHandle> = self
            .handles_by_id
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        self.handles_by_path.clear();
        for handle in handles {
            handle.unload(pool, true);
        }

        if let Some(shader) = self.shader.take() {
            shader.release(pool);
        }

        for (_, unit) in self.units.drain() {
            pool.cancel(unit.location());
            unit.discard();
        }
        log::info!("package '{}' uninitialized", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle_agent::handle::{HandleKind, LoadHandle};
    use desmi_lanes::cipher_lane::PlainCipherLane;
    use desmi_lanes::fetch_lane::MemoryFetchLane;
    use desmi_lanes::pack_lane::{encode_records, RecordArchiveLane};
    use std::time::Duration;

    fn test_ctx(lane: Arc<MemoryFetchLane>) -> Arc<BundleContext> {
        Arc::new(BundleContext::new(
            lane,
            Arc::new(PlainCipherLane),
            Arc::new(RecordArchiveLane),
        ))
    }

    fn base_source() -> ManifestSource {
        ManifestSource {
            files: "<ui/menu.prefab|ui_menu|shared/atlas>".into(),
            depends: "<shared/atlas|atlas>".into(),
            groups: "<levels/forest|forest_group>".into(),
        }
    }

    #[test]
    fn duplicate_initialize_is_rejected() {
        let lane = Arc::new(MemoryFetchLane::new());
        let ctx = test_ctx(lane);
        let pool = UnloadPool::new(Duration::from_secs(60));
        let mut registry = PackageRegistry::new();

        registry
            .initialize("base", &base_source(), None, &ctx, &pool)
            .expect("first initialize");

        let second = registry.initialize("base", &base_source(), None, &ctx, &pool);
        assert!(matches!(
            second,
            Err(BundleError::PackageAlreadyInitialized { .. })
        ));
    }

    #[test]
    fn handle_ids_are_monotonic() {
        let registry = PackageRegistry::new();
        let first = registry.allocate_handle_id();
        let second = registry.allocate_handle_id();
        assert!(second > first);
    }

    #[test]
    fn resolution_shares_units_between_paths() {
        let lane = Arc::new(MemoryFetchLane::new());
        let ctx = test_ctx(lane);
        let pool = UnloadPool::new(Duration::from_secs(60));
        let mut registry = PackageRegistry::new();
        registry
            .initialize(
                "base",
                &ManifestSource {
                    files: "<ui/menu.prefab|ui_menu|shared/atlas>\n<ui/pause.prefab|ui_pause|shared/atlas>".into(),
                    depends: "<shared/atlas|atlas>".into(),
                    ..Default::default()
                },
                None,
                &ctx,
                &pool,
            )
            .expect("initialize");

        let runtime = registry.get_mut("base").expect("runtime");
        let (_, menu_deps) = runtime.resolve_units("ui/menu.prefab").expect("menu");
        let (_, pause_deps) = runtime.resolve_units("ui/pause.prefab").expect("pause");

        assert!(Arc::ptr_eq(&menu_deps[0], &pause_deps[0]));
    }

    #[test]
    fn group_membership_shadows_the_file_table() {
        let lane = Arc::new(MemoryFetchLane::new());
        let ctx = test_ctx(lane);
        let pool = UnloadPool::new(Duration::from_secs(60));
        let mut registry = PackageRegistry::new();
        registry
            .initialize(
                "base",
                &ManifestSource {
                    files: "<levels/forest/a.scene|a_file>".into(),
                    groups: "<levels/forest|forest_group>".into(),
                    ..Default::default()
                },
                None,
                &ctx,
                &pool,
            )
            .expect("initialize");

        let runtime = registry.get_mut("base").expect("runtime");
        let (primary, _) = runtime.resolve_units("levels/forest/a.scene").expect("resolve");
        assert_eq!(primary.name(), "forest_group");
        assert_eq!(primary.origin(), ArchiveOrigin::Group);
    }

    #[test]
    fn unresolved_dependency_is_skipped() {
        let lane = Arc::new(MemoryFetchLane::new());
        let ctx = test_ctx(lane);
        let pool = UnloadPool::new(Duration::from_secs(60));
        let mut registry = PackageRegistry::new();
        registry
            .initialize(
                "base",
                &ManifestSource {
                    files: "<ui/menu.prefab|ui_menu|nowhere/undefined>".into(),
                    ..Default::default()
                },
                None,
                &ctx,
                &pool,
            )
            .expect("initialize");

        let runtime = registry.get_mut("base").expect("runtime");
        let (_, dependencies) = runtime.resolve_units("ui/menu.prefab").expect("resolve");
        assert!(dependencies.is_empty());
    }

    #[test]
    fn shader_archive_is_pinned_resident_when_present() {
        let lane = Arc::new(MemoryFetchLane::new());
        let bytes = encode_records(&[("shader/standard".to_string(), vec![1u8])]).expect("encode");
        lane.insert("base/shaders", bytes);

        let ctx = test_ctx(lane);
        let pool = UnloadPool::new(Duration::from_secs(60));
        let mut registry = PackageRegistry::new();
        registry
            .initialize("base", &base_source(), None, &ctx, &pool)
            .expect("initialize");

        let runtime = registry.get("base").expect("runtime");
        let shader = runtime.unit_named(SHADER_ARCHIVE).expect("shader unit");
        assert_eq!(shader.reference_count(), 1);
        assert!(shader.archive().is_some());
    }

    #[test]
    fn uninitialize_force_unloads_everything() {
        let lane = Arc::new(MemoryFetchLane::new());
        let bytes = encode_records(&[("ui/menu.prefab".to_string(), b"menu".to_vec())])
            .expect("encode");
        lane.insert("base/ui_menu", bytes);

        let ctx = test_ctx(lane);
        let pool = UnloadPool::new(Duration::from_secs(60));
        let mut registry = PackageRegistry::new();
        registry
            .initialize(
                "base",
                &ManifestSource {
                    files: "<ui/menu.prefab|ui_menu>".into(),
                    ..Default::default()
                },
                None,
                &ctx,
                &pool,
            )
            .expect("initialize");

        let id = registry.allocate_handle_id();
        let runtime = registry.get_mut("base").expect("runtime");
        let env = runtime.env(&ctx);
        let (primary, dependencies) = runtime.resolve_units("ui/menu.prefab").expect("resolve");
        let handle = Arc::new(LoadHandle::new(
            id,
            "ui/menu.prefab",
            "base",
            HandleKind::Asset,
            true,
            Arc::clone(&primary),
            dependencies,
        ));
        runtime.insert_handle(Arc::clone(&handle));
        handle.load_blocking(&env, &pool);
        assert_eq!(primary.reference_count(), 1);

        assert!(registry.uninitialize("base", &pool));
        assert_eq!(primary.reference_count(), 0);
        assert!(primary.archive().is_none());
        assert!(registry.get("base").is_none());
    }

    #[test]
    fn uninitialize_of_an_unknown_package_fails_soft() {
        let pool = UnloadPool::new(Duration::from_secs(60));
        let mut registry = PackageRegistry::new();
        assert!(!registry.uninitialize("ghost", &pool));
    }
}
