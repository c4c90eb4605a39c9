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

//! The external entry point of the bundle runtime.

use super::config::BundleConfig;
use super::context::{BundleContext, LoadEnv};
use super::handle::{HandleKind, LoadHandle, SharedHandle};
use super::registry::PackageRegistry;
use super::unload::UnloadPool;
use anyhow::Result;
use desmi_core::archive::{ArchiveRef, AssetObject};
use desmi_core::bundle::{BundleError, HandleId, HandlePhase, LoadPhase};
use desmi_core::manifest::ManifestSource;
use desmi_lanes::cipher_lane::{CipherLane, PlainCipherLane};
use desmi_lanes::fetch_lane::{ByteFetchLane, FileFetchLane};
use desmi_lanes::pack_lane::{ArchiveAssemblyLane, RecordArchiveLane};
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// An in-flight scene load: polled to completion by the caller's context,
/// resolving to the scene's archive once every referenced unit landed.
pub type SceneLoad<'a> = BoxFuture<'a, Option<ArchiveRef>>;

/// The facade other application code talks to.
///
/// Routes path + package to the registry, creates or reuses handles, and
/// wraps the unit-level loading primitives in synchronous and asynchronous
/// entry points. Expected failures (unknown package, unindexed path, failed
/// fetch) are logged here and collapse into sentinel returns; the agent
/// never panics on caller mistakes.
///
/// All archive state is mutated from one logical thread of control — the
/// host's update loop and the cooperative loads it polls — so the internal
/// locks are only ever briefly contended and are never held across an await.
pub struct BundleAgent {
    ctx: Arc<BundleContext>,
    registry: Mutex<PackageRegistry>,
    pool: UnloadPool,
}

impl BundleAgent {
    /// Creates an agent with explicitly injected lanes.
    pub fn new(
        config: BundleConfig,
        fetch: Arc<dyn ByteFetchLane>,
        cipher: Arc<dyn CipherLane>,
        assembly: Arc<dyn ArchiveAssemblyLane>,
    ) -> Self {
        Self {
            ctx: Arc::new(BundleContext::new(fetch, cipher, assembly)),
            registry: Mutex::new(PackageRegistry::new()),
            pool: UnloadPool::new(Duration::from_secs_f32(config.unload_cycle_secs.max(0.0))),
        }
    }

    /// Creates an agent on the stock lanes: file-backed fetching rooted at
    /// the configured directory, no decryption, record-container assembly.
    pub fn with_default_lanes(config: BundleConfig) -> Self {
        let fetch = Arc::new(FileFetchLane::new(config.fetch_root.clone()));
        Self::new(
            config,
            fetch,
            Arc::new(PlainCipherLane),
            Arc::new(RecordArchiveLane),
        )
    }

    /// Parses the package's manifest tables and registers it.
    ///
    /// A `secret_key` marks the package encrypted; its archives pass through
    /// the cipher lane with that key before assembly. Fails on a duplicate
    /// package name.
    pub fn initialize_package(
        &self,
        name: &str,
        source: &ManifestSource,
        secret_key: Option<&str>,
    ) -> Result<bool> {
        self.lock_registry()
            .initialize(name, source, secret_key, &self.ctx, &self.pool)?;
        Ok(true)
    }

    /// Tears down a package: force-unloads every outstanding handle and
    /// discards every unit, the shader archive included.
    pub fn uninitialize_package(&self, name: &str) -> bool {
        self.lock_registry().uninitialize(name, &self.pool)
    }

    /// Whether the named package is initialized.
    pub fn is_package_initialized(&self, name: &str) -> bool {
        self.lock_registry().contains(name)
    }

    /// Whether the package's manifests index the given asset path.
    pub fn contains_asset(&self, package: &str, path: &str) -> bool {
        self.lock_registry()
            .get(package)
            .is_some_and(|runtime| runtime.contains_asset(path))
    }

    /// Loads an asset synchronously.
    ///
    /// Repeated requests for the same path reuse one handle: a path already
    /// finished returns its cached object without re-entering the pipeline,
    /// and a path whose async load is still in flight is drained
    /// synchronously instead of starting a second load.
    pub fn load_asset(&self, package: &str, path: &str) -> Option<AssetObject> {
        let (handle, env) = self.keyed_handle(package, path)?;
        match handle.phase() {
            HandlePhase::Loading => handle.force_finish(&env, &self.pool),
            _ => handle.load_blocking(&env, &self.pool),
        }
    }

    /// Loads an asset cooperatively.
    ///
    /// Duplicate concurrent requests for one path share a single underlying
    /// load and resolve together with the same object.
    pub async fn load_asset_async(&self, package: &str, path: &str) -> Option<AssetObject> {
        let (handle, env) = self.keyed_handle(package, path)?;
        handle.load_async(&env, &self.pool).await
    }

    /// Loads an asset through a fresh, non-deduplicated handle.
    ///
    /// The returned id addresses the handle for progress queries and for
    /// [`Self::unload_handle`]; the path map is not involved.
    pub fn load_asset_detached(
        &self,
        package: &str,
        path: &str,
    ) -> Option<(HandleId, Option<AssetObject>)> {
        let (handle, env) = self.detached_handle(package, path, HandleKind::Asset)?;
        let asset = handle.load_blocking(&env, &self.pool);
        Some((handle.id(), asset))
    }

    /// Loads a scene synchronously. The scene's payload is its archive,
    /// queried through [`Self::scene_archive`] with the returned id.
    pub fn load_scene(&self, package: &str, path: &str) -> Option<HandleId> {
        let (handle, env) = self.detached_handle(package, path, HandleKind::Scene)?;
        handle.load_blocking(&env, &self.pool);
        Some(handle.id())
    }

    /// Starts a cooperative scene load.
    ///
    /// Returns the handle id immediately — progress is queryable while the
    /// load runs — together with the load future the caller polls to
    /// completion.
    pub fn load_scene_async<'a>(
        &'a self,
        package: &str,
        path: &str,
    ) -> Option<(HandleId, SceneLoad<'a>)> {
        let (handle, env) = self.detached_handle(package, path, HandleKind::Scene)?;
        let id = handle.id();
        let pool = &self.pool;
        let load: SceneLoad<'a> = Box::pin(async move {
            handle.load_async(&env, pool).await;
            handle.archive()
        });
        Some((id, load))
    }

    /// The archive of a finished scene handle.
    pub fn scene_archive(&self, package: &str, id: HandleId) -> Option<ArchiveRef> {
        self.lock_registry()
            .get(package)
            .and_then(|runtime| runtime.handle_by_id(id))
            .and_then(|handle| handle.archive())
    }

    /// Unloads the deduplicated handle for an asset path, releasing its
    /// references and dropping it from the registry maps.
    pub fn unload_asset(&self, package: &str, path: &str) -> bool {
        let mut registry = self.lock_registry();
        let Some(runtime) = registry.get_mut(package) else {
            log::error!(
                "{}",
                BundleError::UnknownPackage {
                    package: package.to_string()
                }
            );
            return false;
        };
        let Some(handle) = runtime.handle_by_path(path) else {
            log::warn!("no outstanding handle for '{path}' in package '{package}'");
            return false;
        };

        if handle.unload(&self.pool, false) {
            runtime.remove_handle(&handle);
            true
        } else {
            false
        }
    }

    /// Unloads any outstanding handle by id, detached and scene handles
    /// included.
    pub fn unload_handle(&self, package: &str, id: HandleId) -> bool {
        let mut registry = self.lock_registry();
        let Some(runtime) = registry.get_mut(package) else {
            log::error!(
                "{}",
                BundleError::UnknownPackage {
                    package: package.to_string()
                }
            );
            return false;
        };
        let Some(handle) = runtime.handle_by_id(id) else {
            log::warn!("no outstanding handle {id} in package '{package}'");
            return false;
        };

        if handle.unload(&self.pool, false) {
            runtime.remove_handle(&handle);
            true
        } else {
            false
        }
    }

    /// The load progress of an asset path's handle; 0 when there is none.
    pub fn asset_progress(&self, package: &str, path: &str) -> f32 {
        self.lock_registry()
            .get(package)
            .and_then(|runtime| runtime.handle_by_path(path))
            .map_or(0.0, |handle| handle.progress())
    }

    /// The load progress of any outstanding handle; 0 when there is none.
    pub fn handle_progress(&self, package: &str, id: HandleId) -> f32 {
        self.lock_registry()
            .get(package)
            .and_then(|runtime| runtime.handle_by_id(id))
            .map_or(0.0, |handle| handle.progress())
    }

    /// The lifecycle phase of a package's archive, for diagnostics.
    pub fn archive_phase(&self, package: &str, archive: &str) -> Option<LoadPhase> {
        self.lock_registry()
            .get(package)
            .and_then(|runtime| runtime.unit_named(archive))
            .map(|unit| unit.phase())
    }

    /// The live reference count of a package's archive, for diagnostics.
    pub fn archive_references(&self, package: &str, archive: &str) -> Option<u32> {
        self.lock_registry()
            .get(package)
            .and_then(|runtime| runtime.unit_named(archive))
            .map(|unit| unit.reference_count())
    }

    /// The unload pool backlog as `(pending, confirmed)`, for diagnostics.
    pub fn unload_backlog(&self) -> (usize, usize) {
        (self.pool.pending_count(), self.pool.confirmed_count())
    }

    /// Host-loop tick: sweeps the unload pool when its wall-clock cycle has
    /// elapsed.
    pub fn update(&self) {
        self.pool.update(Instant::now());
    }

    /// Runs one unload sweep immediately, for hosts that drive their own
    /// reclamation cadence.
    pub fn run_unload_cycle(&self) {
        self.pool.sweep();
    }

    /// Unloads everything in the pool immediately, bypassing the grace
    /// window. For hard memory-pressure resets.
    pub fn flush_unloads(&self) {
        self.pool.flush();
    }

    fn lock_registry(&self) -> MutexGuard<'_, PackageRegistry> {
        self.registry.lock().unwrap()
    }

    /// Resolves or reuses the deduplicated handle for an asset path.
    fn keyed_handle(&self, package: &str, path: &str) -> Option<(SharedHandle, LoadEnv)> {
        let mut registry = self.lock_registry();

        if let Some(runtime) = registry.get(package) {
            if let Some(existing) = runtime.handle_by_path(path) {
                return Some((existing, runtime.env(&self.ctx)));
            }
        } else {
            log::error!(
                "{}",
                BundleError::UnknownPackage {
                    package: package.to_string()
                }
            );
            return None;
        }

        let id = registry.allocate_handle_id();
        let runtime = registry.get_mut(package)?;
        let env = runtime.env(&self.ctx);
        let (primary, dependencies) = runtime.resolve_units(path)?;

        let handle = Arc::new(LoadHandle::new(
            id,
            path,
            package,
            HandleKind::Asset,
            true,
            primary,
            dependencies,
        ));
        runtime.insert_handle(Arc::clone(&handle));
        Some((handle, env))
    }

    /// Resolves a fresh, id-addressable handle; the path map is bypassed.
    fn detached_handle(
        &self,
        package: &str,
        path: &str,
        kind: HandleKind,
    ) -> Option<(SharedHandle, LoadEnv)> {
        let mut registry = self.lock_registry();

        if !registry.contains(package) {
            log::error!(
                "{}",
                BundleError::UnknownPackage {
                    package: package.to_string()
                }
            );
            return None;
        }

        let id = registry.allocate_handle_id();
        let runtime = registry.get_mut(package)?;
        let env = runtime.env(&self.ctx);
        let (primary, dependencies) = runtime.resolve_units(path)?;

        let handle = Arc::new(LoadHandle::new(
            id, path, package, kind, false, primary, dependencies,
        ));
        runtime.insert_handle(Arc::clone(&handle));
        Some((handle, env))
    }
}
