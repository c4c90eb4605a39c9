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

//! The atomic, reference-counted loadable unit.
//!
//! One [`ArchiveUnit`] exists per physical archive of a package, created
//! lazily the first time any handle names it and reused indefinitely
//! afterwards. Many handles may reference the same unit (that is the whole
//! point of shared dependency archives), so the unit supports any number of
//! concurrent acquires while guaranteeing that at most one underlying fetch
//! runs: concurrent async callers all subscribe to the one in-flight
//! completion signal and resolve together.
//!
//! Reaching zero references never unloads a unit synchronously; it only
//! schedules the unit into the [`UnloadPool`], whose grace window gives a
//! re-request the chance to cancel the reclamation.

use super::context::LoadEnv;
use super::unload::UnloadPool;
use desmi_core::archive::ArchiveRef;
use desmi_core::bundle::{ArchiveOrigin, BundleError, LoadPhase, ProgressCell};
use desmi_core::signal::{CompletionSignal, CompletionWaiter};
use std::sync::{Arc, Mutex};

/// Shared ownership of an archive unit.
pub type SharedUnit = Arc<ArchiveUnit>;

/// The reference-counted wrapper around one physical archive.
pub struct ArchiveUnit {
    name: String,
    location: String,
    origin: ArchiveOrigin,
    progress: ProgressCell,
    state: Mutex<UnitState>,
}

#[derive(Default)]
struct UnitState {
    references: u32,
    phase: LoadPhase,
    archive: Option<ArchiveRef>,
    /// Present exactly while `phase == Loading`; opened once when the load
    /// settles, successfully or not.
    inflight: Option<CompletionSignal>,
}

/// What a caller found when it entered the load path.
enum Entry {
    /// The archive is resident.
    Ready(ArchiveRef),
    /// Another load is in flight; subscribe to its completion.
    Wait(CompletionWaiter),
    /// The caller claimed the load and must run the pipeline itself.
    Fetch,
}

impl ArchiveUnit {
    /// Creates a unit for the archive at the given fetch location.
    pub fn new(name: String, location: String, origin: ArchiveOrigin) -> SharedUnit {
        Arc::new(Self {
            name,
            location,
            origin,
            progress: ProgressCell::new(),
            state: Mutex::new(UnitState::default()),
        })
    }

    /// The stable archive name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The package-relative fetch location, unique per unit.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Which manifest table produced this unit.
    pub fn origin(&self) -> ArchiveOrigin {
        self.origin
    }

    /// The current lifecycle phase.
    pub fn phase(&self) -> LoadPhase {
        self.state.lock().unwrap().phase
    }

    /// How many handles currently hold a reference.
    pub fn reference_count(&self) -> u32 {
        self.state.lock().unwrap().references
    }

    /// The resident archive object, if any.
    pub fn archive(&self) -> Option<ArchiveRef> {
        self.state.lock().unwrap().archive.clone()
    }

    /// The fetch completion fraction; 1.0 once loaded.
    pub fn progress(&self) -> f32 {
        match self.phase() {
            LoadPhase::Loaded => 1.0,
            LoadPhase::NotLoaded => 0.0,
            LoadPhase::Loading => self.progress.get(),
        }
    }

    /// Records one more reference and cancels any scheduled unload.
    pub(crate) fn acquire(self: &Arc<Self>, pool: &UnloadPool) {
        {
            let mut state = self.state.lock().unwrap();
            state.references += 1;
            log::trace!(
                "archive '{}' acquired ({} references)",
                self.name,
                state.references
            );
        }
        // Any live reference cancels a pending reclamation.
        pool.cancel(&self.location);
    }

    /// Releases one reference; at zero, schedules the unit for delayed
    /// unloading. Underflow is logged and ignored.
    pub(crate) fn release(self: &Arc<Self>, pool: &UnloadPool) {
        let mut state = self.state.lock().unwrap();
        if state.references == 0 {
            log::error!("reference underflow on archive '{}'", self.name);
            return;
        }
        state.references -= 1;
        let idle = state.references == 0;
        log::trace!(
            "archive '{}' released ({} references)",
            self.name,
            state.references
        );
        drop(state);

        if idle {
            log::debug!(
                "archive '{}' has no more references; scheduling delayed unload",
                self.name
            );
            pool.schedule(Arc::clone(self));
        }
    }

    /// Loads the archive, blocking the caller until it is resident.
    ///
    /// A unit already `Loading` (an async fetch is suspended somewhere) is
    /// drained synchronously: the blocking pipeline runs to completion and
    /// the idempotent install picks a winner against the suspended fetch,
    /// which discards its own late result.
    pub(crate) fn load_blocking(self: &Arc<Self>, env: &LoadEnv) -> Result<ArchiveRef, BundleError> {
        if let Some(archive) = self.ready_or_claim() {
            return Ok(archive);
        }

        log::trace!(
            "loading archive '{}' of package '{}' (blocking)",
            self.name,
            env.package
        );
        match self.blocking_pipeline(env) {
            Ok(archive) => Ok(self.install(archive)),
            Err(err) => {
                self.abort_inflight();
                Err(err)
            }
        }
    }

    /// Resolves a `Loading` unit synchronously; a no-op on any other phase
    /// beyond returning the resident archive (or loading it, if nothing has
    /// started yet).
    pub(crate) fn force_finish(self: &Arc<Self>, env: &LoadEnv) -> Result<ArchiveRef, BundleError> {
        self.load_blocking(env)
    }

    /// Loads the archive cooperatively.
    ///
    /// The first caller claims the fetch; every concurrent caller subscribes
    /// to the same in-flight completion and resolves with the same archive
    /// object once it lands. Exactly one fetch runs per claim.
    pub(crate) async fn load_async(
        self: &Arc<Self>,
        env: &LoadEnv,
    ) -> Result<ArchiveRef, BundleError> {
        match self.entry() {
            Entry::Ready(archive) => Ok(archive),
            Entry::Wait(waiter) => {
                waiter.wait().await;
                self.archive().ok_or_else(|| BundleError::ArchiveUnavailable {
                    archive: self.name.clone(),
                })
            }
            Entry::Fetch => {
                log::trace!(
                    "loading archive '{}' of package '{}' (async)",
                    self.name,
                    env.package
                );
                let fetched = env
                    .ctx
                    .fetch
                    .fetch(&self.location, &self.progress)
                    .await
                    .map_err(|source| BundleError::Fetch {
                        archive: self.name.clone(),
                        source: Box::new(source),
                    });

                match fetched.and_then(|bytes| self.finish_pipeline(env, bytes)) {
                    Ok(archive) => Ok(self.install(archive)),
                    Err(err) => {
                        self.abort_inflight();
                        Err(err)
                    }
                }
            }
        }
    }

    /// Drops the archive object after the pool's grace window expired.
    ///
    /// Skipped when the reference count returned to nonzero in the meantime;
    /// reclamation is never allowed to race a live consumer.
    pub(crate) fn unload(&self) {
        let mut state = self.state.lock().unwrap();
        if state.references > 0 {
            log::debug!("skipping unload of re-referenced archive '{}'", self.name);
            return;
        }
        state.phase = LoadPhase::NotLoaded;
        state.archive = None;
        state.inflight = None;
        drop(state);

        self.progress.reset();
        log::debug!("unloaded archive '{}'", self.name);
    }

    /// Unconditionally drops all state. Package-shutdown only.
    pub(crate) fn discard(&self) {
        let mut state = self.state.lock().unwrap();
        if state.references > 0 {
            log::warn!(
                "discarding archive '{}' with {} live references",
                self.name,
                state.references
            );
        }
        state.references = 0;
        state.phase = LoadPhase::NotLoaded;
        state.archive = None;
        state.inflight = None;
        drop(state);

        self.progress.reset();
    }

    /// Returns the resident archive, or claims the load by transitioning to
    /// `Loading` with a fresh in-flight signal. `None` means the caller owns
    /// (or is draining) the pipeline.
    fn ready_or_claim(&self) -> Option<ArchiveRef> {
        let mut state = self.state.lock().unwrap();
        match state.phase {
            LoadPhase::Loaded => state.archive.clone(),
            LoadPhase::Loading => None,
            LoadPhase::NotLoaded => {
                state.phase = LoadPhase::Loading;
                state.inflight = Some(CompletionSignal::new());
                None
            }
        }
    }

    /// Classifies an async caller against the current phase.
    fn entry(&self) -> Entry {
        let mut state = self.state.lock().unwrap();
        match state.phase {
            LoadPhase::Loaded => {
                if let Some(archive) = state.archive.clone() {
                    Entry::Ready(archive)
                } else {
                    log::error!("archive '{}' marked loaded without an object", self.name);
                    state.phase = LoadPhase::Loading;
                    state.inflight = Some(CompletionSignal::new());
                    Entry::Fetch
                }
            }
            LoadPhase::Loading => {
                if let Some(signal) = state.inflight.as_ref() {
                    Entry::Wait(signal.waiter())
                } else {
                    log::error!(
                        "archive '{}' is loading without an in-flight signal",
                        self.name
                    );
                    state.inflight = Some(CompletionSignal::new());
                    Entry::Fetch
                }
            }
            LoadPhase::NotLoaded => {
                state.phase = LoadPhase::Loading;
                state.inflight = Some(CompletionSignal::new());
                Entry::Fetch
            }
        }
    }

    /// Runs fetch → decrypt → assemble on the blocking variants.
    fn blocking_pipeline(&self, env: &LoadEnv) -> Result<ArchiveRef, BundleError> {
        let bytes = env
            .ctx
            .fetch
            .fetch_blocking(&self.location)
            .map_err(|source| BundleError::Fetch {
                archive: self.name.clone(),
                source: Box::new(source),
            })?;
        self.finish_pipeline(env, bytes)
    }

    /// Runs decrypt → assemble on already-fetched bytes.
    fn finish_pipeline(&self, env: &LoadEnv, bytes: Vec<u8>) -> Result<ArchiveRef, BundleError> {
        let bytes = env
            .ctx
            .cipher
            .decrypt(bytes, env.secret_key.as_deref())
            .map_err(|source| BundleError::Cipher {
                archive: self.name.clone(),
                source: Box::new(source),
            })?;
        env.ctx
            .assembly
            .assemble(&self.name, bytes)
            .map_err(|source| BundleError::Assembly {
                archive: self.name.clone(),
                source: Box::new(source),
            })
    }

    /// Installs a freshly assembled archive and releases every waiter.
    ///
    /// Idempotent: when a competing load path already installed, its result
    /// is kept and the late one is discarded.
    fn install(&self, archive: ArchiveRef) -> ArchiveRef {
        let mut state = self.state.lock().unwrap();
        let kept = if state.phase == LoadPhase::Loaded {
            if let Some(existing) = state.archive.clone() {
                log::debug!("discarding late fetch result for archive '{}'", self.name);
                existing
            } else {
                state.archive = Some(Arc::clone(&archive));
                archive
            }
        } else {
            state.phase = LoadPhase::Loaded;
            state.archive = Some(Arc::clone(&archive));
            archive
        };
        let signal = state.inflight.take();
        drop(state);

        self.progress.set(1.0);
        if let Some(signal) = signal {
            signal.open();
        }
        kept
    }

    /// Unwinds a failed load: back to `NotLoaded`, waiters released so they
    /// can observe the missing archive.
    fn abort_inflight(&self) {
        let mut state = self.state.lock().unwrap();
        if state.phase == LoadPhase::Loading {
            state.phase = LoadPhase::NotLoaded;
        }
        let signal = state.inflight.take();
        drop(state);

        self.progress.reset();
        if let Some(signal) = signal {
            signal.open();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle_agent::context::BundleContext;
    use async_trait::async_trait;
    use desmi_lanes::cipher_lane::PlainCipherLane;
    use desmi_lanes::fetch_lane::{ByteFetchLane, FetchError, MemoryFetchLane};
    use desmi_lanes::pack_lane::{encode_records, RecordArchiveLane};
    use std::time::Duration;

    fn test_unit(archive: &str) -> SharedUnit {
        ArchiveUnit::new(
            archive.to_string(),
            format!("pkg/{archive}"),
            ArchiveOrigin::File,
        )
    }

    fn test_env(fetch: Arc<dyn ByteFetchLane>) -> LoadEnv {
        LoadEnv {
            ctx: Arc::new(BundleContext::new(
                fetch,
                Arc::new(PlainCipherLane),
                Arc::new(RecordArchiveLane),
            )),
            package: "pkg".to_string(),
            secret_key: None,
        }
    }

    fn populated_lane(archive: &str) -> Arc<MemoryFetchLane> {
        let lane = Arc::new(MemoryFetchLane::new());
        let bytes =
            encode_records(&[("entry".to_string(), b"payload".to_vec())]).expect("encode");
        lane.insert(format!("pkg/{archive}"), bytes);
        lane
    }

    fn test_pool() -> UnloadPool {
        UnloadPool::new(Duration::from_secs(60))
    }

    #[test]
    fn acquire_and_release_track_references() {
        let pool = test_pool();
        let unit = test_unit("ui_menu");

        unit.acquire(&pool);
        unit.acquire(&pool);
        assert_eq!(unit.reference_count(), 2);

        unit.release(&pool);
        assert_eq!(unit.reference_count(), 1);
        assert!(!pool.contains("pkg/ui_menu"));

        unit.release(&pool);
        assert_eq!(unit.reference_count(), 0);
        assert!(pool.contains("pkg/ui_menu"));
    }

    #[test]
    fn release_underflow_is_tolerated() {
        let pool = test_pool();
        let unit = test_unit("ui_menu");

        unit.release(&pool);
        assert_eq!(unit.reference_count(), 0);
        assert!(!pool.contains("pkg/ui_menu"));
    }

    #[test]
    fn reacquire_cancels_a_scheduled_unload() {
        let pool = test_pool();
        let unit = test_unit("ui_menu");

        unit.acquire(&pool);
        unit.release(&pool);
        assert!(pool.contains("pkg/ui_menu"));

        unit.acquire(&pool);
        assert!(!pool.contains("pkg/ui_menu"));
    }

    #[test]
    fn blocking_load_fetches_once() {
        let lane = populated_lane("ui_menu");
        let env = test_env(lane.clone());
        let unit = test_unit("ui_menu");

        let first = unit.load_blocking(&env).expect("first load");
        let second = unit.load_blocking(&env).expect("second load");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(unit.phase(), LoadPhase::Loaded);
        assert_eq!(unit.progress(), 1.0);
        assert_eq!(lane.fetch_count(), 1);
    }

    #[test]
    fn failed_fetch_resets_the_unit() {
        let lane = Arc::new(MemoryFetchLane::new());
        let env = test_env(lane);
        let unit = test_unit("absent");

        let result = unit.load_blocking(&env);
        assert!(matches!(result, Err(BundleError::Fetch { .. })));
        assert_eq!(unit.phase(), LoadPhase::NotLoaded);
        assert_eq!(unit.progress(), 0.0);
    }

    #[tokio::test]
    async fn concurrent_async_loads_share_one_fetch() {
        let lane = populated_lane("ui_menu");
        let env = test_env(lane.clone());
        let unit = test_unit("ui_menu");

        let (first, second) = tokio::join!(unit.load_async(&env), unit.load_async(&env));

        let first = first.expect("first load");
        let second = second.expect("second load");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(lane.fetch_count(), 1);
    }

    /// A fetch lane whose async path parks until a gate opens, so tests can
    /// observe a unit mid-`Loading`.
    struct GatedFetchLane {
        inner: MemoryFetchLane,
        gate: CompletionSignal,
    }

    #[async_trait]
    impl ByteFetchLane for GatedFetchLane {
        fn fetch_blocking(&self, location: &str) -> Result<Vec<u8>, FetchError> {
            self.inner.fetch_blocking(location)
        }

        async fn fetch(
            &self,
            location: &str,
            progress: &desmi_core::bundle::ProgressCell,
        ) -> Result<Vec<u8>, FetchError> {
            self.gate.waiter().wait().await;
            self.inner.fetch(location, progress).await
        }
    }

    #[tokio::test]
    async fn force_finish_drains_an_inflight_async_load() {
        let gated = Arc::new(GatedFetchLane {
            inner: MemoryFetchLane::new(),
            gate: CompletionSignal::new(),
        });
        let bytes =
            encode_records(&[("entry".to_string(), b"payload".to_vec())]).expect("encode");
        gated.inner.insert("pkg/ui_menu", bytes);

        let env = test_env(gated.clone());
        let unit = test_unit("ui_menu");

        let task = tokio::spawn({
            let unit = Arc::clone(&unit);
            let env = env.clone();
            async move { unit.load_async(&env).await }
        });

        // Let the async load claim the fetch and park at the gate.
        while unit.phase() != LoadPhase::Loading {
            tokio::task::yield_now().await;
        }

        let forced = unit.force_finish(&env).expect("forced load");
        assert_eq!(unit.phase(), LoadPhase::Loaded);

        gated.gate.open();
        let suspended = task.await.expect("join").expect("suspended load");

        // The forced install won; the suspended fetch discarded its result.
        assert!(Arc::ptr_eq(&forced, &suspended));
    }

    #[test]
    fn unload_drops_the_archive() {
        let lane = populated_lane("ui_menu");
        let env = test_env(lane);
        let pool = test_pool();
        let unit = test_unit("ui_menu");

        unit.acquire(&pool);
        unit.load_blocking(&env).expect("load");
        unit.release(&pool);

        unit.unload();
        assert_eq!(unit.phase(), LoadPhase::NotLoaded);
        assert!(unit.archive().is_none());
    }

    #[test]
    fn unload_skips_a_reacquired_unit() {
        let lane = populated_lane("ui_menu");
        let env = test_env(lane);
        let pool = test_pool();
        let unit = test_unit("ui_menu");

        unit.acquire(&pool);
        unit.load_blocking(&env).expect("load");

        unit.unload();
        assert_eq!(unit.phase(), LoadPhase::Loaded);
        assert!(unit.archive().is_some());
    }
}
