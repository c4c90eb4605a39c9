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

//! The consumer-visible load request.
//!
//! A [`LoadHandle`] binds one asset or scene path to the archive unit that
//! carries it plus every dependency unit its manifest record declares — one
//! hop, in declaration order. The handle holds exactly one reference on each
//! of those units, taken before any fetch begins and released exactly once
//! on unload.
//!
//! Blocking, asynchronous, and forced-finish loading all converge on the
//! same end state; which path ran is unobservable afterwards.

use super::context::LoadEnv;
use super::unit::SharedUnit;
use super::unload::UnloadPool;
use desmi_core::archive::{ArchiveRef, AssetObject};
use desmi_core::bundle::{HandleId, HandlePhase};
use desmi_core::signal::{CompletionSignal, CompletionWaiter};
use futures::future::join_all;
use std::sync::{Arc, Mutex};

/// Shared ownership of a load handle.
pub type SharedHandle = Arc<LoadHandle>;

/// What a handle's payload is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// A typed object extracted from the primary archive.
    Asset,
    /// The primary archive itself; scenes are consumed as whole archives.
    Scene,
}

/// One consumer-visible load request for an asset or scene path.
pub struct LoadHandle {
    id: HandleId,
    path: String,
    package: String,
    kind: HandleKind,
    /// Whether this handle is deduplicated through the registry's path map.
    keyed: bool,
    primary: SharedUnit,
    dependencies: Vec<SharedUnit>,
    /// Opened once the handle reaches `Finished`; duplicate requests while
    /// `Loading` wait on it instead of starting a second load.
    done: CompletionSignal,
    state: Mutex<HandleState>,
}

#[derive(Default)]
struct HandleState {
    phase: HandlePhase,
    asset: Option<AssetObject>,
    /// Set once the unit references have been taken; they are released
    /// exactly once on unload.
    referenced: bool,
    failed: bool,
    unloaded: bool,
}

enum Entry {
    Done(Option<AssetObject>),
    Wait(CompletionWaiter),
    Run,
}

impl LoadHandle {
    /// Binds a handle to its resolved units. The units' references are not
    /// taken yet; that happens when a load starts.
    pub(crate) fn new(
        id: HandleId,
        path: &str,
        package: &str,
        kind: HandleKind,
        keyed: bool,
        primary: SharedUnit,
        dependencies: Vec<SharedUnit>,
    ) -> Self {
        Self {
            id,
            path: path.to_string(),
            package: package.to_string(),
            kind,
            keyed,
            primary,
            dependencies,
            done: CompletionSignal::new(),
            state: Mutex::new(HandleState::default()),
        }
    }

    /// The process-unique handle id.
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// The requested asset or scene path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The owning package name.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Whether this handle carries an asset or a scene.
    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// Whether this handle is deduplicated through the registry's path map.
    pub fn keyed(&self) -> bool {
        self.keyed
    }

    /// The current lifecycle phase.
    pub fn phase(&self) -> HandlePhase {
        self.state.lock().unwrap().phase
    }

    /// The extracted asset object, if the load finished with one.
    pub fn asset(&self) -> Option<AssetObject> {
        self.state.lock().unwrap().asset.clone()
    }

    /// The primary archive, once finished. This is a scene handle's payload.
    pub fn archive(&self) -> Option<ArchiveRef> {
        let state = self.state.lock().unwrap();
        if state.unloaded || state.phase != HandlePhase::Finished {
            return None;
        }
        drop(state);
        self.primary.archive()
    }

    /// The load completion fraction: the arithmetic mean over every
    /// referenced unit (primary included, weight 1 each) while loading, 1
    /// once finished, and 0 for an idle, failed, or unloaded handle.
    pub fn progress(&self) -> f32 {
        let state = self.state.lock().unwrap();
        if state.unloaded || state.failed {
            return 0.0;
        }
        match state.phase {
            HandlePhase::Idle => 0.0,
            HandlePhase::Finished => 1.0,
            HandlePhase::Loading => {
                drop(state);
                let mut sum = 0.0;
                let mut count = 0u32;
                for unit in self.units() {
                    sum += unit.progress();
                    count += 1;
                }
                sum / count as f32
            }
        }
    }

    /// Loads every referenced unit, blocking until the payload is available.
    ///
    /// Also the synchronous drain path: on a handle whose async load is
    /// still in flight this resolves every unit through its own forced
    /// finish and produces a state indistinguishable from a fresh blocking
    /// load.
    pub(crate) fn load_blocking(&self, env: &LoadEnv, pool: &UnloadPool) -> Option<AssetObject> {
        {
            let mut state = self.state.lock().unwrap();
            if state.unloaded {
                log::error!("handle {} ('{}') used after unload", self.id, self.path);
                return None;
            }
            if state.phase == HandlePhase::Finished {
                return state.asset.clone();
            }
            state.phase = HandlePhase::Loading;
        }

        self.take_references(pool);

        let mut primary_archive = None;
        for (index, unit) in self.units().enumerate() {
            match unit.force_finish(env) {
                Ok(archive) => {
                    if index == 0 {
                        primary_archive = Some(archive);
                    }
                }
                Err(err) => log::error!(
                    "failed to load archive '{}' for '{}': {err}",
                    unit.name(),
                    self.path
                ),
            }
        }

        self.finalize(primary_archive)
    }

    /// Synchronously drains an in-flight load; see [`Self::load_blocking`].
    pub(crate) fn force_finish(&self, env: &LoadEnv, pool: &UnloadPool) -> Option<AssetObject> {
        self.load_blocking(env, pool)
    }

    /// Loads every referenced unit cooperatively.
    ///
    /// The first caller takes the references and fires every unit's async
    /// load concurrently; the join barrier is the only ordering across
    /// dependency completions. Callers arriving while the load is in flight
    /// wait on the handle's completion signal and observe the same result.
    pub(crate) async fn load_async(&self, env: &LoadEnv, pool: &UnloadPool) -> Option<AssetObject> {
        let entry = {
            let mut state = self.state.lock().unwrap();
            if state.unloaded {
                log::error!("handle {} ('{}') used after unload", self.id, self.path);
                Entry::Done(None)
            } else {
                match state.phase {
                    HandlePhase::Finished => Entry::Done(state.asset.clone()),
                    HandlePhase::Loading => Entry::Wait(self.done.waiter()),
                    HandlePhase::Idle => {
                        state.phase = HandlePhase::Loading;
                        Entry::Run
                    }
                }
            }
        };

        match entry {
            Entry::Done(asset) => asset,
            Entry::Wait(waiter) => {
                waiter.wait().await;
                self.asset()
            }
            Entry::Run => {
                self.take_references(pool);

                let results = join_all(self.units().map(|unit| unit.load_async(env))).await;

                let mut primary_archive = None;
                for (index, (unit, outcome)) in self.units().zip(results).enumerate() {
                    match outcome {
                        Ok(archive) => {
                            if index == 0 {
                                primary_archive = Some(archive);
                            }
                        }
                        Err(err) => log::error!(
                            "failed to load archive '{}' for '{}': {err}",
                            unit.name(),
                            self.path
                        ),
                    }
                }

                self.finalize(primary_archive)
            }
        }
    }

    /// Tears down the handle: releases every unit reference exactly once and
    /// clears the payload.
    ///
    /// Rejected (logged, `false`) on a double unload, and while a load is in
    /// flight unless `force` is set — package teardown is the one caller
    /// allowed to override that.
    pub(crate) fn unload(&self, pool: &UnloadPool, force: bool) -> bool {
        let release = {
            let mut state = self.state.lock().unwrap();
            if state.unloaded {
                log::error!("double unload of handle {} ('{}')", self.id, self.path);
                return false;
            }
            if state.phase == HandlePhase::Loading && !force {
                log::error!(
                    "rejecting unload of '{}' while its load is in flight",
                    self.path
                );
                return false;
            }
            state.unloaded = true;
            state.asset = None;
            state.referenced
        };

        if release {
            self.primary.release(pool);
            for dependency in &self.dependencies {
                dependency.release(pool);
            }
        }
        log::debug!("handle {} ('{}') unloaded", self.id, self.path);
        true
    }

    /// The primary unit followed by the dependencies, in declaration order.
    fn units(&self) -> impl Iterator<Item = &SharedUnit> + '_ {
        std::iter::once(&self.primary).chain(self.dependencies.iter())
    }

    /// Takes one reference on every unit, exactly once per handle, before
    /// any fetch begins. Primary first.
    fn take_references(&self, pool: &UnloadPool) {
        {
            let mut state = self.state.lock().unwrap();
            if state.referenced {
                return;
            }
            state.referenced = true;
        }

        self.primary.acquire(pool);
        for dependency in &self.dependencies {
            dependency.acquire(pool);
        }
    }

    /// Captures the payload and transitions to `Finished`, exactly once.
    /// Competing load paths (a blocking drain racing the suspended async
    /// completion) both land here; the first one wins.
    fn finalize(&self, primary: Option<ArchiveRef>) -> Option<AssetObject> {
        let (asset, newly_finished) = {
            let mut state = self.state.lock().unwrap();
            if state.unloaded {
                (None, true)
            } else if state.phase == HandlePhase::Finished {
                (state.asset.clone(), false)
            } else {
                let asset = match (self.kind, &primary) {
                    (HandleKind::Asset, Some(archive)) => archive.extract(&self.path),
                    _ => None,
                };
                state.failed = match self.kind {
                    HandleKind::Asset => asset.is_none(),
                    HandleKind::Scene => primary.is_none(),
                };
                if primary.is_none() {
                    log::error!(
                        "load of '{}' finished without its primary archive",
                        self.path
                    );
                } else if self.kind == HandleKind::Asset && asset.is_none() {
                    log::warn!(
                        "archive '{}' carries no entry for '{}'",
                        self.primary.name(),
                        self.path
                    );
                }
                state.phase = HandlePhase::Finished;
                state.asset = asset.clone();
                (asset, true)
            }
        };

        if newly_finished {
            self.done.open();
        }
        asset
    }
}
