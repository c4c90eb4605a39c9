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

//! # Desmi Lanes
//!
//! Hot-path I/O executors for the bundle runtime. A lane is a dumb, swappable
//! strategy for one step of the loading pipeline: fetching an archive's raw
//! bytes, decrypting them, or assembling them into a queryable archive
//! object. Lanes hold no loading state of their own; the agent that drives
//! them owns all lifecycle bookkeeping.

pub mod cipher_lane;
pub mod fetch_lane;
pub mod pack_lane;
