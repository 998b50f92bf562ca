/*
 * Copyright 2024 Fluence DAO
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Exclusive cpu assignment over a static machine topology.
//!
//! Requests are packed into the smallest topology unit that fits them: whole NUMA nodes
//! or sockets first, then (optionally) whole uncore cache domains or a single domain with
//! enough room, then whole cores, and finally single cpus.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use fxhash::FxHasher;

pub type Map<K, V> = HashMap<K, V, BuildHasherDefault<FxHasher>>;

pub mod accumulator;
pub mod config;
pub mod errors;
pub mod types;

mod manager;
mod order;
mod packing;
mod uncore_cache;

pub use cpu_topology;

pub use accumulator::CpuAccumulator;
pub use config::{AssignmentOptions, CpuManagerConfig, CpuSortingStrategy};
pub use manager::CpuManager;
#[cfg(feature = "mockall")]
pub use manager::MockCpuManager;
pub use manager::StaticCpuManager;
pub use packing::take_by_topology_numa_packed;
pub use types::ContainerId;
