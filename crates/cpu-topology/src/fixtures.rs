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

//! Reference machines for tests.

use crate::{CpuDetails, CpuInfo, CpuTopology};

fn build(cpus: impl IntoIterator<Item = (usize, CpuInfo)>) -> CpuTopology {
    CpuTopology::new(CpuDetails::from_iter(cpus)).expect("fixture topology must be valid")
}

/// 1 socket, 4 cores, 2 threads per core. Core `c` holds cpus `c` and `c + 4`.
pub fn single_socket_ht() -> CpuTopology {
    build((0..8).map(|cpu| (cpu, CpuInfo::new(cpu % 4, 0, 0, 0))))
}

/// 2 sockets (one NUMA node each), 6 cores, 2 threads per core.
/// Even cpus are on socket 0, odd cpus on socket 1; core `c` holds cpus `c` and `c + 6`.
pub fn dual_socket_ht() -> CpuTopology {
    build((0..12).map(|cpu| {
        let socket = cpu % 2;
        (cpu, CpuInfo::new(cpu % 6, socket, socket, socket))
    }))
}

/// 1 socket, 8 cores, 2 threads per core, 2 uncore caches of 8 cpus:
/// cache 0 holds cpus 0-7 and cache 1 holds cpus 8-15. Core `c` holds `2c` and `2c + 1`.
pub fn dual_uncore_cache_single_socket_ht() -> CpuTopology {
    build((0..16).map(|cpu| (cpu, CpuInfo::new(cpu / 2, 0, 0, cpu / 8))))
}

/// 2 sockets with caches of different sizes: cache 0 = 0-3, 1 = 4-5, 8 = 6-9, 9 = 10-11.
pub fn uneven_uncore_caches() -> CpuTopology {
    build((0..12).map(|cpu| {
        let socket = if cpu < 6 { 0 } else { 1 };
        let cache = match cpu {
            0..=3 => 0,
            4..=5 => 1,
            6..=9 => 8,
            _ => 9,
        };
        (cpu, CpuInfo::new(cpu / 2, socket, 0, cache))
    }))
}

/// 1 socket split into 2 NUMA nodes, each with its own uncore cache.
/// Core `c` holds cpus `c` and `c + 4`; cores 0-1 are on node 0, cores 2-3 on node 1.
pub fn single_socket_two_numa_nodes() -> CpuTopology {
    build((0..8).map(|cpu| {
        let core = cpu % 4;
        let node = core / 2;
        (cpu, CpuInfo::new(core, 0, node, node))
    }))
}
