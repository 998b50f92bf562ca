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

use std::collections::{BTreeMap, BTreeSet};

use crate::{CoreId, CpuId, CpuSet, NumaNodeId, SocketId, UncoreCacheId};

/// Placement of a single logical CPU in the machine hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuInfo {
    pub core_id: CoreId,
    pub socket_id: SocketId,
    pub numa_node_id: NumaNodeId,
    pub uncore_cache_id: UncoreCacheId,
}

impl CpuInfo {
    pub fn new(
        core_id: CoreId,
        socket_id: SocketId,
        numa_node_id: NumaNodeId,
        uncore_cache_id: UncoreCacheId,
    ) -> Self {
        Self {
            core_id,
            socket_id,
            numa_node_id,
            uncore_cache_id,
        }
    }
}

/// Per-CPU placement map with the membership queries used by the assignment code.
///
/// Every query answers relative to the CPUs present in this map, so a map restricted
/// to the free CPUs (see [`CpuDetails::keep_only`]) answers "which free CPUs belong to X".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuDetails(BTreeMap<CpuId, CpuInfo>);

impl CpuDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cpu: CpuId, info: CpuInfo) -> Option<CpuInfo> {
        self.0.insert(cpu, info)
    }

    pub fn get(&self, cpu: CpuId) -> Option<&CpuInfo> {
        self.0.get(&cpu)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CpuId, &CpuInfo)> + '_ {
        self.0.iter().map(|(cpu, info)| (*cpu, info))
    }

    /// Returns a copy restricted to CPUs contained in `cpus`.
    pub fn keep_only(&self, cpus: &CpuSet) -> CpuDetails {
        CpuDetails(
            self.0
                .iter()
                .filter(|(cpu, _)| cpus.contains(**cpu))
                .map(|(cpu, info)| (*cpu, *info))
                .collect(),
        )
    }

    pub fn cpus(&self) -> CpuSet {
        self.0.keys().collect()
    }

    pub fn cores(&self) -> BTreeSet<CoreId> {
        self.0.values().map(|info| info.core_id).collect()
    }

    pub fn sockets(&self) -> BTreeSet<SocketId> {
        self.0.values().map(|info| info.socket_id).collect()
    }

    pub fn numa_nodes(&self) -> BTreeSet<NumaNodeId> {
        self.0.values().map(|info| info.numa_node_id).collect()
    }

    pub fn uncore_caches(&self) -> BTreeSet<UncoreCacheId> {
        self.0.values().map(|info| info.uncore_cache_id).collect()
    }

    pub fn sockets_in_numa_node(&self, numa_node: NumaNodeId) -> BTreeSet<SocketId> {
        self.collect_where(|info| info.numa_node_id == numa_node, |info| info.socket_id)
    }

    pub fn numa_nodes_in_socket(&self, socket: SocketId) -> BTreeSet<NumaNodeId> {
        self.collect_where(|info| info.socket_id == socket, |info| info.numa_node_id)
    }

    pub fn cores_in_numa_node(&self, numa_node: NumaNodeId) -> BTreeSet<CoreId> {
        self.collect_where(|info| info.numa_node_id == numa_node, |info| info.core_id)
    }

    pub fn cores_in_socket(&self, socket: SocketId) -> BTreeSet<CoreId> {
        self.collect_where(|info| info.socket_id == socket, |info| info.core_id)
    }

    pub fn cores_in_uncore_cache(&self, uncore_cache: UncoreCacheId) -> BTreeSet<CoreId> {
        self.collect_where(|info| info.uncore_cache_id == uncore_cache, |info| info.core_id)
    }

    pub fn uncore_caches_in_socket(&self, socket: SocketId) -> BTreeSet<UncoreCacheId> {
        self.collect_where(|info| info.socket_id == socket, |info| info.uncore_cache_id)
    }

    pub fn cpus_in_numa_node(&self, numa_node: NumaNodeId) -> CpuSet {
        self.cpus_where(|info| info.numa_node_id == numa_node)
    }

    pub fn cpus_in_socket(&self, socket: SocketId) -> CpuSet {
        self.cpus_where(|info| info.socket_id == socket)
    }

    pub fn cpus_in_core(&self, core: CoreId) -> CpuSet {
        self.cpus_where(|info| info.core_id == core)
    }

    pub fn cpus_in_uncore_cache(&self, uncore_cache: UncoreCacheId) -> CpuSet {
        self.cpus_where(|info| info.uncore_cache_id == uncore_cache)
    }

    fn cpus_where(&self, predicate: impl Fn(&CpuInfo) -> bool) -> CpuSet {
        self.0
            .iter()
            .filter(|&(_, info)| predicate(info))
            .map(|(cpu, _)| *cpu)
            .collect()
    }

    fn collect_where(
        &self,
        predicate: impl Fn(&CpuInfo) -> bool,
        id: impl Fn(&CpuInfo) -> usize,
    ) -> BTreeSet<usize> {
        self.0
            .values()
            .filter(|&info| predicate(info))
            .map(id)
            .collect()
    }
}

impl FromIterator<(CpuId, CpuInfo)> for CpuDetails {
    fn from_iter<T: IntoIterator<Item = (CpuId, CpuInfo)>>(iter: T) -> Self {
        CpuDetails(iter.into_iter().collect())
    }
}
