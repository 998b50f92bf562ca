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

use cpu_topology::{CoreId, CpuDetails, CpuId, CpuTopology, NumaNodeId, SocketId};
use enum_dispatch::enum_dispatch;

use crate::accumulator::CpuAccumulator;
use crate::config::CpuSortingStrategy;

/// Which of NUMA nodes and sockets sits higher in the memory hierarchy.
/// The higher level is claimed first and drives the visiting order of the lower ones.
#[enum_dispatch]
pub(crate) trait LevelOrderOperations {
    fn take_full_first_level(&self, acc: &mut CpuAccumulator<'_>);

    fn take_full_second_level(&self, acc: &mut CpuAccumulator<'_>);

    fn sort_available_numa_nodes(&self, acc: &CpuAccumulator<'_>) -> Vec<NumaNodeId>;

    fn sort_available_sockets(&self, acc: &CpuAccumulator<'_>) -> Vec<SocketId>;

    fn sort_available_cores(&self, acc: &CpuAccumulator<'_>) -> Vec<CoreId>;
}

impl From<&CpuTopology> for LevelOrder {
    fn from(topology: &CpuTopology) -> Self {
        if topology.num_sockets() >= topology.num_numa_nodes() {
            LevelOrder::NumaFirst(NumaFirst)
        } else {
            LevelOrder::SocketsFirst(SocketsFirst)
        }
    }
}

#[enum_dispatch(LevelOrderOperations)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LevelOrder {
    NumaFirst(NumaFirst),
    SocketsFirst(SocketsFirst),
}

/// A NUMA node holds one or more whole sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NumaFirst;

impl LevelOrderOperations for NumaFirst {
    fn take_full_first_level(&self, acc: &mut CpuAccumulator<'_>) {
        acc.take_full_numa_nodes()
    }

    fn take_full_second_level(&self, acc: &mut CpuAccumulator<'_>) {
        acc.take_full_sockets()
    }

    fn sort_available_numa_nodes(&self, acc: &CpuAccumulator<'_>) -> Vec<NumaNodeId> {
        acc.sort_by_free_cpus(acc.details().numa_nodes(), CpuDetails::cpus_in_numa_node)
    }

    fn sort_available_sockets(&self, acc: &CpuAccumulator<'_>) -> Vec<SocketId> {
        let mut result = Vec::new();
        for numa_node in self.sort_available_numa_nodes(acc) {
            let sockets = acc.details().sockets_in_numa_node(numa_node);
            result.extend(acc.sort_by_free_cpus(sockets, CpuDetails::cpus_in_socket));
        }
        result
    }

    fn sort_available_cores(&self, acc: &CpuAccumulator<'_>) -> Vec<CoreId> {
        let mut result = Vec::new();
        for socket in self.sort_available_sockets(acc) {
            let cores = acc.details().cores_in_socket(socket);
            result.extend(acc.sort_by_free_cpus(cores, CpuDetails::cpus_in_core));
        }
        result
    }
}

/// A socket is split into several NUMA nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SocketsFirst;

impl LevelOrderOperations for SocketsFirst {
    fn take_full_first_level(&self, acc: &mut CpuAccumulator<'_>) {
        acc.take_full_sockets()
    }

    fn take_full_second_level(&self, acc: &mut CpuAccumulator<'_>) {
        acc.take_full_numa_nodes()
    }

    fn sort_available_numa_nodes(&self, acc: &CpuAccumulator<'_>) -> Vec<NumaNodeId> {
        let mut result = Vec::new();
        for socket in self.sort_available_sockets(acc) {
            let numa_nodes = acc.details().numa_nodes_in_socket(socket);
            result.extend(acc.sort_by_free_cpus(numa_nodes, CpuDetails::cpus_in_numa_node));
        }
        result
    }

    fn sort_available_sockets(&self, acc: &CpuAccumulator<'_>) -> Vec<SocketId> {
        acc.sort_by_free_cpus(acc.details().sockets(), CpuDetails::cpus_in_socket)
    }

    fn sort_available_cores(&self, acc: &CpuAccumulator<'_>) -> Vec<CoreId> {
        let mut result = Vec::new();
        for numa_node in self.sort_available_numa_nodes(acc) {
            let cores = acc.details().cores_in_numa_node(numa_node);
            result.extend(acc.sort_by_free_cpus(cores, CpuDetails::cpus_in_core));
        }
        result
    }
}

/// Produces the order in which single free cpus are visited.
#[enum_dispatch]
pub(crate) trait CpuSorterOperations {
    fn sort(&self, acc: &CpuAccumulator<'_>) -> Vec<CpuId>;
}

impl From<CpuSortingStrategy> for CpuSorter {
    fn from(value: CpuSortingStrategy) -> Self {
        match value {
            CpuSortingStrategy::Packed => CpuSorter::Packed(PackedCpuSorter),
            CpuSortingStrategy::Spread => CpuSorter::Spread(SpreadCpuSorter),
        }
    }
}

#[enum_dispatch(CpuSorterOperations)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CpuSorter {
    Packed(PackedCpuSorter),
    Spread(SpreadCpuSorter),
}

/// Cores in visiting order, cpus ascending inside each core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PackedCpuSorter;

impl CpuSorterOperations for PackedCpuSorter {
    fn sort(&self, acc: &CpuAccumulator<'_>) -> Vec<CpuId> {
        let mut result = Vec::new();
        for core in acc.sort_available_cores() {
            result.extend(acc.details().cpus_in_core(core).iter());
        }
        result
    }
}

/// Sockets in visiting order, cpus ascending inside each socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SpreadCpuSorter;

impl CpuSorterOperations for SpreadCpuSorter {
    fn sort(&self, acc: &CpuAccumulator<'_>) -> Vec<CpuId> {
        let mut result = Vec::new();
        for socket in acc.sort_available_sockets() {
            result.extend(acc.details().cpus_in_socket(socket).iter());
        }
        result
    }
}
