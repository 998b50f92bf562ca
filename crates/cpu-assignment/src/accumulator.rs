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

use std::collections::BTreeSet;

use cpu_topology::{CoreId, CpuDetails, CpuId, CpuSet, CpuTopology, NumaNodeId, SocketId};

use crate::config::AssignmentOptions;
use crate::errors::InvariantViolation;
use crate::order::{CpuSorter, CpuSorterOperations, LevelOrder, LevelOrderOperations};

/// Allocation context of a single request.
///
/// Tracks the cpus that are still free (`details`), the cpus claimed so far (`result`)
/// and how many are still needed. Every claim moves cpus from the free pool, so
/// `result` never overlaps the free cpus and `result.len() + remaining() == requested`.
pub struct CpuAccumulator<'a> {
    topology: &'a CpuTopology,
    // free cpus only
    details: CpuDetails,
    num_cpus_needed: usize,
    result: CpuSet,
    level_order: LevelOrder,
    cpu_sorter: CpuSorter,
    pub(crate) uncore_cache_align: bool,
}

impl<'a> CpuAccumulator<'a> {
    pub fn new(
        topology: &'a CpuTopology,
        available: &CpuSet,
        num_cpus: usize,
        options: &AssignmentOptions,
    ) -> Self {
        Self {
            topology,
            details: topology.details().keep_only(available),
            num_cpus_needed: num_cpus,
            result: CpuSet::new(),
            level_order: LevelOrder::from(topology),
            cpu_sorter: CpuSorter::from(options.cpu_sorting_strategy),
            uncore_cache_align: options.prefer_align_by_uncore_cache,
        }
    }

    pub fn topology(&self) -> &'a CpuTopology {
        self.topology
    }

    /// Free cpus with their placement.
    pub fn details(&self) -> &CpuDetails {
        &self.details
    }

    pub fn available(&self) -> CpuSet {
        self.details.cpus()
    }

    pub fn result(&self) -> &CpuSet {
        &self.result
    }

    pub fn into_result(self) -> CpuSet {
        self.result
    }

    pub fn remaining(&self) -> usize {
        self.num_cpus_needed
    }

    /// Moves `cpus` from the free pool into the result.
    ///
    /// Fails without claiming anything if some of `cpus` are not free or if they are
    /// more than the request still needs.
    pub fn take(&mut self, cpus: &CpuSet) -> Result<(), InvariantViolation> {
        let not_free = cpus.difference(&self.available());
        if !not_free.is_empty() {
            return Err(InvariantViolation::NotFree { cpus: not_free });
        }
        if cpus.len() > self.num_cpus_needed {
            return Err(InvariantViolation::OverClaim {
                claimed: cpus.len(),
                remaining: self.num_cpus_needed,
            });
        }
        self.claim(cpus);
        Ok(())
    }

    // callers pick `cpus` among the free ones and never past the request
    pub(crate) fn claim(&mut self, cpus: &CpuSet) {
        debug_assert!(
            cpus.is_subset(&self.available()),
            "claimed cpus {cpus} are not free"
        );
        debug_assert!(cpus.len() <= self.num_cpus_needed);

        self.result = self.result.union(cpus);
        self.details = self
            .details
            .keep_only(&self.details.cpus().difference(&self.result));
        self.num_cpus_needed -= cpus.len();
    }

    /// True if at least `n` more cpus are needed.
    pub fn needs(&self, n: usize) -> bool {
        self.num_cpus_needed >= n
    }

    pub fn is_satisfied(&self) -> bool {
        self.num_cpus_needed == 0
    }

    pub fn is_failed(&self) -> bool {
        self.num_cpus_needed > self.details.len()
    }

    pub(crate) fn take_full_first_level(&mut self) {
        let level_order = self.level_order;
        level_order.take_full_first_level(self)
    }

    pub(crate) fn take_full_second_level(&mut self) {
        let level_order = self.level_order;
        level_order.take_full_second_level(self)
    }

    pub(crate) fn take_full_numa_nodes(&mut self) {
        for numa_node in self.free_numa_nodes() {
            let cpus = self.details.cpus_in_numa_node(numa_node);
            if !self.needs(cpus.len()) {
                continue;
            }
            tracing::debug!(target: "cpu-assignment", numa_node, "Claiming whole NUMA node");
            self.claim(&cpus);
        }
    }

    pub(crate) fn take_full_sockets(&mut self) {
        for socket in self.free_sockets() {
            let cpus = self.details.cpus_in_socket(socket);
            if !self.needs(cpus.len()) {
                continue;
            }
            tracing::debug!(target: "cpu-assignment", socket, "Claiming whole socket");
            self.claim(&cpus);
        }
    }

    pub(crate) fn take_full_cores(&mut self) {
        for core in self.free_cores() {
            let cpus = self.details.cpus_in_core(core);
            if !self.needs(cpus.len()) {
                continue;
            }
            tracing::debug!(target: "cpu-assignment", core, "Claiming whole core");
            self.claim(&cpus);
        }
    }

    pub(crate) fn take_remaining_cpus(&mut self) {
        for cpu in self.sort_available_cpus() {
            tracing::debug!(target: "cpu-assignment", cpu, "Claiming single cpu");
            self.claim(&CpuSet::from_iter([cpu]));
            if self.is_satisfied() {
                return;
            }
        }
    }

    fn is_numa_node_free(&self, numa_node: NumaNodeId) -> bool {
        self.details.cpus_in_numa_node(numa_node).len()
            == self.topology.details().cpus_in_numa_node(numa_node).len()
    }

    fn is_socket_free(&self, socket: SocketId) -> bool {
        self.details.cpus_in_socket(socket).len() == self.topology.cpus_per_socket()
    }

    fn is_core_free(&self, core: CoreId) -> bool {
        self.details.cpus_in_core(core).len() == self.topology.cpus_per_core()
    }

    /// Entirely free NUMA nodes in visiting order.
    pub fn free_numa_nodes(&self) -> Vec<NumaNodeId> {
        self.sort_available_numa_nodes()
            .into_iter()
            .filter(|numa_node| self.is_numa_node_free(*numa_node))
            .collect()
    }

    /// Entirely free sockets in visiting order.
    pub fn free_sockets(&self) -> Vec<SocketId> {
        self.sort_available_sockets()
            .into_iter()
            .filter(|socket| self.is_socket_free(*socket))
            .collect()
    }

    /// Entirely free cores in visiting order.
    pub fn free_cores(&self) -> Vec<CoreId> {
        self.sort_available_cores()
            .into_iter()
            .filter(|core| self.is_core_free(*core))
            .collect()
    }

    pub fn free_cpus(&self) -> Vec<CpuId> {
        self.sort_available_cpus()
    }

    pub fn sort_available_numa_nodes(&self) -> Vec<NumaNodeId> {
        self.level_order.sort_available_numa_nodes(self)
    }

    pub fn sort_available_sockets(&self) -> Vec<SocketId> {
        self.level_order.sort_available_sockets(self)
    }

    pub fn sort_available_cores(&self) -> Vec<CoreId> {
        self.level_order.sort_available_cores(self)
    }

    /// Deterministic order of the free cpus shared by every per-cpu step.
    pub fn sort_available_cpus(&self) -> Vec<CpuId> {
        self.cpu_sorter.sort(self)
    }

    /// Orders `ids` by the number of free cpus they hold, fewest first, ties by id.
    pub(crate) fn sort_by_free_cpus(
        &self,
        ids: BTreeSet<usize>,
        cpus: impl Fn(&CpuDetails, usize) -> CpuSet,
    ) -> Vec<usize> {
        let mut ids: Vec<usize> = ids.into_iter().collect();
        ids.sort_by_cached_key(|id| (cpus(&self.details, *id).len(), *id));
        ids
    }
}
