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

use std::collections::BTreeMap;

use crate::errors::TopologyError;
use crate::{CpuDetails, CpuInfo};

/// Static description of the machine: where every logical CPU sits.
///
/// The hierarchy is strictly nested: a core lives in exactly one uncore cache and one
/// socket, an uncore cache in exactly one socket. NUMA nodes may contain several sockets
/// or split a socket, both layouts are supported by the assignment code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuTopology {
    num_cpus: usize,
    num_cores: usize,
    num_sockets: usize,
    num_numa_nodes: usize,
    num_uncore_caches: usize,
    details: CpuDetails,
}

impl CpuTopology {
    pub fn new(details: CpuDetails) -> Result<Self, TopologyError> {
        if details.is_empty() {
            return Err(TopologyError::Empty);
        }

        let mut core_parents = BTreeMap::new();
        let mut cache_parents = BTreeMap::new();
        for (cpu, info) in details.iter() {
            let parents = (info.socket_id, info.uncore_cache_id);
            if let Some(known) = core_parents.insert(info.core_id, parents) {
                if known != parents {
                    return Err(TopologyError::CoreNotNested {
                        cpu,
                        core: info.core_id,
                    });
                }
            }
            if let Some(known) = cache_parents.insert(info.uncore_cache_id, info.socket_id) {
                if known != info.socket_id {
                    return Err(TopologyError::UncoreCacheNotNested {
                        cpu,
                        uncore_cache: info.uncore_cache_id,
                    });
                }
            }
        }

        Ok(Self {
            num_cpus: details.len(),
            num_cores: details.cores().len(),
            num_sockets: details.sockets().len(),
            num_numa_nodes: details.numa_nodes().len(),
            num_uncore_caches: details.uncore_caches().len(),
            details,
        })
    }

    pub fn num_cpus(&self) -> usize {
        self.num_cpus
    }

    pub fn num_cores(&self) -> usize {
        self.num_cores
    }

    pub fn num_sockets(&self) -> usize {
        self.num_sockets
    }

    pub fn num_numa_nodes(&self) -> usize {
        self.num_numa_nodes
    }

    pub fn num_uncore_caches(&self) -> usize {
        self.num_uncore_caches
    }

    pub fn details(&self) -> &CpuDetails {
        &self.details
    }

    pub fn cpu_info(&self, cpu: usize) -> Option<&CpuInfo> {
        self.details.get(cpu)
    }

    pub fn cpus_per_core(&self) -> usize {
        self.num_cpus / self.num_cores
    }

    pub fn cpus_per_socket(&self) -> usize {
        self.num_cpus / self.num_sockets
    }

    /// Average number of logical CPUs behind one uncore cache.
    ///
    /// This is an estimate: on machines where caches have different sizes (for example a
    /// VM that got threads unevenly from the host chips) it is wrong for some caches, and
    /// such caches are never reported as entirely free.
    pub fn cpus_per_uncore_cache(&self) -> usize {
        self.num_cpus / self.num_uncore_caches
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::TopologyError;
    use crate::{fixtures, CpuDetails, CpuInfo, CpuTopology};

    #[test]
    fn counts_are_derived_from_details() {
        let topology = fixtures::dual_socket_ht();
        assert_eq!(topology.num_cpus(), 12);
        assert_eq!(topology.num_cores(), 6);
        assert_eq!(topology.num_sockets(), 2);
        assert_eq!(topology.num_numa_nodes(), 2);
        assert_eq!(topology.num_uncore_caches(), 2);
        assert_eq!(topology.cpus_per_core(), 2);
        assert_eq!(topology.cpus_per_socket(), 6);
    }

    #[test]
    fn uncore_cache_size_is_an_average() {
        let topology = fixtures::uneven_uncore_caches();
        // caches hold 4, 2, 4 and 2 cpus
        assert_eq!(topology.cpus_per_uncore_cache(), 3);
        assert_eq!(topology.details().cpus_in_uncore_cache(0).len(), 4);
    }

    #[test]
    fn empty_topology_is_rejected() {
        assert_eq!(
            CpuTopology::new(CpuDetails::new()).unwrap_err(),
            TopologyError::Empty
        );
    }

    #[test]
    fn core_spanning_two_caches_is_rejected() {
        let details = CpuDetails::from_iter([
            (0, CpuInfo::new(0, 0, 0, 0)),
            (1, CpuInfo::new(0, 0, 0, 1)),
        ]);
        assert_eq!(
            CpuTopology::new(details).unwrap_err(),
            TopologyError::CoreNotNested { cpu: 1, core: 0 }
        );
    }

    #[test]
    fn cache_spanning_two_sockets_is_rejected() {
        let details = CpuDetails::from_iter([
            (0, CpuInfo::new(0, 0, 0, 0)),
            (1, CpuInfo::new(1, 1, 0, 0)),
        ]);
        assert_eq!(
            CpuTopology::new(details).unwrap_err(),
            TopologyError::UncoreCacheNotNested {
                cpu: 1,
                uncore_cache: 0
            }
        );
    }
}
