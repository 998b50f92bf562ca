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

use cpu_topology::{CpuSet, CpuTopology};
use parking_lot::RwLock;

use crate::config::{AssignmentOptions, CpuManagerConfig};
use crate::errors::ManagerError;
use crate::packing::take_by_topology_numa_packed;
use crate::types::ContainerId;
use crate::Map;

#[cfg_attr(feature = "mockall", mockall::automock)]
pub trait CpuManager: Send + Sync {
    /// Assigns `num_cpus` exclusive cpus to `container`.
    fn allocate(&self, container: &ContainerId, num_cpus: usize) -> Result<CpuSet, ManagerError>;

    /// Returns the cpus of `container` to the free pool.
    fn release(&self, container: &ContainerId) -> Option<CpuSet>;

    fn assignment(&self, container: &ContainerId) -> Option<CpuSet>;

    fn free_cpus(&self) -> CpuSet;
}

/// Hands out exclusive cpus from the node's free pool.
///
/// Requests are serialized by the state lock: each allocation sees the free pool left
/// by the previous one and runs the whole packing pipeline under the write lock.
pub struct StaticCpuManager {
    topology: CpuTopology,
    options: AssignmentOptions,
    reserved: CpuSet,
    state: RwLock<CpuManagerState>,
}

pub(crate) struct CpuManagerState {
    // cpus not reserved and not assigned to any container
    pub free: CpuSet,
    pub assignments: Map<ContainerId, CpuSet>,
}

impl StaticCpuManager {
    pub fn new(topology: CpuTopology, config: CpuManagerConfig) -> Result<Self, ManagerError> {
        config.options.validate()?;

        let all_cpus = topology.details().cpus();
        if !config.reserved_cpus.is_subset(&all_cpus) {
            return Err(ManagerError::ReservedOutsideTopology {
                reserved: config.reserved_cpus,
            });
        }

        let free = all_cpus.difference(&config.reserved_cpus);
        tracing::info!(
            target: "cpu-assignment",
            reserved = %config.reserved_cpus,
            free = %free,
            uncore_cache_align = config.options.prefer_align_by_uncore_cache,
            "Cpu manager initialized"
        );

        Ok(Self {
            topology,
            options: config.options,
            reserved: config.reserved_cpus,
            state: RwLock::new(CpuManagerState {
                free,
                assignments: Map::default(),
            }),
        })
    }

    pub fn topology(&self) -> &CpuTopology {
        &self.topology
    }

    pub fn reserved_cpus(&self) -> &CpuSet {
        &self.reserved
    }
}

impl CpuManager for StaticCpuManager {
    fn allocate(&self, container: &ContainerId, num_cpus: usize) -> Result<CpuSet, ManagerError> {
        let mut lock = self.state.write();

        if let Some(cpus) = lock.assignments.get(container) {
            return Err(ManagerError::AlreadyAssigned {
                container: container.clone(),
                cpus: cpus.clone(),
            });
        }

        let cpus = take_by_topology_numa_packed(&self.topology, &lock.free, num_cpus, &self.options)?;

        lock.free = lock.free.difference(&cpus);
        lock.assignments.insert(container.clone(), cpus.clone());
        tracing::debug!(target: "cpu-assignment", %container, cpus = %cpus, "Assigned exclusive cpus");

        Ok(cpus)
    }

    fn release(&self, container: &ContainerId) -> Option<CpuSet> {
        let mut lock = self.state.write();
        let cpus = lock.assignments.remove(container)?;
        lock.free = lock.free.union(&cpus);
        tracing::debug!(target: "cpu-assignment", %container, cpus = %cpus, "Released exclusive cpus");
        Some(cpus)
    }

    fn assignment(&self, container: &ContainerId) -> Option<CpuSet> {
        self.state.read().assignments.get(container).cloned()
    }

    fn free_cpus(&self) -> CpuSet {
        self.state.read().free.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cpu_topology::{fixtures, CpuSet};

    use crate::config::{AssignmentOptions, CpuManagerConfig};
    use crate::errors::{AssignmentError, ManagerError};
    use crate::manager::{CpuManager, StaticCpuManager};
    use crate::types::ContainerId;

    fn manager(reserved: &str, align: bool) -> StaticCpuManager {
        let config = CpuManagerConfig {
            reserved_cpus: reserved.parse().unwrap(),
            options: AssignmentOptions::default().with_uncore_cache_alignment(align),
        };
        StaticCpuManager::new(fixtures::dual_uncore_cache_single_socket_ht(), config).unwrap()
    }

    #[test]
    fn test_allocate_and_release() {
        let manager = manager("0", true);
        let before = manager.free_cpus();
        assert_eq!(before, CpuSet::from(1..=15));

        let container = ContainerId::from("web");
        let cpus = manager.allocate(&container, 4).unwrap();
        assert_eq!(cpus.len(), 4);
        assert!(!cpus.contains(0));
        assert_eq!(manager.assignment(&container), Some(cpus.clone()));
        assert!(manager.free_cpus().is_disjoint(&cpus));
        assert_eq!(manager.free_cpus().len(), before.len() - 4);

        assert_eq!(manager.release(&container), Some(cpus));
        assert_eq!(manager.free_cpus(), before);
        assert_eq!(manager.assignment(&container), None);
        assert_eq!(manager.release(&container), None);
    }

    #[test]
    fn test_reserved_cpus_break_first_cache() {
        let manager = manager("0", true);
        // cache 0 is no longer whole, cache 1 is
        let cpus = manager.allocate(&ContainerId::from("db"), 8).unwrap();
        assert_eq!(cpus, CpuSet::from(8..=15));
    }

    #[test]
    fn test_double_allocation() {
        let manager = manager("", true);
        let container = ContainerId::from("web");
        manager.allocate(&container, 2).unwrap();

        let result = manager.allocate(&container, 2);
        match result {
            Err(ManagerError::AlreadyAssigned { container: c, cpus }) => {
                assert_eq!(c, container);
                assert_eq!(cpus.len(), 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_exhaustion() {
        let manager = manager("0-7", false);
        manager.allocate(&ContainerId::from("a"), 6).unwrap();

        let result = manager.allocate(&ContainerId::from("b"), 3);
        match result {
            Err(ManagerError::Assignment {
                err: AssignmentError::NotEnoughCpus {
                    requested,
                    available,
                },
            }) => {
                assert_eq!(requested, 3);
                assert_eq!(available, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(manager.free_cpus().len(), 2);
    }

    #[test]
    fn test_reserved_outside_topology() {
        let config = CpuManagerConfig {
            reserved_cpus: CpuSet::from_iter([0, 64]),
            options: AssignmentOptions::default(),
        };
        let result = StaticCpuManager::new(fixtures::single_socket_ht(), config);
        assert_eq!(
            result.err().map(|err| err.to_string()),
            Some("Reserved cpus 0,64 are not part of the topology".to_string())
        );
    }

    #[test]
    fn test_concurrent_requests_never_overlap() {
        let manager = Arc::new(manager("", true));
        let handles: Vec<_> = (0..5)
            .map(|index| {
                let manager = manager.clone();
                std::thread::spawn(move || {
                    manager
                        .allocate(&ContainerId::new(format!("container-{index}")), 3)
                        .unwrap()
                })
            })
            .collect();

        let mut claimed = CpuSet::new();
        for handle in handles {
            let cpus = handle.join().unwrap();
            assert!(claimed.is_disjoint(&cpus));
            claimed = claimed.union(&cpus);
        }
        assert_eq!(claimed.len(), 15);
        assert_eq!(manager.free_cpus(), CpuSet::from(0..=15).difference(&claimed));
    }
}
