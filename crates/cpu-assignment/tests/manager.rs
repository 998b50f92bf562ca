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

use std::io::Write;

use cpu_assignment::cpu_topology::{fixtures, CpuSet};
use cpu_assignment::errors::ManagerError;
use cpu_assignment::{
    AssignmentOptions, ContainerId, CpuManager, CpuManagerConfig, CpuSortingStrategy,
    StaticCpuManager,
};

fn load_config(raw: &str) -> CpuManagerConfig {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(raw.as_bytes()).unwrap();
    CpuManagerConfig::load(file.path()).unwrap()
}

#[test]
fn serves_requests_from_the_free_pool() {
    log_utils::enable_logs();
    let config = load_config(
        r#"
        reserved_cpus = "0,8"
        prefer_align_by_uncore_cache = true
        "#,
    );
    let manager =
        StaticCpuManager::new(fixtures::dual_uncore_cache_single_socket_ht(), config).unwrap();
    assert_eq!(manager.reserved_cpus(), &CpuSet::from_iter([0, 8]));

    let mut claimed = CpuSet::new();
    for (index, num_cpus) in [3, 3, 4, 2].into_iter().enumerate() {
        let container = ContainerId::new(format!("worker-{index}"));
        let cpus = manager.allocate(&container, num_cpus).unwrap();
        assert_eq!(cpus.len(), num_cpus);
        assert!(!cpus.contains(0) && !cpus.contains(8));
        assert!(claimed.is_disjoint(&cpus));
        claimed = claimed.union(&cpus);
    }
    assert_eq!(manager.free_cpus().len(), 14 - claimed.len());

    for index in 0..4 {
        let container = ContainerId::new(format!("worker-{index}"));
        assert!(manager.release(&container).is_some());
    }
    assert_eq!(
        manager.free_cpus(),
        CpuSet::from(0..=15).difference(&CpuSet::from_iter([0, 8]))
    );
}

#[test]
fn aligned_requests_share_an_uncore_cache() {
    let config = load_config("prefer_align_by_uncore_cache = true");
    let manager =
        StaticCpuManager::new(fixtures::dual_uncore_cache_single_socket_ht(), config).unwrap();

    let expected = ["0-2", "8-10", "3-5", "11-13"];
    for (index, expected) in expected.into_iter().enumerate() {
        let cpus = manager
            .allocate(&ContainerId::new(format!("c{index}")), 3)
            .unwrap();
        assert_eq!(cpus, expected.parse::<CpuSet>().unwrap());
    }
}

#[test]
fn rejects_incompatible_options() {
    let config = CpuManagerConfig {
        reserved_cpus: CpuSet::new(),
        options: AssignmentOptions::default()
            .with_uncore_cache_alignment(true)
            .with_sorting_strategy(CpuSortingStrategy::Spread),
    };
    let result = StaticCpuManager::new(fixtures::single_socket_ht(), config);
    assert!(matches!(result, Err(ManagerError::Config { .. })));
}
