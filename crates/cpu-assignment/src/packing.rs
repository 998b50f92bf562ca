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

use crate::accumulator::CpuAccumulator;
use crate::config::{AssignmentOptions, CpuSortingStrategy};
use crate::errors::AssignmentError;

/// Picks `num_cpus` cpus out of `available`, packing them into the smallest topology
/// units that can hold them.
///
/// Stages, each one skipped once the request is satisfied:
/// 1. whole NUMA nodes and whole sockets, higher hierarchy level first;
/// 2. with uncore cache alignment enabled, whole uncore caches, then a remainder
///    aligned into a single cache;
/// 3. whole cores (packed strategy only);
/// 4. single cpus in visiting order.
pub fn take_by_topology_numa_packed(
    topology: &CpuTopology,
    available: &CpuSet,
    num_cpus: usize,
    options: &AssignmentOptions,
) -> Result<CpuSet, AssignmentError> {
    let mut acc = CpuAccumulator::new(topology, available, num_cpus, options);
    if acc.is_satisfied() {
        return Ok(acc.into_result());
    }
    if acc.is_failed() {
        return Err(AssignmentError::NotEnoughCpus {
            requested: num_cpus,
            available: acc.available().len(),
        });
    }

    acc.take_full_first_level();
    if acc.is_satisfied() {
        return Ok(acc.into_result());
    }

    acc.take_full_second_level();
    if acc.is_satisfied() {
        return Ok(acc.into_result());
    }

    acc.take_full_uncore_caches();
    if acc.is_satisfied() {
        return Ok(acc.into_result());
    }

    acc.take_aligned_uncore_cache_cpus()?;
    if acc.is_satisfied() {
        return Ok(acc.into_result());
    }

    if options.cpu_sorting_strategy == CpuSortingStrategy::Packed {
        acc.take_full_cores();
        if acc.is_satisfied() {
            return Ok(acc.into_result());
        }
    }

    acc.take_remaining_cpus();
    if acc.is_satisfied() {
        return Ok(acc.into_result());
    }

    Err(AssignmentError::Unsatisfied {
        requested: num_cpus,
        remaining: acc.remaining(),
    })
}

#[cfg(test)]
mod tests {
    use cpu_topology::{fixtures, CpuSet, CpuTopology};

    use crate::config::{AssignmentOptions, CpuSortingStrategy};
    use crate::errors::AssignmentError;
    use crate::packing::take_by_topology_numa_packed;

    fn take(
        topology: &CpuTopology,
        available: &str,
        num_cpus: usize,
        options: &AssignmentOptions,
    ) -> Result<CpuSet, AssignmentError> {
        let available: CpuSet = available.parse().unwrap();
        take_by_topology_numa_packed(topology, &available, num_cpus, options)
    }

    fn aligned() -> AssignmentOptions {
        AssignmentOptions::default().with_uncore_cache_alignment(true)
    }

    struct Case {
        description: &'static str,
        topology: CpuTopology,
        available: &'static str,
        num_cpus: usize,
        expected: &'static str,
    }

    fn legacy_cases() -> Vec<Case> {
        vec![
            Case {
                description: "take zero cpus from single socket with HT",
                topology: fixtures::single_socket_ht(),
                available: "0-7",
                num_cpus: 0,
                expected: "",
            },
            Case {
                description: "take one cpu from single socket with HT",
                topology: fixtures::single_socket_ht(),
                available: "0-7",
                num_cpus: 1,
                expected: "0",
            },
            Case {
                description: "take one cpu from single socket with HT, some cpus are taken",
                topology: fixtures::single_socket_ht(),
                available: "1,3,5,6,7",
                num_cpus: 1,
                expected: "6",
            },
            Case {
                description: "take two cpus from single socket with HT",
                topology: fixtures::single_socket_ht(),
                available: "0-7",
                num_cpus: 2,
                expected: "0,4",
            },
            Case {
                description: "take all cpus from single socket with HT",
                topology: fixtures::single_socket_ht(),
                available: "0-7",
                num_cpus: 8,
                expected: "0-7",
            },
            Case {
                description: "take two cpus from single socket with HT, only one core totally free",
                topology: fixtures::single_socket_ht(),
                available: "0-3,6",
                num_cpus: 2,
                expected: "2,6",
            },
            Case {
                description: "take one cpu from dual socket with HT - core from socket 0",
                topology: fixtures::dual_socket_ht(),
                available: "1-5,7-11",
                num_cpus: 1,
                expected: "2",
            },
            Case {
                description: "take a socket of cpus from dual socket with HT",
                topology: fixtures::dual_socket_ht(),
                available: "0-11",
                num_cpus: 6,
                expected: "0,2,4,6,8,10",
            },
        ]
    }

    #[test]
    fn legacy_results_unchanged() {
        for options in [AssignmentOptions::default(), aligned()] {
            for case in legacy_cases() {
                let result = take(&case.topology, case.available, case.num_cpus, &options)
                    .unwrap_or_else(|err| panic!("[{}] {err}", case.description));
                assert_eq!(
                    result,
                    case.expected.parse().unwrap(),
                    "[{}] alignment: {}",
                    case.description,
                    options.prefer_align_by_uncore_cache
                );
            }
        }
    }

    #[test]
    fn not_enough_cpus() {
        let topology = fixtures::single_socket_ht();
        let result = take(&topology, "0,2,4,6", 5, &aligned());
        assert_eq!(
            result,
            Err(AssignmentError::NotEnoughCpus {
                requested: 5,
                available: 4
            })
        );
        assert_eq!(
            result.unwrap_err().to_string(),
            "not enough cpus available to satisfy request: requested=5, available=4"
        );
    }

    #[test]
    fn exact_fit_cache() {
        let topology = fixtures::dual_uncore_cache_single_socket_ht();
        let result = take(&topology, "0-2,8-12", 3, &aligned()).unwrap();
        assert_eq!(result, CpuSet::from(0..=2));
    }

    #[test]
    fn exact_fit_tie_goes_to_first_visited_cache() {
        let topology = fixtures::dual_uncore_cache_single_socket_ht();
        let result = take(&topology, "0-3,8-10,12", 4, &aligned()).unwrap();
        assert_eq!(result, CpuSet::from(0..=3));
    }

    #[test]
    fn whole_caches_then_single_cpu() {
        let topology = fixtures::dual_uncore_cache_single_socket_ht();
        let result = take(&topology, "0-15", 9, &aligned()).unwrap();
        assert_eq!(result, CpuSet::from(0..=8));

        let result = take(&topology, "0-15", 16, &aligned()).unwrap();
        assert_eq!(result, CpuSet::from(0..=15));
    }

    #[test]
    fn alignment_prefers_emptier_cache() {
        let topology = fixtures::dual_socket_ht();
        let result = take(&topology, "1-5,7-11", 2, &aligned()).unwrap();
        assert_eq!(result, CpuSet::from_iter([1, 7]));

        let result = take(&topology, "1-5,7-11", 2, &AssignmentOptions::default()).unwrap();
        assert_eq!(result, CpuSet::from_iter([2, 8]));
    }

    fn partition(topology: &CpuTopology, num_cpus: usize, options: &AssignmentOptions) -> Vec<String> {
        let mut available = topology.details().cpus();
        let mut results = Vec::new();
        while available.len() >= num_cpus {
            let took = take_by_topology_numa_packed(topology, &available, num_cpus, options).unwrap();
            available = available.difference(&took);
            results.push(took.to_string());
        }
        results
    }

    #[test]
    fn repeated_requests_stay_within_caches() {
        let topology = fixtures::dual_uncore_cache_single_socket_ht();
        assert_eq!(
            partition(&topology, 3, &aligned()),
            vec!["0-2", "8-10", "3-5", "11-13", "6-7,14"]
        );
        assert_eq!(
            partition(&topology, 3, &AssignmentOptions::default()),
            vec!["0-2", "3-5", "6-8", "9-11", "12-14"]
        );
    }

    #[test]
    fn spread_strategy_skips_whole_cores() {
        let topology = fixtures::dual_socket_ht();
        let spread = AssignmentOptions::default().with_sorting_strategy(CpuSortingStrategy::Spread);
        assert_eq!(take(&topology, "0-11", 3, &spread).unwrap(), CpuSet::from_iter([0, 2, 4]));
        assert_eq!(
            take(&topology, "0-11", 3, &AssignmentOptions::default()).unwrap(),
            CpuSet::from_iter([0, 2, 6])
        );
    }

    #[test]
    fn sockets_first_claims_numa_node() {
        let topology = fixtures::single_socket_two_numa_nodes();
        let result = take(&topology, "0-7", 4, &AssignmentOptions::default()).unwrap();
        assert_eq!(result, CpuSet::from_iter([0, 1, 4, 5]));
    }
}
