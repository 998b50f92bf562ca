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

//! Claim steps that keep a request inside a single uncore (last level) cache.

use cpu_topology::{CpuDetails, CpuId, CpuSet, UncoreCacheId};

use crate::accumulator::CpuAccumulator;
use crate::errors::InvariantViolation;
use crate::Map;

impl CpuAccumulator<'_> {
    /// Uncore caches grouped by socket in socket visiting order, each socket's caches
    /// ordered by free cpus (fewest first, ties by id).
    pub fn sort_available_uncore_caches(&self) -> Vec<UncoreCacheId> {
        let mut result = Vec::new();
        for socket in self.sort_available_sockets() {
            let caches = self.details().uncore_caches_in_socket(socket);
            result.extend(self.sort_by_free_cpus(caches, CpuDetails::cpus_in_uncore_cache));
        }
        result
    }

    /// Uncore caches whose cpus are all free, in visiting order.
    pub fn free_uncore_caches(&self) -> Vec<UncoreCacheId> {
        self.sort_available_uncore_caches()
            .into_iter()
            .filter(|uncore_cache| self.is_uncore_cache_free(*uncore_cache))
            .collect()
    }

    fn is_uncore_cache_free(&self, uncore_cache: UncoreCacheId) -> bool {
        self.details().cpus_in_uncore_cache(uncore_cache).len()
            == self.topology().cpus_per_uncore_cache()
    }

    /// Claims every entirely free uncore cache that the request can still fill.
    ///
    /// Single pass over [`Self::free_uncore_caches`]; a cache bigger than what is still
    /// needed is skipped and never revisited.
    pub fn take_full_uncore_caches(&mut self) {
        if !self.uncore_cache_align {
            return;
        }

        for uncore_cache in self.free_uncore_caches() {
            // equal to the whole cache unless the average size misjudged an uneven one
            let cpus = self.details().cpus_in_uncore_cache(uncore_cache);
            if !self.needs(cpus.len()) {
                continue;
            }
            tracing::debug!(target: "cpu-assignment", uncore_cache, "Claiming whole uncore cache");
            self.claim(&cpus);
        }
    }

    /// Free cpus grouped by uncore cache: caches in [`Self::sort_available_uncore_caches`]
    /// order, and inside each cache the cpus in [`Self::sort_available_cpus`] order.
    pub fn sort_available_cpus_by_uncore_cache(&self) -> Vec<(CpuId, UncoreCacheId)> {
        let cpus: Vec<(CpuId, UncoreCacheId)> = self
            .sort_available_cpus()
            .into_iter()
            .filter_map(|cpu| {
                self.details()
                    .get(cpu)
                    .map(|info| (cpu, info.uncore_cache_id))
            })
            .collect();

        self.sort_available_uncore_caches()
            .into_iter()
            .flat_map(|uncore_cache| {
                cpus.iter()
                    .filter(move |(_, cache)| *cache == uncore_cache)
                    .copied()
            })
            .collect()
    }

    /// Satisfies a small remainder from one uncore cache, or claims nothing.
    ///
    /// Runs only when more than one cpu but less than a whole cache is still needed.
    /// Caches are considered in the same order as in [`Self::take_full_uncore_caches`].
    /// An exact fit wins, otherwise the first cache with the largest surplus. If the free
    /// cpus all share one cache, the request is aligned already and the choice of cpus is
    /// left to core packing.
    pub fn take_aligned_uncore_cache_cpus(&mut self) -> Result<(), InvariantViolation> {
        if !self.uncore_cache_align {
            return Ok(());
        }

        let needed = self.remaining();
        if needed <= 1 || needed >= self.topology().cpus_per_uncore_cache() {
            return Ok(());
        }

        let cpus = self.sort_available_cpus_by_uncore_cache();
        let mut free_per_cache: Map<UncoreCacheId, usize> = Map::default();
        for (_, uncore_cache) in &cpus {
            *free_per_cache.entry(*uncore_cache).or_default() += 1;
        }
        tracing::trace!(target: "cpu-assignment", ?cpus, ?free_per_cache, "Free cpus per uncore cache");

        if free_per_cache.len() <= 1 {
            return Ok(());
        }

        let visiting_order = cpus.iter().map(|(_, uncore_cache)| *uncore_cache);
        let picked = match select_uncore_cache(visiting_order, &free_per_cache, needed) {
            Some(picked) => picked,
            None => return Ok(()),
        };
        tracing::debug!(target: "cpu-assignment", uncore_cache = picked, needed, "Claiming cpus aligned to uncore cache");

        self.claim_from_uncore_cache(cpus, picked, needed)
    }

    fn claim_from_uncore_cache(
        &mut self,
        cpus: Vec<(CpuId, UncoreCacheId)>,
        picked: UncoreCacheId,
        mut needed: usize,
    ) -> Result<(), InvariantViolation> {
        for (cpu, uncore_cache) in cpus {
            if uncore_cache != picked {
                continue;
            }
            self.claim(&CpuSet::from_iter([cpu]));
            needed -= 1;
            if needed == 0 {
                if !self.is_satisfied() {
                    let err = InvariantViolation::NotSatisfied {
                        uncore_cache: picked,
                        needed: self.remaining(),
                    };
                    tracing::error!(target: "cpu-assignment", "{err}");
                    return Err(err);
                }
                return Ok(());
            }
        }

        let err = InvariantViolation::UncoreCacheExhausted {
            uncore_cache: picked,
            remaining: needed,
        };
        tracing::error!(target: "cpu-assignment", "{err}");
        Err(err)
    }
}

/// Picks the cache to serve `needed` cpus from, scanning caches in visiting order.
///
/// A cache with exactly `needed` free cpus is taken at once. Otherwise the first cache
/// whose free count beats every count seen before wins; later caches with an equal
/// count never replace it. Caches with fewer than `needed` free cpus are skipped.
fn select_uncore_cache(
    visiting_order: impl Iterator<Item = UncoreCacheId>,
    free_per_cache: &Map<UncoreCacheId, usize>,
    needed: usize,
) -> Option<UncoreCacheId> {
    let mut picked = None;
    let mut max_free = 0;
    for uncore_cache in visiting_order {
        let free = free_per_cache.get(&uncore_cache).copied().unwrap_or_default();
        if free < needed {
            continue;
        }
        if free == needed {
            return Some(uncore_cache);
        }
        if picked.is_none() || free > max_free {
            picked = Some(uncore_cache);
            max_free = free;
        }
    }
    picked
}
