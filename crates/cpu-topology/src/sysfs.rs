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

//! Topology discovery from the Linux sysfs tree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::DiscoveryError;
use crate::{CpuDetails, CpuId, CpuInfo, CpuSet, CpuTopology, NumaNodeId};

const DEFAULT_SYSFS_ROOT: &str = "/sys";

/// Reads the topology of the running machine from `/sys`.
pub fn discover() -> Result<CpuTopology, DiscoveryError> {
    discover_from(Path::new(DEFAULT_SYSFS_ROOT))
}

/// Reads the topology from a sysfs tree mounted at `root`.
///
/// The core id of a cpu is the lowest cpu among its thread siblings, which keeps core
/// ids unique across sockets. The uncore cache is the L3 (`cache/index3`); machines
/// without one get a cache per socket.
pub fn discover_from(root: &Path) -> Result<CpuTopology, DiscoveryError> {
    let cpu_root = root.join("devices/system/cpu");
    let online = read_cpu_list(&cpu_root.join("online"))?;
    if online.is_empty() {
        return Err(DiscoveryError::NoCpus { path: cpu_root });
    }

    let numa_nodes = read_numa_nodes(&root.join("devices/system/node"))?;

    let mut details = CpuDetails::new();
    for cpu in online.iter() {
        let cpu_dir = cpu_root.join(format!("cpu{cpu}"));
        let socket_id = read_number(&cpu_dir.join("topology/physical_package_id"))?;
        let siblings = read_cpu_list(&cpu_dir.join("topology/thread_siblings_list"))?;
        let core_id = siblings.iter().next().unwrap_or(cpu);

        let l3_id = cpu_dir.join("cache/index3/id");
        let uncore_cache_id = if l3_id.exists() {
            read_number(&l3_id)?
        } else {
            socket_id
        };

        let numa_node_id = numa_nodes.get(&cpu).copied().unwrap_or_default();

        details.insert(
            cpu,
            CpuInfo::new(core_id, socket_id, numa_node_id, uncore_cache_id),
        );
    }

    let topology = CpuTopology::new(details)?;
    tracing::debug!(
        target: "cpu-topology",
        cpus = topology.num_cpus(),
        cores = topology.num_cores(),
        sockets = topology.num_sockets(),
        numa_nodes = topology.num_numa_nodes(),
        uncore_caches = topology.num_uncore_caches(),
        "Discovered cpu topology"
    );
    Ok(topology)
}

fn read_numa_nodes(node_root: &Path) -> Result<BTreeMap<CpuId, NumaNodeId>, DiscoveryError> {
    let mut result = BTreeMap::new();
    if !node_root.exists() {
        tracing::debug!(target: "cpu-topology", "No NUMA information found, assuming a single node");
        return Ok(result);
    }

    let entries = std::fs::read_dir(node_root).map_err(|err| DiscoveryError::IoError {
        path: node_root.to_path_buf(),
        err,
    })?;
    for entry in entries {
        let entry = entry.map_err(|err| DiscoveryError::IoError {
            path: node_root.to_path_buf(),
            err,
        })?;
        let file_name = entry.file_name();
        let node_id = match file_name
            .to_str()
            .and_then(|name| name.strip_prefix("node"))
            .and_then(|id| id.parse::<NumaNodeId>().ok())
        {
            Some(node_id) => node_id,
            None => continue,
        };
        for cpu in read_cpu_list(&entry.path().join("cpulist"))?.iter() {
            result.insert(cpu, node_id);
        }
    }
    Ok(result)
}

fn read_to_string(path: &Path) -> Result<String, DiscoveryError> {
    std::fs::read_to_string(path).map_err(|err| DiscoveryError::IoError {
        path: path.to_path_buf(),
        err,
    })
}

fn read_cpu_list(path: &Path) -> Result<CpuSet, DiscoveryError> {
    let raw_str = read_to_string(path)?;
    CpuSet::from_str(raw_str.as_str()).map_err(|err| DiscoveryError::CpuListError {
        path: PathBuf::from(path),
        err,
    })
}

fn read_number(path: &Path) -> Result<usize, DiscoveryError> {
    let raw_str = read_to_string(path)?;
    raw_str
        .trim()
        .parse::<usize>()
        .map_err(|_| DiscoveryError::NumberError {
            path: path.to_path_buf(),
            raw_str: raw_str.trim().to_string(),
        })
}
