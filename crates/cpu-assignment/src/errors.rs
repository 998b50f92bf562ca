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

use std::path::PathBuf;

use cpu_topology::{CpuSet, UncoreCacheId};
use thiserror::Error;

use crate::types::ContainerId;

#[derive(Debug, Error, PartialEq)]
pub enum AssignmentError {
    #[error("not enough cpus available to satisfy request: requested={requested}, available={available}")]
    NotEnoughCpus { requested: usize, available: usize },
    #[error("failed to allocate cpus: requested={requested}, still needed={remaining}")]
    Unsatisfied { requested: usize, remaining: usize },
    #[error(transparent)]
    Invariant {
        #[from]
        err: InvariantViolation,
    },
}

/// Claim bookkeeping went wrong. Always a defect, never an expected outcome.
#[derive(Debug, Error, PartialEq)]
pub enum InvariantViolation {
    #[error("Uncore cache {uncore_cache} ran out of free cpus while {remaining} were still counted for it")]
    UncoreCacheExhausted {
        uncore_cache: UncoreCacheId,
        remaining: usize,
    },
    #[error("Aligned claim from uncore cache {uncore_cache} is complete but the request still needs {needed} cpus")]
    NotSatisfied {
        uncore_cache: UncoreCacheId,
        needed: usize,
    },
    #[error("Cpus {cpus} are not free")]
    NotFree { cpus: CpuSet },
    #[error("Claiming {claimed} cpus exceeds the {remaining} still needed")]
    OverClaim { claimed: usize, remaining: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {err}")]
    IoError {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("Failed to deserialize config: {err}")]
    DeserializationError {
        #[from]
        err: toml::de::Error,
    },
    #[error("Uncore cache alignment can't be combined with the spread cpu sorting strategy")]
    IncompatibleOptions,
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Container {container} already has cpus {cpus}")]
    AlreadyAssigned { container: ContainerId, cpus: CpuSet },
    #[error("Reserved cpus {reserved} are not part of the topology")]
    ReservedOutsideTopology { reserved: CpuSet },
    #[error(transparent)]
    Config {
        #[from]
        err: ConfigError,
    },
    #[error(transparent)]
    Assignment {
        #[from]
        err: AssignmentError,
    },
}
