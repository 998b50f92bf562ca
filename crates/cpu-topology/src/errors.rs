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

use thiserror::Error;

use crate::cpu_set::ParseError;
use crate::{CoreId, CpuId, UncoreCacheId};

#[derive(Debug, Error, PartialEq)]
pub enum TopologyError {
    #[error("Topology must contain at least one cpu")]
    Empty,
    #[error("Core {core} of cpu {cpu} spans several sockets or uncore caches")]
    CoreNotNested { cpu: CpuId, core: CoreId },
    #[error("Uncore cache {uncore_cache} of cpu {cpu} spans several sockets")]
    UncoreCacheNotNested {
        cpu: CpuId,
        uncore_cache: UncoreCacheId,
    },
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Failed to read {path}: {err}")]
    IoError {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("Failed to parse cpu list in {path}: {err}")]
    CpuListError {
        path: PathBuf,
        #[source]
        err: ParseError,
    },
    #[error("Failed to parse number in {path}: {raw_str}")]
    NumberError { path: PathBuf, raw_str: String },
    #[error("No online cpus found under {path}")]
    NoCpus { path: PathBuf },
    #[error(transparent)]
    Topology {
        #[from]
        err: TopologyError,
    },
}
