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

use std::path::Path;

use cpu_topology::CpuSet;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Order in which single cpus are handed out once whole topology units are exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuSortingStrategy {
    /// Fill cores one after another, keeping hyperthread siblings together.
    #[default]
    Packed,
    /// Walk cpus socket by socket in id order, spreading a request over cores.
    Spread,
}

/// Knobs read once per allocation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentOptions {
    /// Prefer claims that stay within a single uncore (last level) cache.
    /// When disabled, allocation behaves exactly as plain topology packing.
    pub prefer_align_by_uncore_cache: bool,
    pub cpu_sorting_strategy: CpuSortingStrategy,
}

impl AssignmentOptions {
    pub fn with_uncore_cache_alignment(mut self, enabled: bool) -> Self {
        self.prefer_align_by_uncore_cache = enabled;

        self
    }

    pub fn with_sorting_strategy(mut self, strategy: CpuSortingStrategy) -> Self {
        self.cpu_sorting_strategy = strategy;

        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefer_align_by_uncore_cache
            && self.cpu_sorting_strategy == CpuSortingStrategy::Spread
        {
            return Err(ConfigError::IncompatibleOptions);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuManagerConfig {
    /// Cpus kept for the system and never handed to containers
    #[serde(default)]
    pub reserved_cpus: CpuSet,

    #[serde(flatten)]
    pub options: AssignmentOptions,
}

impl CpuManagerConfig {
    pub fn from_toml_str(raw_str: &str) -> Result<Self, ConfigError> {
        let config: CpuManagerConfig = toml::from_str(raw_str)?;
        config.options.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw_str = std::fs::read_to_string(path).map_err(|err| ConfigError::IoError {
            path: path.to_path_buf(),
            err,
        })?;
        Self::from_toml_str(raw_str.as_str())
    }
}
