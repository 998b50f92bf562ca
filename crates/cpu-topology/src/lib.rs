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

pub mod errors;
pub mod sysfs;

mod cpu_set;
mod details;
mod topology;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use cpu_set::{CpuSet, ParseError};
pub use details::{CpuDetails, CpuInfo};
pub use topology::CpuTopology;

/// Logical CPU (hardware thread) id, as the kernel numbers it.
pub type CpuId = usize;
pub type CoreId = usize;
pub type SocketId = usize;
pub type NumaNodeId = usize;
pub type UncoreCacheId = usize;
