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

use range_set_blaze::RangeSetBlaze;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Display, Formatter};
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error;

use crate::CpuId;

/// Immutable set of logical CPU ids.
///
/// Iteration is always ascending, equality is set equality. The text form is the
/// Linux cpulist format, e.g. `0-2,5,7-9`; the empty set renders as an empty string.
#[derive(Clone, PartialEq)]
pub struct CpuSet(pub(crate) RangeSetBlaze<CpuId>);

impl CpuSet {
    pub fn new() -> Self {
        CpuSet(RangeSetBlaze::new())
    }

    pub fn len(&self) -> usize {
        self.0.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, cpu: CpuId) -> bool {
        self.0.contains(cpu)
    }

    pub fn union(&self, other: &CpuSet) -> CpuSet {
        CpuSet(&self.0 | &other.0)
    }

    pub fn difference(&self, other: &CpuSet) -> CpuSet {
        CpuSet(&self.0 - &other.0)
    }

    pub fn intersection(&self, other: &CpuSet) -> CpuSet {
        CpuSet(&self.0 & &other.0)
    }

    pub fn is_subset(&self, other: &CpuSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn is_disjoint(&self, other: &CpuSet) -> bool {
        self.intersection(other).is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = CpuId> + '_ {
        self.0.iter()
    }

    pub fn to_vec(&self) -> Vec<CpuId> {
        self.iter().collect()
    }
}

impl Default for CpuSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Eq for CpuSet {}

impl Debug for CpuSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CpuSet({})", self)
    }
}

impl FromIterator<CpuId> for CpuSet {
    fn from_iter<T: IntoIterator<Item = CpuId>>(iter: T) -> Self {
        CpuSet(RangeSetBlaze::from_iter(iter))
    }
}

impl<'a> FromIterator<&'a CpuId> for CpuSet {
    fn from_iter<T: IntoIterator<Item = &'a CpuId>>(iter: T) -> Self {
        CpuSet(RangeSetBlaze::from_iter(iter.into_iter().copied()))
    }
}

impl From<RangeInclusive<CpuId>> for CpuSet {
    fn from(range: RangeInclusive<CpuId>) -> Self {
        let mut set = RangeSetBlaze::new();
        set.ranges_insert(range);
        CpuSet(set)
    }
}

impl FromStr for CpuSet {
    type Err = ParseError;

    /// Parse CpuSet from a cpulist like "1,2-30,31"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut result: RangeSetBlaze<CpuId> = RangeSetBlaze::new();
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(CpuSet(result));
        }

        for part in trimmed.split(',') {
            let trimmed = part.trim();
            let wrong_format = || ParseError::WrongRangeFormat {
                raw_str: trimmed.to_string(),
            };
            // either a single number or a dash range
            let range: Vec<&str> = trimmed.split('-').collect();
            match range[..] {
                [l, r] => {
                    let l = l.trim().parse::<CpuId>().map_err(|_| wrong_format())?;
                    let r = r.trim().parse::<CpuId>().map_err(|_| wrong_format())?;
                    if l > r {
                        return Err(ParseError::InvertedRange {
                            raw_str: trimmed.to_string(),
                        });
                    }
                    // insert the inclusive range
                    result.ranges_insert(l..=r);
                }
                [value] => {
                    let value = value.parse::<CpuId>().map_err(|_| wrong_format())?;
                    result.insert(value);
                }
                _ => return Err(wrong_format()),
            }
        }

        Ok(CpuSet(result))
    }
}

impl Display for CpuSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (index, range) in self.0.ranges().enumerate() {
            if index != 0 {
                write!(f, ",")?;
            };
            let start = range.start();
            let end = range.end();
            if start == end {
                write!(f, "{}", start)?;
            } else {
                write!(f, "{}-{}", start, end)?;
            }
        }
        Ok(())
    }
}

impl Serialize for CpuSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

impl<'de> Deserialize<'de> for CpuSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw_str = String::deserialize(deserializer)?;
        CpuSet::from_str(raw_str.as_str()).map_err(|e| {
            serde::de::Error::custom(format!("failed to deserialize cpu set {raw_str}: {e}"))
        })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Failed to parse: {raw_str}")]
    WrongRangeFormat { raw_str: String },
    #[error("Range start is greater than its end: {raw_str}")]
    InvertedRange { raw_str: String },
}
