// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-load options: priority, disk caching policy and cache bypass flags.

use crate::strategy::DataSource;
use serde::{Deserialize, Serialize};

/// Scheduling priority of a load. Lower variants run first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Priority {
    /// Needed right now, e.g. for the frame being produced.
    Immediate,
    /// Needed soon.
    High,
    /// The default.
    #[default]
    Normal,
    /// Prefetching and other speculative work.
    Low,
}

impl Priority {
    /// Numeric rank used by the executors; lower runs first.
    pub fn rank(self) -> u8 {
        self as u8
    }
}

/// Which layers of the disk cache a load reads from and writes to.
///
/// "Data" is the raw fetched bytes, keyed by model and signature. "Resource" is
/// the encoded, transformed result, keyed by the full fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DiskCacheStrategy {
    /// Never touch the disk cache.
    None,
    /// Cache raw source bytes only.
    Data,
    /// Cache transformed results only.
    Resource,
    /// Cache raw bytes of remote sources and every transformed result.
    All,
    /// Cache raw bytes of remote sources and transformed results of local ones.
    #[default]
    Automatic,
}

impl DiskCacheStrategy {
    /// Whether a transformed result may be read back from disk.
    pub fn reads_resource(self) -> bool {
        matches!(self, Self::Resource | Self::All | Self::Automatic)
    }

    /// Whether raw source bytes may be read back from disk.
    pub fn reads_data(self) -> bool {
        matches!(self, Self::Data | Self::All | Self::Automatic)
    }

    /// Whether bytes fetched from `source` should be written to the data cache.
    pub fn caches_data(self, source: DataSource) -> bool {
        match self {
            Self::Data => matches!(source, DataSource::Local | DataSource::Remote),
            Self::All | Self::Automatic => source == DataSource::Remote,
            Self::None | Self::Resource => false,
        }
    }

    /// Whether a result decoded from `source` should be written to the resource cache.
    pub fn caches_resource(self, source: DataSource) -> bool {
        match self {
            Self::Resource | Self::All => matches!(
                source,
                DataSource::Local | DataSource::Remote | DataSource::DataDiskCache
            ),
            Self::Automatic => matches!(source, DataSource::Local | DataSource::DataDiskCache),
            Self::None | Self::Data => false,
        }
    }
}

/// Options attached to a single load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Scheduling priority of the job and order of callback delivery.
    pub priority: Priority,
    /// Disk caching policy.
    pub disk_cache_strategy: DiskCacheStrategy,
    /// Bypass active resources and the memory cache, and keep the result out of
    /// the memory cache once released.
    pub skip_memory_cache: bool,
    /// Fail with [`LoadError::NotCached`](crate::LoadError::NotCached) rather
    /// than fetching from the source.
    pub only_retrieve_from_cache: bool,
}

impl LoadOptions {
    /// Default options at the given priority.
    pub fn with_priority(priority: Priority) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    /// Replaces the disk cache strategy.
    pub fn disk_cache_strategy(mut self, strategy: DiskCacheStrategy) -> Self {
        self.disk_cache_strategy = strategy;
        self
    }

    /// Sets [`LoadOptions::skip_memory_cache`].
    pub fn skip_memory_cache(mut self, skip: bool) -> Self {
        self.skip_memory_cache = skip;
        self
    }

    /// Sets [`LoadOptions::only_retrieve_from_cache`].
    pub fn only_retrieve_from_cache(mut self, only: bool) -> Self {
        self.only_retrieve_from_cache = only;
        self
    }
}

/// How hard the host wants in-memory caches shrunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryPressure {
    /// Drop half of the memory cache and buffer pool.
    Moderate,
    /// Drop everything that is not actively referenced.
    Critical,
}
