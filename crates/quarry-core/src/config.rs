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

//! Engine configuration.
//!
//! Every section has sensible defaults, so a configuration file only needs to
//! name what it changes:
//!
//! ```
//! use quarry_core::config::EngineConfig;
//!
//! let config = EngineConfig::from_ron_str(
//!     "(memory_cache: (max_bytes: 1048576), disk_cache: (directory: Some(\"/tmp/q\")))",
//! )
//! .unwrap();
//! assert_eq!(config.memory_cache.max_bytes, 1 << 20);
//! assert_eq!(config.executors.disk_cache.threads, 1);
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MIB: usize = 1024 * 1024;

/// What an executor does when a task panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UncaughtPolicy {
    /// Swallow the panic silently.
    Ignore,
    /// Log the panic and keep the worker alive.
    #[default]
    Log,
    /// Log the panic and abort the process.
    Crash,
}

/// Sizing of one executor pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Number of worker threads. Zero is treated as one.
    pub threads: usize,
    /// Panic handling policy.
    pub policy: UncaughtPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            policy: UncaughtPolicy::Log,
        }
    }
}

/// The three isolated executor pools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorsConfig {
    /// Disk-cache reads and writes.
    pub disk_cache: ExecutorConfig,
    /// Source fetches.
    pub source: ExecutorConfig,
    /// CPU-bound decoding and transformation.
    pub decode: ExecutorConfig,
}

impl Default for ExecutorsConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            disk_cache: ExecutorConfig {
                threads: 1,
                policy: UncaughtPolicy::Log,
            },
            source: ExecutorConfig {
                threads: 4,
                policy: UncaughtPolicy::Crash,
            },
            decode: ExecutorConfig {
                threads: cores,
                policy: UncaughtPolicy::Crash,
            },
        }
    }
}

/// Memory cache budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryCacheConfig {
    /// Total size of inactive resources kept in memory.
    pub max_bytes: usize,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 64 * MIB,
        }
    }
}

/// Buffer pool limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    /// Total capacity of pooled buffers, in bytes.
    pub max_bytes: usize,
    /// Maximum number of buffers kept per size class.
    pub max_per_class: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            max_bytes: 16 * MIB,
            max_per_class: 8,
        }
    }
}

/// Persistent cache location and budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskCacheConfig {
    /// Directory owned by the cache. `None` disables disk caching.
    pub directory: Option<PathBuf>,
    /// Total size of committed entries, in bytes.
    pub max_bytes: u64,
    /// Bumping this discards everything cached by earlier versions.
    pub app_version: u32,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            directory: None,
            max_bytes: 250 * MIB as u64,
            app_version: 1,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Memory cache section.
    pub memory_cache: MemoryCacheConfig,
    /// Buffer pool section.
    pub buffer_pool: BufferPoolConfig,
    /// Disk cache section.
    pub disk_cache: DiskCacheConfig,
    /// Executor pools section.
    pub executors: ExecutorsConfig,
    /// Panic when a resource is released more times than it was acquired.
    pub assert_balanced_release: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_cache: MemoryCacheConfig::default(),
            buffer_pool: BufferPoolConfig::default(),
            disk_cache: DiskCacheConfig::default(),
            executors: ExecutorsConfig::default(),
            assert_balanced_release: cfg!(debug_assertions),
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from RON text.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Reads and parses a RON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron_str(&text)
    }
}
