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

use super::error::ExecutorError;
use super::priority::TaskExecutor;
use quarry_core::config::ExecutorsConfig;

/// The three isolated pools a load moves through.
///
/// Disk-cache I/O, source fetches and decoding never share threads, so a burst
/// of slow fetches or heavy decodes cannot hold up disk-cache reads.
pub struct TaskExecutors {
    /// Disk-cache reads and writes.
    pub disk_cache: TaskExecutor,
    /// Source fetches.
    pub source: TaskExecutor,
    /// Decoding and transformation.
    pub decode: TaskExecutor,
}

impl TaskExecutors {
    /// Starts the three pools.
    pub fn from_config(config: &ExecutorsConfig) -> Result<Self, ExecutorError> {
        Ok(Self {
            disk_cache: TaskExecutor::from_config("quarry-disk-cache", &config.disk_cache)?,
            source: TaskExecutor::from_config("quarry-source", &config.source)?,
            decode: TaskExecutor::from_config("quarry-decode", &config.decode)?,
        })
    }

    /// Shuts every pool down. Idempotent.
    pub fn shutdown(&self) {
        self.disk_cache.shutdown();
        self.source.shutdown();
        self.decode.shutdown();
    }
}
