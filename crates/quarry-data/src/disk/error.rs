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

use std::path::PathBuf;
use thiserror::Error;

/// Errors of the on-disk store.
#[derive(Debug, Error)]
pub enum DiskCacheError {
    /// Another open store in this process owns the directory.
    #[error("cache directory {0} is already in use")]
    DirectoryInUse(PathBuf),
    /// The key contains characters the store does not accept.
    #[error("invalid cache key {0:?}")]
    InvalidKey(String),
    /// The journal could not be parsed.
    #[error("corrupt journal: {0}")]
    CorruptJournal(String),
    /// A committed entry is missing or has the wrong length.
    #[error("corrupt entry {key}: {reason}")]
    CorruptEntry {
        /// The entry key.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
    /// The store was closed.
    #[error("cache is closed")]
    Closed,
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
