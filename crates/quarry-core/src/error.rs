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

//! The error taxonomy of the loading engine.
//!
//! Errors that reach load callbacks are `Clone`: one failed job delivers the same
//! error to every caller that was waiting on it.

use std::path::PathBuf;
use thiserror::Error;

/// The source of a load could not produce bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Nothing exists under the requested model.
    #[error("source not found: {0}")]
    NotFound(String),
    /// The source exists but reading it failed.
    #[error("i/o error while fetching {model}: {message}")]
    Io {
        /// The model being fetched.
        model: String,
        /// The underlying error, rendered.
        message: String,
    },
    /// The fetcher noticed the job was cancelled and stopped early.
    #[error("fetch cancelled")]
    Cancelled,
    /// Any other fetcher-specific failure.
    #[error("fetch failed: {0}")]
    Failed(String),
}

impl FetchError {
    /// Builds an [`FetchError::Io`] from an I/O error.
    pub fn io(model: impl Into<String>, error: &std::io::Error) -> Self {
        Self::Io {
            model: model.into(),
            message: error.to_string(),
        }
    }
}

/// Fetched bytes could not be turned into a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The bytes are corrupt or truncated.
    #[error("malformed data: {0}")]
    Malformed(String),
    /// The decoder does not handle this kind of data.
    #[error("unsupported data: {0}")]
    Unsupported(String),
    /// The decoder noticed the job was cancelled and stopped early.
    #[error("decode cancelled")]
    Cancelled,
}

/// A value could not be serialized for the disk cache.
///
/// Never fatal: the in-memory result is still delivered, it just is not
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Writing to the staging file failed.
    #[error("i/o error while encoding: {0}")]
    Io(String),
    /// The encoder rejected the value.
    #[error("encoding failed: {0}")]
    Failed(String),
}

impl From<std::io::Error> for EncodeError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

/// The error delivered to a load callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The source fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Decoding failed.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The load was restricted to caches and none of them had it.
    #[error("{0} is not present in any cache")]
    NotCached(String),
    /// A blocking load gave up waiting.
    #[error("timed out waiting for {0}")]
    TimedOut(String),
    /// The engine was shut down before the load could finish.
    #[error("engine is shut down")]
    Shutdown,
}

/// Engine configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration {path}: {source}")]
    Io {
        /// The file that was being read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration text is not valid RON for [`EngineConfig`](crate::EngineConfig).
    #[error("invalid configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),
}
