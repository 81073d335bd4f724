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

//! # Quarry Core
//!
//! Foundational crate containing the traits, core types, and interface contracts
//! shared by every layer of the loading engine.
//!
//! Nothing in here performs I/O or spawns threads. Concrete caches and pools live
//! in `quarry-data`, executors in `quarry-infra`, and the orchestration in
//! `quarry-agents`.

#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod error;
pub mod key;
pub mod memory;
pub mod options;
pub mod pipeline;
pub mod resource;
pub mod strategy;
pub mod telemetry;

pub use config::EngineConfig;
pub use error::{DecodeError, EncodeError, FetchError, LoadError};
pub use key::{CacheKey, Dimensions, Fingerprint};
pub use options::{DiskCacheStrategy, LoadOptions, MemoryPressure, Priority};
pub use pipeline::Pipeline;
pub use resource::{Decoded, Resource, WeakResource};
pub use strategy::{DataSource, Decoder, Encoder, Fetcher, Transformer};
