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

//! # Quarry Data
//!
//! The data structures behind each cache tier: the size-classed [`BufferPool`],
//! the byte-budgeted [`MemoryCache`], the reference-counted [`ActiveResources`]
//! registry, and the journaled [`DiskLruCache`] with its engine-facing
//! [`LruDiskCache`] wrapper.

#![warn(missing_docs)]

pub mod allocators;
pub mod cache;
pub mod disk;

pub use allocators::{BufferPool, BufferPoolStats};
pub use cache::{ActiveResources, MemoryCache, ReleaseError, ReleaseOutcome};
pub use disk::{DiskCacheError, DiskLruCache, LruDiskCache};
