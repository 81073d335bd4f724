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

//! The persistent tier: a journaled LRU file store and its engine-facing wrapper.

mod error;
mod journal;
mod lru_disk;
mod wrapper;

pub use error::DiskCacheError;
pub use lru_disk::{DiskLruCache, Editor};
pub use wrapper::LruDiskCache;
