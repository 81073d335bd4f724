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

//! The persistent cache contract consumed by the engine.
//!
//! The engine only ever needs get/put/delete on opaque blobs. Failures inside a
//! disk cache are never surfaced to a load: a broken cache behaves like an empty
//! one, since everything in it can be rebuilt from the source.

use crate::key::CacheKey;
use std::io::Write;

/// Produces the bytes of one disk-cache entry.
pub trait DiskWriter {
    /// Writes the entry into `sink`.
    ///
    /// Returning `Ok(false)` or an error aborts the edit; the previous value
    /// (or absence) stays visible.
    fn write(&mut self, sink: &mut dyn Write) -> anyhow::Result<bool>;
}

impl<F> DiskWriter for F
where
    F: FnMut(&mut dyn Write) -> anyhow::Result<bool>,
{
    fn write(&mut self, sink: &mut dyn Write) -> anyhow::Result<bool> {
        self(sink)
    }
}

/// A persistent key → bytes store.
pub trait DiskCache: Send + Sync {
    /// Reads a committed entry. Unreadable entries are reported as misses.
    fn get(&self, key: &CacheKey) -> Option<Vec<u8>>;

    /// Writes an entry through `writer`. Returns `true` if it was committed.
    ///
    /// A put for a key that already exists, or that another thread is currently
    /// writing, is skipped and returns `false`.
    fn put(&self, key: &CacheKey, writer: &mut dyn DiskWriter) -> bool;

    /// Removes an entry if present.
    fn delete(&self, key: &CacheKey);

    /// Removes every entry.
    fn clear(&self);
}

/// A disk cache that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDiskCache;

impl DiskCache for NoDiskCache {
    fn get(&self, _key: &CacheKey) -> Option<Vec<u8>> {
        None
    }

    fn put(&self, _key: &CacheKey, _writer: &mut dyn DiskWriter) -> bool {
        false
    }

    fn delete(&self, _key: &CacheKey) {}

    fn clear(&self) {}
}
