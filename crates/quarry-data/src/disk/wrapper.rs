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

//! The engine-facing disk cache.

use super::error::DiskCacheError;
use super::lru_disk::DiskLruCache;
use quarry_core::cache::{DiskCache, DiskWriter};
use quarry_core::config::DiskCacheConfig;
use quarry_core::key::CacheKey;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// [`DiskCache`] backed by a lazily opened [`DiskLruCache`].
///
/// The store is opened on first use, on whichever executor thread gets there
/// first. If opening fails the wrapper behaves as an empty cache and retries on
/// the next call. Store errors are logged and never reach a load.
pub struct LruDiskCache {
    directory: PathBuf,
    app_version: u32,
    max_size: u64,
    store: Mutex<Option<Arc<DiskLruCache>>>,
}

impl LruDiskCache {
    /// Creates a wrapper for `directory`. Nothing touches the filesystem yet.
    pub fn new(directory: impl Into<PathBuf>, app_version: u32, max_size: u64) -> Self {
        Self {
            directory: directory.into(),
            app_version,
            max_size,
            store: Mutex::new(None),
        }
    }

    /// Creates a wrapper from its configuration section, or `None` if no
    /// directory is configured.
    pub fn from_config(config: &DiskCacheConfig) -> Option<Self> {
        config
            .directory
            .as_ref()
            .map(|directory| Self::new(directory, config.app_version, config.max_bytes))
    }

    /// The cache directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn store(&self) -> Option<Arc<DiskLruCache>> {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        if store.is_none() {
            match DiskLruCache::open(&self.directory, self.app_version, self.max_size) {
                Ok(opened) => *store = Some(Arc::new(opened)),
                Err(e) => {
                    log::warn!(
                        "Unable to open disk cache in {}: {e}",
                        self.directory.display()
                    );
                }
            }
        }
        store.clone()
    }

    /// Closes the store if it was opened, releasing the directory.
    ///
    /// The next operation opens it again.
    pub fn close(&self) {
        let store = self
            .store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(store) = store {
            if let Err(e) = store.close() {
                log::warn!("Failed to close disk cache: {e}");
            }
        }
    }
}

impl DiskCache for LruDiskCache {
    fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let store = self.store()?;
        match store.get(key.as_str()) {
            Ok(bytes) => bytes,
            Err(DiskCacheError::CorruptEntry { key, reason }) => {
                log::warn!("Dropping corrupt disk cache entry {key}: {reason}");
                if let Err(e) = store.remove(&key) {
                    log::warn!("Failed to delete corrupt entry {key}: {e}");
                }
                None
            }
            Err(e) => {
                log::warn!("Disk cache read of {key} failed: {e}");
                None
            }
        }
    }

    fn put(&self, key: &CacheKey, writer: &mut dyn DiskWriter) -> bool {
        let Some(store) = self.store() else {
            return false;
        };
        if store.contains(key.as_str()) {
            return false;
        }
        let mut editor = match store.edit(key.as_str()) {
            Ok(Some(editor)) => editor,
            Ok(None) => {
                log::trace!("Skipping disk cache write of {key}, already in progress");
                return false;
            }
            Err(e) => {
                log::warn!("Disk cache edit of {key} failed: {e}");
                return false;
            }
        };
        let committed = match writer.write(&mut editor) {
            Ok(true) => editor.commit().map(|()| true),
            Ok(false) => editor.abort().map(|()| false),
            Err(e) => {
                log::warn!("Disk cache writer for {key} failed: {e:#}");
                editor.abort().map(|()| false)
            }
        };
        committed.unwrap_or_else(|e| {
            log::warn!("Disk cache write of {key} failed: {e}");
            false
        })
    }

    fn delete(&self, key: &CacheKey) {
        if let Some(store) = self.store() {
            if let Err(e) = store.remove(key.as_str()) {
                log::warn!("Disk cache delete of {key} failed: {e}");
            }
        }
    }

    fn clear(&self) {
        if let Some(store) = self.store() {
            if let Err(e) = store.clear() {
                log::warn!("Failed to clear disk cache: {e}");
            }
        }
    }
}
