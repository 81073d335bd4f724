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

//! The LRU tier for decoded resources nobody currently holds.

use lru::LruCache;
use quarry_core::config::MemoryCacheConfig;
use quarry_core::key::Fingerprint;
use quarry_core::resource::{Decoded, Resource};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Called once for every resource that leaves the cache other than through
/// [`MemoryCache::take`].
pub type RemovalListener<T> = Box<dyn Fn(Resource<T>) + Send + Sync>;

struct CacheState<T: Decoded> {
    entries: LruCache<Fingerprint, Resource<T>>,
    current_size: usize,
    max_size: usize,
}

impl<T: Decoded> CacheState<T> {
    fn detach(&mut self, key: &Fingerprint) -> Option<Resource<T>> {
        let resource = self.entries.pop(key)?;
        self.current_size -= resource.byte_size();
        Some(resource)
    }

    fn evict_to(&mut self, target: usize, evicted: &mut Vec<Resource<T>>) {
        while self.current_size > target {
            let Some((_, resource)) = self.entries.pop_lru() else {
                break;
            };
            self.current_size -= resource.byte_size();
            evicted.push(resource);
        }
    }
}

/// A byte-budgeted, strictly least-recently-used cache of resources.
///
/// The removal listener runs after the internal lock is released but before the
/// mutating call returns, once per removed entry, in eviction order.
pub struct MemoryCache<T: Decoded> {
    state: Mutex<CacheState<T>>,
    listener: Option<RemovalListener<T>>,
}

impl<T: Decoded> MemoryCache<T> {
    /// Creates an empty cache holding at most `max_size` bytes.
    pub fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                current_size: 0,
                max_size,
            }),
            listener: None,
        }
    }

    /// Creates an empty cache from its configuration section.
    pub fn from_config(config: &MemoryCacheConfig) -> Self {
        Self::new(config.max_bytes)
    }

    /// Sets the listener notified of every removal.
    pub fn with_removal_listener(
        mut self,
        listener: impl Fn(Resource<T>) + Send + Sync + 'static,
    ) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, removed: Vec<Resource<T>>) {
        if removed.is_empty() {
            return;
        }
        log::trace!("MemoryCache removed {} entries", removed.len());
        match &self.listener {
            Some(listener) => removed.into_iter().for_each(|resource| listener(resource)),
            None => drop(removed),
        }
    }

    /// Returns a clone of the cached resource and marks it most recently used.
    pub fn get(&self, key: &Fingerprint) -> Option<Resource<T>> {
        self.lock().entries.get(key).cloned()
    }

    /// Removes and returns an entry without notifying the listener.
    ///
    /// Used when ownership moves to another tier rather than leaving the cache.
    pub fn take(&self, key: &Fingerprint) -> Option<Resource<T>> {
        self.lock().detach(key)
    }

    /// Inserts `resource`, evicting least recently used entries until it fits.
    ///
    /// A resource larger than the whole budget is not cached and is handed back,
    /// still owned by the caller. A different resource already stored under the
    /// same key is replaced and reported to the listener.
    pub fn put(&self, resource: Resource<T>) -> Option<Resource<T>> {
        let size = resource.byte_size();
        let key = resource.key().clone();
        let mut removed = Vec::new();
        {
            let mut state = self.lock();
            if size > state.max_size {
                return Some(resource);
            }
            if let Some(previous) = state.detach(&key) {
                if !Resource::ptr_eq(&previous, &resource) {
                    removed.push(previous);
                }
            }
            let target = state.max_size - size;
            state.evict_to(target, &mut removed);
            state.current_size += size;
            state.entries.put(key, resource);
        }
        self.notify(removed);
        None
    }

    /// Removes an entry, notifying the listener. Returns `true` if it existed.
    pub fn remove(&self, key: &Fingerprint) -> bool {
        let removed = self.lock().detach(key);
        let found = removed.is_some();
        self.notify(removed.into_iter().collect());
        found
    }

    /// Evicts least recently used entries until at most `target` bytes remain.
    pub fn trim_to_size(&self, target: usize) {
        let mut removed = Vec::new();
        self.lock().evict_to(target, &mut removed);
        self.notify(removed);
    }

    /// Changes the budget, evicting if the cache no longer fits.
    pub fn set_size_budget(&self, max_size: usize) {
        let mut removed = Vec::new();
        {
            let mut state = self.lock();
            state.max_size = max_size;
            state.evict_to(max_size, &mut removed);
        }
        self.notify(removed);
    }

    /// Evicts everything.
    pub fn clear(&self) {
        self.trim_to_size(0);
    }

    /// `true` if `key` is cached. Does not affect recency.
    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.lock().entries.contains(key)
    }

    /// Total size of cached resources.
    pub fn current_size(&self) -> usize {
        self.lock().current_size
    }

    /// The byte budget.
    pub fn max_size(&self) -> usize {
        self.lock().max_size
    }

    /// Number of cached resources.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Decoded> fmt::Debug for MemoryCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryCache")
            .field("entries", &state.entries.len())
            .field("current_size", &state.current_size)
            .field("max_size", &state.max_size)
            .finish()
    }
}
