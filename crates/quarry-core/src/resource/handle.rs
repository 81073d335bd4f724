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

use super::Decoded;
use crate::key::Fingerprint;
use crate::memory::BufferProvider;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

struct ResourceInner<T: Decoded> {
    key: Fingerprint,
    value: T,
    byte_size: usize,
    memory_cacheable: bool,
}

/// A thread-safe, reference-counted handle to a decoded value.
///
/// Every successful load hands the caller one `Resource`. The caller gives it
/// back through the engine's `release` exactly once when done; the engine then
/// decides whether the value moves to the memory cache or gets recycled.
///
/// Cloning only bumps the `Arc` count. Clones are not tracked by the engine, so a
/// clone still alive at recycle time simply keeps the value until it is dropped.
pub struct Resource<T: Decoded> {
    inner: Arc<ResourceInner<T>>,
}

impl<T: Decoded> Resource<T> {
    /// Wraps a freshly decoded value.
    ///
    /// The byte size is sampled once here so that cache accounting stays stable
    /// for the whole lifetime of the resource.
    pub fn new(key: Fingerprint, value: T, memory_cacheable: bool) -> Self {
        let byte_size = value.byte_size();
        Self {
            inner: Arc::new(ResourceInner {
                key,
                value,
                byte_size,
                memory_cacheable,
            }),
        }
    }

    /// The fingerprint this resource was produced for.
    pub fn key(&self) -> &Fingerprint {
        &self.inner.key
    }

    /// Borrows the decoded value.
    pub fn get(&self) -> &T {
        &self.inner.value
    }

    /// The size used for memory-cache accounting.
    pub fn byte_size(&self) -> usize {
        self.inner.byte_size
    }

    /// Whether the value may enter the memory cache once inactive.
    pub fn is_memory_cacheable(&self) -> bool {
        self.inner.memory_cacheable
    }

    /// Returns `true` when both handles point at the same decoded value.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Creates a non-owning tracker for this resource.
    pub fn downgrade(&self) -> WeakResource<T> {
        WeakResource {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Number of live handles, including this one.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Recycles the value into `buffers` if this is the last handle.
    ///
    /// Returns `false` when other handles are still alive; the value is then
    /// dropped normally by whoever holds the last one. Either way the value can
    /// be recycled at most once, since recycling consumes it.
    pub fn recycle(self, buffers: &dyn BufferProvider) -> bool {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => {
                inner.value.recycle(buffers);
                true
            }
            Err(_) => false,
        }
    }
}

impl<T: Decoded> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Decoded> Deref for Resource<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner.value
    }
}

impl<T: Decoded> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("key", &self.inner.key)
            .field("byte_size", &self.inner.byte_size)
            .field("memory_cacheable", &self.inner.memory_cacheable)
            .finish()
    }
}

/// A non-owning reference to a [`Resource`], used for weak tracking.
pub struct WeakResource<T: Decoded> {
    inner: Weak<ResourceInner<T>>,
}

impl<T: Decoded> WeakResource<T> {
    /// Returns a strong handle if the value is still alive.
    pub fn upgrade(&self) -> Option<Resource<T>> {
        self.inner.upgrade().map(|inner| Resource { inner })
    }

    /// Returns `true` if `resource` is the value this tracker points at.
    pub fn points_to(&self, resource: &Resource<T>) -> bool {
        Weak::ptr_eq(&self.inner, &Arc::downgrade(&resource.inner))
    }

    /// Returns `true` once every strong handle has been dropped.
    pub fn is_dead(&self) -> bool {
        self.inner.strong_count() == 0
    }
}

impl<T: Decoded> Clone for WeakResource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Dimensions;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collector(Mutex<Vec<usize>>);

    impl BufferProvider for Collector {
        fn get_buffer(&self, len: usize) -> Vec<u8> {
            vec![0; len]
        }

        fn put_buffer(&self, buffer: Vec<u8>) {
            self.0.lock().unwrap().push(buffer.capacity());
        }
    }

    fn key() -> Fingerprint {
        Fingerprint::builder("blob", Dimensions::ORIGINAL).build()
    }

    #[test]
    fn test_clones_share_the_value() {
        let a = Resource::new(key(), vec![1u8, 2, 3], true);
        let b = a.clone();
        assert!(Resource::ptr_eq(&a, &b));
        assert_eq!(b.get(), &vec![1, 2, 3]);
        assert_eq!(a.handle_count(), 2);
    }

    #[test]
    fn test_recycle_requires_last_handle() {
        let collector = Collector::default();
        let a = Resource::new(key(), Vec::<u8>::with_capacity(64), true);
        let b = a.clone();

        assert!(!a.recycle(&collector));
        assert!(collector.0.lock().unwrap().is_empty());

        assert!(b.recycle(&collector));
        assert_eq!(*collector.0.lock().unwrap(), vec![64]);
    }

    #[test]
    fn test_weak_tracking() {
        let a = Resource::new(key(), vec![0u8; 4], false);
        let weak = a.downgrade();
        assert!(weak.points_to(&a));
        assert!(weak.upgrade().is_some());
        drop(a);
        assert!(weak.is_dead());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_byte_size_is_sampled_at_creation() {
        let a = Resource::new(key(), Vec::<u8>::with_capacity(128), true);
        assert_eq!(a.byte_size(), 128);
        assert!(a.is_memory_cacheable());
    }
}
