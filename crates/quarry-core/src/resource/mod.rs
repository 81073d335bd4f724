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

//! Decoded values and the reference-counted handles the engine hands out.
//!
//! The engine never looks inside a decoded value. All it needs is a size estimate
//! for cache accounting and a way to give scratch memory back to the buffer pool
//! once nobody references the value anymore; both come from the [`Decoded`] trait.

mod handle;

pub use handle::*;

use crate::memory::BufferProvider;

/// A value produced by a decode strategy.
///
/// The supertraits make the value shareable between the worker that decoded it,
/// the caches, and any number of callers on other threads.
///
/// # Examples
///
/// ```
/// use quarry_core::memory::BufferProvider;
/// use quarry_core::resource::Decoded;
///
/// struct Pixels {
///     rgba: Vec<u8>,
/// }
///
/// impl Decoded for Pixels {
///     fn byte_size(&self) -> usize {
///         self.rgba.capacity()
///     }
///
///     fn recycle(self, buffers: &dyn BufferProvider) {
///         buffers.put_buffer(self.rgba);
///     }
/// }
/// ```
pub trait Decoded: Send + Sync + 'static {
    /// Estimated heap footprint in bytes, used for memory-cache budgeting.
    fn byte_size(&self) -> usize;

    /// Hands reusable parts of the value back to `buffers`.
    ///
    /// Called at most once, after the value has left every cache tier and no
    /// caller holds it. The default implementation simply drops the value.
    fn recycle(self, buffers: &dyn BufferProvider)
    where
        Self: Sized,
    {
        let _ = buffers;
    }
}

impl Decoded for Vec<u8> {
    fn byte_size(&self) -> usize {
        self.capacity()
    }

    fn recycle(self, buffers: &dyn BufferProvider) {
        buffers.put_buffer(self);
    }
}

impl Decoded for String {
    fn byte_size(&self) -> usize {
        self.capacity()
    }

    fn recycle(self, buffers: &dyn BufferProvider) {
        buffers.put_buffer(self.into_bytes());
    }
}
