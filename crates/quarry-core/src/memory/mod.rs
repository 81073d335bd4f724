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

//! The contract between strategies and whatever pools scratch memory.
//!
//! Fetchers and decoders borrow byte buffers through a [`BufferProvider`] instead
//! of allocating directly, and decoded values give them back in
//! [`Decoded::recycle`](crate::resource::Decoded::recycle). The concrete
//! size-classed pool lives in `quarry-data`.

/// Lends out and takes back raw byte buffers.
pub trait BufferProvider: Send + Sync {
    /// Returns a buffer whose length is exactly `len`.
    ///
    /// The contents are unspecified: a reused buffer still holds whatever its
    /// previous owner wrote. Callers must not rely on zero-initialisation.
    fn get_buffer(&self, len: usize) -> Vec<u8>;

    /// Offers a buffer back for reuse. The provider may keep or drop it.
    fn put_buffer(&self, buffer: Vec<u8>);
}

/// A provider that never pools anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnpooledBuffers;

impl BufferProvider for UnpooledBuffers {
    fn get_buffer(&self, len: usize) -> Vec<u8> {
        vec![0; len]
    }

    fn put_buffer(&self, _buffer: Vec<u8>) {}
}
