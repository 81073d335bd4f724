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

//! A size-classed pool of reusable byte buffers.

use quarry_core::config::BufferPoolConfig;
use quarry_core::memory::BufferProvider;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// One class per power of two a `usize` capacity can reach.
const CLASS_COUNT: usize = usize::BITS as usize;

/// Counters describing how well the pool is doing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferPoolStats {
    /// `get_buffer` calls served from the pool.
    pub hits: u64,
    /// `get_buffer` calls that had to allocate.
    pub misses: u64,
    /// Buffers offered back through `put_buffer`.
    pub puts: u64,
    /// Offered buffers that were dropped because a limit was reached.
    pub rejected: u64,
    /// Total capacity currently held by the pool.
    pub pooled_bytes: usize,
    /// Number of buffers currently held by the pool.
    pub pooled_buffers: usize,
}

/// A pool of byte buffers grouped by power-of-two capacity.
///
/// Class `k` holds buffers whose capacity is at least `2^k`. A request for
/// `len` bytes is served from class `ceil(log2(len))`, so any buffer it finds
/// there is large enough without reallocating. Buffers are handed out dirty.
///
/// Each class has its own lock, so contention on one size never blocks another.
/// The global byte budget is enforced with an atomic reservation before a
/// buffer is queued.
#[derive(Debug)]
pub struct BufferPool {
    classes: Box<[Mutex<Vec<Vec<u8>>>]>,
    max_bytes: AtomicUsize,
    max_per_class: usize,
    pooled_bytes: AtomicUsize,
    pooled_buffers: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    rejected: AtomicU64,
}

impl BufferPool {
    /// Creates an empty pool.
    pub fn new(max_bytes: usize, max_per_class: usize) -> Self {
        Self {
            classes: (0..CLASS_COUNT).map(|_| Mutex::new(Vec::new())).collect(),
            max_bytes: AtomicUsize::new(max_bytes),
            max_per_class,
            pooled_bytes: AtomicUsize::new(0),
            pooled_buffers: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Creates an empty pool from its configuration section.
    pub fn from_config(config: &BufferPoolConfig) -> Self {
        Self::new(config.max_bytes, config.max_per_class)
    }

    fn class(&self, index: usize) -> MutexGuard<'_, Vec<Vec<u8>>> {
        self.classes[index]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// The class that can serve a request for `len` bytes.
    fn request_class(len: usize) -> Option<usize> {
        len.checked_next_power_of_two()
            .map(|size| size.trailing_zeros() as usize)
    }

    /// The class a buffer of `capacity` bytes belongs to.
    fn capacity_class(capacity: usize) -> usize {
        (usize::BITS - 1 - capacity.leading_zeros()) as usize
    }

    /// Current total byte budget.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes.load(Ordering::Relaxed)
    }

    /// Changes the byte budget, dropping pooled buffers if it shrank.
    pub fn set_max_bytes(&self, max_bytes: usize) {
        self.max_bytes.store(max_bytes, Ordering::Relaxed);
        self.trim_to(max_bytes);
    }

    /// Total capacity currently pooled.
    pub fn pooled_bytes(&self) -> usize {
        self.pooled_bytes.load(Ordering::Relaxed)
    }

    /// Drops pooled buffers, largest first, until at most `target` bytes remain.
    pub fn trim_to(&self, target: usize) {
        let mut released = 0usize;
        for index in (0..CLASS_COUNT).rev() {
            if self.pooled_bytes() <= target {
                break;
            }
            let mut class = self.class(index);
            while self.pooled_bytes() > target {
                let Some(buffer) = class.pop() else { break };
                self.pooled_bytes
                    .fetch_sub(buffer.capacity(), Ordering::Relaxed);
                self.pooled_buffers.fetch_sub(1, Ordering::Relaxed);
                released += buffer.capacity();
            }
        }
        if released > 0 {
            log::debug!("BufferPool trimmed {released} bytes (target {target})");
        }
    }

    /// Drops every pooled buffer.
    pub fn clear(&self) {
        self.trim_to(0);
    }

    /// A snapshot of the pool counters.
    pub fn stats(&self) -> BufferPoolStats {
        BufferPoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            pooled_bytes: self.pooled_bytes(),
            pooled_buffers: self.pooled_buffers.load(Ordering::Relaxed),
        }
    }

    fn reserve(&self, capacity: usize) -> bool {
        let max = self.max_bytes();
        self.pooled_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |pooled| {
                pooled.checked_add(capacity).filter(|total| *total <= max)
            })
            .is_ok()
    }
}

impl BufferProvider for BufferPool {
    fn get_buffer(&self, len: usize) -> Vec<u8> {
        if len == 0 {
            return Vec::new();
        }
        let pooled = Self::request_class(len).and_then(|index| self.class(index).pop());
        match pooled {
            Some(mut buffer) => {
                self.pooled_bytes
                    .fetch_sub(buffer.capacity(), Ordering::Relaxed);
                self.pooled_buffers.fetch_sub(1, Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                // Only bytes past the previous length get written; the rest
                // keeps whatever the last owner left there.
                if buffer.len() >= len {
                    buffer.truncate(len);
                } else {
                    buffer.resize(len, 0);
                }
                buffer
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                vec![0; len]
            }
        }
    }

    fn put_buffer(&self, buffer: Vec<u8>) {
        let capacity = buffer.capacity();
        if capacity == 0 {
            return;
        }
        self.puts.fetch_add(1, Ordering::Relaxed);
        if !self.reserve(capacity) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let mut class = self.class(Self::capacity_class(capacity));
        if class.len() >= self.max_per_class {
            drop(class);
            self.pooled_bytes.fetch_sub(capacity, Ordering::Relaxed);
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }
        class.push(buffer);
        self.pooled_buffers.fetch_add(1, Ordering::Relaxed);
    }
}
