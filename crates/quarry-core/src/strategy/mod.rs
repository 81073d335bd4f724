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

//! The pluggable strategies a load pipeline is made of.
//!
//! Each strategy is a small, separate trait. The engine calls them from its
//! executor threads and never inspects what they produce beyond the
//! [`Decoded`] contract. Every strategy exposes a stable `id()` that becomes part
//! of the request [`Fingerprint`](crate::Fingerprint), so swapping a strategy
//! never serves results cached under another one.

use crate::error::{DecodeError, EncodeError, FetchError};
use crate::key::Dimensions;
use crate::memory::BufferProvider;
use crate::options::Priority;
use crate::resource::Decoded;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Where a delivered resource came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSource {
    /// Another caller already held it.
    ActiveResources,
    /// The in-memory LRU cache.
    MemoryCache,
    /// A transformed result persisted on disk.
    ResourceDiskCache,
    /// Raw source bytes persisted on disk.
    DataDiskCache,
    /// A source on this machine.
    Local,
    /// A source over the network.
    Remote,
}

/// Shared cancellation signal polled by long-running strategies.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Everything a fetcher gets to know about a request.
pub struct FetchRequest<'a> {
    /// The model identity from the fingerprint.
    pub model: &'a str,
    /// Priority of the job issuing the fetch.
    pub priority: Priority,
    /// Set when every caller detached; fetchers should poll it between chunks.
    pub cancel: &'a CancelFlag,
    /// Pool to read the bytes into.
    pub buffers: &'a dyn BufferProvider,
}

/// Raw bytes returned by a fetcher.
#[derive(Debug)]
pub struct Fetched {
    /// The bytes. Ideally obtained from the request's buffer provider.
    pub bytes: Vec<u8>,
    /// Either [`DataSource::Local`] or [`DataSource::Remote`].
    pub source: DataSource,
}

/// Produces the raw bytes behind a model.
pub trait Fetcher: Send + Sync + 'static {
    /// Stable identity of this fetcher.
    fn id(&self) -> &str;

    /// Fetches the bytes for `request.model`.
    ///
    /// Runs on the source executor and may block. Timeouts are the fetcher's
    /// own business.
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Fetched, FetchError>;
}

/// Turns raw bytes into a value.
pub trait Decoder<T: Decoded>: Send + Sync + 'static {
    /// Stable identity of this decoder.
    fn id(&self) -> &str;

    /// Decodes `source`, aiming for `target`.
    ///
    /// `source` is either freshly fetched bytes, cached source bytes, or the
    /// output of the pipeline's [`Encoder`] read back from the resource cache.
    fn decode(
        &self,
        source: &[u8],
        target: Dimensions,
        buffers: &dyn BufferProvider,
    ) -> Result<T, DecodeError>;
}

/// Rewrites a decoded value (resize, crop, filter...).
pub trait Transformer<T: Decoded>: Send + Sync + 'static {
    /// Stable identity of this transformation, including its parameters.
    fn id(&self) -> &str;

    /// Transforms `value`. Implementations own `value` and may recycle it into
    /// `buffers` when they produce a new one.
    fn transform(&self, value: T, target: Dimensions, buffers: &dyn BufferProvider) -> T;
}

/// Serializes a value for the resource disk cache.
pub trait Encoder<T: Decoded>: Send + Sync + 'static {
    /// Stable identity of this encoder.
    fn id(&self) -> &str;

    /// Returns `false` for values that should not be persisted at all.
    fn should_encode(&self, value: &T) -> bool {
        let _ = value;
        true
    }

    /// Writes `value` to `sink`.
    fn encode(&self, value: &T, sink: &mut dyn Write) -> Result<(), EncodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let seen_by_worker = flag.clone();
        assert!(!seen_by_worker.is_cancelled());

        thread::spawn(move || flag.cancel()).join().unwrap();

        assert!(seen_by_worker.is_cancelled());
    }
}
