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

//! Source, decode and encode stages of a load.

mod decode_lane;
mod encode_lane;
mod source_lane;

pub use decode_lane::DecodeLane;
pub use encode_lane::EncodeLane;
pub use source_lane::SourceLane;

use quarry_core::cache::DiskCache;
use quarry_core::memory::BufferProvider;
use quarry_core::options::LoadOptions;
use quarry_core::resource::Decoded;
use quarry_core::strategy::CancelFlag;
use quarry_core::{Fingerprint, Pipeline};

/// Everything a lane borrows from the job it runs for.
pub struct LaneContext<'a, T: Decoded> {
    /// The request being served.
    pub key: &'a Fingerprint,
    /// The strategies that serve it.
    pub pipeline: &'a Pipeline<T>,
    /// Caching and priority options of the job.
    pub options: LoadOptions,
    /// Set when every waiter detached.
    pub cancel: &'a CancelFlag,
    /// Scratch buffer pool.
    pub buffers: &'a dyn BufferProvider,
    /// Persistent cache.
    pub disk_cache: &'a dyn DiskCache,
}

impl<T: Decoded> LaneContext<'_, T> {
    /// `true` once the job has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
