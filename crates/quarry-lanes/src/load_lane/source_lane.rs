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

use super::LaneContext;
use quarry_core::error::FetchError;
use quarry_core::resource::Decoded;
use quarry_core::strategy::{DataSource, FetchRequest, Fetched};
use std::io::Write;

/// Produces the bytes a job decodes: from the disk cache or from the source.
#[derive(Debug, Default, Clone, Copy)]
pub struct SourceLane;

impl SourceLane {
    /// Looks the request up in the disk cache.
    ///
    /// The transformed result (resource key) is preferred over the raw source
    /// bytes (data key), each only if the job's strategy reads it. Runs on the
    /// disk-cache executor.
    pub fn read_disk_cache<T: Decoded>(&self, ctx: &LaneContext<'_, T>) -> Option<Fetched> {
        if ctx.options.disk_cache_strategy.reads_resource() {
            if let Some(bytes) = ctx.disk_cache.get(&ctx.key.resource_cache_key()) {
                log::trace!("Resource disk cache hit for {}", ctx.key);
                return Some(Fetched {
                    bytes,
                    source: DataSource::ResourceDiskCache,
                });
            }
        }
        self.read_data_cache(ctx)
    }

    /// Deletes the entry `corrupt` was read from, after its bytes failed to
    /// decode, and looks up the tiers below it. Runs on the disk-cache executor.
    pub fn discard_corrupt<T: Decoded>(
        &self,
        ctx: &LaneContext<'_, T>,
        corrupt: DataSource,
    ) -> Option<Fetched> {
        match corrupt {
            DataSource::ResourceDiskCache => {
                ctx.disk_cache.delete(&ctx.key.resource_cache_key());
                self.read_data_cache(ctx)
            }
            DataSource::DataDiskCache => {
                ctx.disk_cache.delete(&ctx.key.data_cache_key());
                None
            }
            _ => None,
        }
    }

    fn read_data_cache<T: Decoded>(&self, ctx: &LaneContext<'_, T>) -> Option<Fetched> {
        if ctx.options.disk_cache_strategy.reads_data() {
            if let Some(bytes) = ctx.disk_cache.get(&ctx.key.data_cache_key()) {
                log::trace!("Data disk cache hit for {}", ctx.key);
                return Some(Fetched {
                    bytes,
                    source: DataSource::DataDiskCache,
                });
            }
        }
        None
    }

    /// Fetches from the source, then writes the raw bytes to the data cache if
    /// the strategy asks for it. Runs on the source executor.
    ///
    /// Checks for cancellation before and after the fetch; bytes fetched for a
    /// cancelled job go back to the buffer pool.
    pub fn fetch<T: Decoded>(&self, ctx: &LaneContext<'_, T>) -> Result<Fetched, FetchError> {
        if ctx.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let request = FetchRequest {
            model: ctx.key.model(),
            priority: ctx.options.priority,
            cancel: ctx.cancel,
            buffers: ctx.buffers,
        };
        let fetched = ctx.pipeline.fetcher().fetch(&request)?;
        if ctx.is_cancelled() {
            ctx.buffers.put_buffer(fetched.bytes);
            return Err(FetchError::Cancelled);
        }

        if ctx
            .options
            .disk_cache_strategy
            .caches_data(fetched.source)
        {
            let bytes = &fetched.bytes;
            let written = ctx.disk_cache.put(
                &ctx.key.data_cache_key(),
                &mut |sink: &mut dyn Write| -> anyhow::Result<bool> {
                    sink.write_all(bytes)?;
                    Ok(true)
                },
            );
            log::trace!("Data cache write for {}: {written}", ctx.key);
        }
        Ok(fetched)
    }
}
