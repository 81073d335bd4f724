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
use quarry_core::resource::Decoded;
use quarry_core::strategy::DataSource;
use std::io::Write;

/// Persists a transformed value to the resource cache. Runs on the disk-cache
/// executor, after the value has been delivered.
#[derive(Debug, Default, Clone, Copy)]
pub struct EncodeLane;

impl EncodeLane {
    /// Encodes `value` under the request's resource key.
    ///
    /// Returns `true` if an entry was committed. Encoder failures are logged and
    /// only cost the cache entry; they never fail a load.
    pub fn encode<T: Decoded>(&self, ctx: &LaneContext<'_, T>, value: &T, source: DataSource) -> bool {
        if ctx.is_cancelled() {
            return false;
        }
        if !ctx.options.disk_cache_strategy.caches_resource(source) {
            return false;
        }
        let Some(encoder) = ctx.pipeline.encoder() else {
            return false;
        };
        if !encoder.should_encode(value) {
            return false;
        }
        let key = ctx.key;
        ctx.disk_cache.put(
            &key.resource_cache_key(),
            &mut |sink: &mut dyn Write| -> anyhow::Result<bool> {
                match encoder.encode(value, sink) {
                    Ok(()) => Ok(true),
                    Err(e) => {
                        log::warn!("Encoder '{}' failed for {key}: {e}", encoder.id());
                        Ok(false)
                    }
                }
            },
        )
    }
}
