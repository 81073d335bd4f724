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
use quarry_core::error::DecodeError;
use quarry_core::resource::Decoded;
use quarry_core::strategy::{DataSource, Fetched};
use quarry_core::telemetry::MetricsResult;
use quarry_telemetry::{CounterHandle, HistogramHandle, MetricsRegistry, ScopedMetricTimer};

/// Turns fetched bytes into a transformed value. Runs on the decode executor.
#[derive(Debug, Clone)]
pub struct DecodeLane {
    decode_time_ms: HistogramHandle,
    decodes: CounterHandle,
}

impl DecodeLane {
    /// Creates the lane, registering `engine:decode_time` and `engine:decodes`.
    pub fn new(registry: &MetricsRegistry) -> MetricsResult<Self> {
        Ok(Self {
            decode_time_ms: registry.register_histogram(
                "engine",
                "decode_time",
                "Time spent decoding and transforming",
                "ms",
                vec![1.0, 5.0, 16.0, 33.0, 100.0, 500.0],
            )?,
            decodes: registry.register_counter("engine", "decodes", "Successful decodes")?,
        })
    }

    /// Decodes `raw` and applies the pipeline's transformations.
    ///
    /// The raw bytes are returned to the buffer pool whatever the outcome.
    /// Bytes read from the resource cache were transformed before they were
    /// encoded, so they are decoded only.
    pub fn decode<T: Decoded>(
        &self,
        ctx: &LaneContext<'_, T>,
        raw: Fetched,
    ) -> Result<T, DecodeError> {
        if ctx.is_cancelled() {
            ctx.buffers.put_buffer(raw.bytes);
            return Err(DecodeError::Cancelled);
        }
        let target = ctx.key.dimensions();
        let _timer = ScopedMetricTimer::new(&self.decode_time_ms);

        let decoded = ctx
            .pipeline
            .decoder()
            .decode(&raw.bytes, target, ctx.buffers);
        ctx.buffers.put_buffer(raw.bytes);
        let mut value = decoded?;

        if raw.source != DataSource::ResourceDiskCache {
            for transformer in ctx.pipeline.transformers() {
                value = transformer.transform(value, target, ctx.buffers);
            }
        }
        if let Err(e) = self.decodes.increment() {
            log::warn!("Failed to record decode: {e}");
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_lane::test_support::{EchoFetcher, MapDiskCache, Upper, Utf8};
    use quarry_core::memory::BufferProvider;
    use quarry_core::strategy::CancelFlag;
    use quarry_core::{Dimensions, LoadOptions, Pipeline};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct CountingBuffers(Mutex<usize>);

    impl BufferProvider for CountingBuffers {
        fn get_buffer(&self, len: usize) -> Vec<u8> {
            vec![0; len]
        }

        fn put_buffer(&self, _buffer: Vec<u8>) {
            *self.0.lock().unwrap() += 1;
        }
    }

    fn pipeline() -> Pipeline<String> {
        Pipeline::from_parts(
            Arc::new(EchoFetcher::new(DataSource::Local)),
            Arc::new(Utf8),
        )
        .with_transformer(Upper)
    }

    #[test]
    fn test_decodes_transforms_and_returns_bytes() {
        // --- 1. ARRANGE ---
        let registry = MetricsRegistry::new();
        let lane = DecodeLane::new(&registry).unwrap();
        let pipeline = pipeline();
        let key = pipeline.fingerprint("abc", Dimensions::ORIGINAL);
        let buffers = CountingBuffers::default();
        let cancel = CancelFlag::new();
        let disk = MapDiskCache::default();
        let ctx = LaneContext {
            key: &key,
            pipeline: &pipeline,
            options: LoadOptions::default(),
            cancel: &cancel,
            buffers: &buffers,
            disk_cache: &disk,
        };

        // --- 2. ACT ---
        let fresh = lane
            .decode(
                &ctx,
                Fetched {
                    bytes: b"abc".to_vec(),
                    source: DataSource::Local,
                },
            )
            .unwrap();
        let cached = lane
            .decode(
                &ctx,
                Fetched {
                    bytes: b"xyz".to_vec(),
                    source: DataSource::ResourceDiskCache,
                },
            )
            .unwrap();

        // --- 3. ASSERT ---
        assert_eq!(fresh, "ABC");
        assert_eq!(cached, "xyz");
        assert_eq!(*buffers.0.lock().unwrap(), 2);
        assert_eq!(lane.decodes.get().unwrap(), 2);
        assert_eq!(lane.decode_time_ms.sample_count().unwrap(), 2);
    }

    #[test]
    fn test_malformed_bytes_fail_and_still_return_buffer() {
        let registry = MetricsRegistry::new();
        let lane = DecodeLane::new(&registry).unwrap();
        let pipeline = pipeline();
        let key = pipeline.fingerprint("abc", Dimensions::ORIGINAL);
        let buffers = CountingBuffers::default();
        let cancel = CancelFlag::new();
        let disk = MapDiskCache::default();
        let ctx = LaneContext {
            key: &key,
            pipeline: &pipeline,
            options: LoadOptions::default(),
            cancel: &cancel,
            buffers: &buffers,
            disk_cache: &disk,
        };

        let err = lane
            .decode(
                &ctx,
                Fetched {
                    bytes: vec![0xff, 0xfe],
                    source: DataSource::Local,
                },
            )
            .unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
        assert_eq!(*buffers.0.lock().unwrap(), 1);

        cancel.cancel();
        let err = lane
            .decode(
                &ctx,
                Fetched {
                    bytes: b"abc".to_vec(),
                    source: DataSource::Local,
                },
            )
            .unwrap_err();
        assert_eq!(err, DecodeError::Cancelled);
        assert_eq!(*buffers.0.lock().unwrap(), 2);
        assert_eq!(lane.decodes.get().unwrap(), 0);
    }
}
