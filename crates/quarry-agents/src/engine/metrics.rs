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

use quarry_core::telemetry::MetricsResult;
use quarry_telemetry::{CounterHandle, GaugeHandle, MetricsRegistry};

/// Counters the engine updates as loads move through the tiers, and gauges
/// sampling the memory tiers.
#[derive(Debug, Clone)]
pub(crate) struct EngineMetrics {
    pub active_hits: CounterHandle,
    pub memory_hits: CounterHandle,
    pub disk_hits: CounterHandle,
    pub fetches: CounterHandle,
    pub failures: CounterHandle,
    pub cancellations: CounterHandle,
    pub jobs_started: CounterHandle,
    pub memory_cache_bytes: GaugeHandle,
    pub pooled_bytes: GaugeHandle,
}

impl EngineMetrics {
    pub fn new(registry: &MetricsRegistry) -> MetricsResult<Self> {
        let counter = |name: &str, description: &str| {
            registry.register_counter("engine", name, description)
        };
        Ok(Self {
            active_hits: counter("active_hits", "Loads served by active resources")?,
            memory_hits: counter("memory_hits", "Loads served by the memory cache")?,
            disk_hits: counter("disk_hits", "Jobs served by the disk cache")?,
            fetches: counter("fetches", "Successful source fetches")?,
            failures: counter("failures", "Jobs that failed")?,
            cancellations: counter("cancellations", "Jobs cancelled before completion")?,
            jobs_started: counter("jobs_started", "Jobs created on a cache miss")?,
            memory_cache_bytes: registry.register_gauge(
                "engine",
                "memory_cache_bytes",
                "Bytes held by the memory cache",
                "bytes",
            )?,
            pooled_bytes: registry.register_gauge(
                "engine",
                "pooled_bytes",
                "Bytes parked in the buffer pool",
                "bytes",
            )?,
        })
    }
}

/// Increments `counter`, logging instead of failing.
pub(crate) fn bump(counter: &CounterHandle) {
    if let Err(e) = counter.increment() {
        log::warn!("Failed to update metric {}: {e}", counter.id());
    }
}

/// Sets `gauge` to `value`, logging instead of failing.
pub(crate) fn sample(gauge: &GaugeHandle, value: usize) {
    if let Err(e) = gauge.set(value as f64) {
        log::warn!("Failed to update metric {}: {e}", gauge.id());
    }
}
