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

use crate::storage::backend::MetricsBackend;
use quarry_core::telemetry::{Metric, MetricId, MetricValue, MetricsError, MetricsResult};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory metrics backend using `RwLock<HashMap>`.
///
/// Snapshots take the read lock; every update takes the write lock for the
/// duration of a single closure.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    storage: RwLock<HashMap<MetricId, Metric>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty backend with room for `capacity` metrics.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<MetricId, Metric>> {
        // A panic while holding the lock cannot leave a metric half-written.
        self.storage.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<MetricId, Metric>> {
        self.storage.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl MetricsBackend for InMemoryBackend {
    fn put_metric(&self, metric: Metric) -> MetricsResult<()> {
        self.write().insert(metric.id.clone(), metric);
        Ok(())
    }

    fn insert_if_absent(&self, metric: Metric) -> MetricsResult<bool> {
        let mut storage = self.write();
        if storage.contains_key(&metric.id) {
            return Ok(false);
        }
        storage.insert(metric.id.clone(), metric);
        Ok(true)
    }

    fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| MetricsError::NotFound(id.clone()))
    }

    fn update(
        &self,
        id: &MetricId,
        apply: &mut dyn FnMut(&mut MetricValue) -> MetricsResult<()>,
    ) -> MetricsResult<MetricValue> {
        let mut storage = self.write();
        let metric = storage
            .get_mut(id)
            .ok_or_else(|| MetricsError::NotFound(id.clone()))?;
        apply(&mut metric.value)?;
        Ok(metric.value.clone())
    }

    fn contains_metric(&self, id: &MetricId) -> bool {
        self.read().contains_key(id)
    }

    fn list_all_metrics(&self) -> Vec<Metric> {
        self.read().values().cloned().collect()
    }

    fn clear_all(&self) -> MetricsResult<()> {
        self.write().clear();
        Ok(())
    }

    fn metric_count(&self) -> usize {
        self.read().len()
    }
}
