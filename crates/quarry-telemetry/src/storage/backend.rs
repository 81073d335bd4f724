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

use quarry_core::telemetry::{
    Metric, MetricId, MetricType, MetricValue, MetricsError, MetricsResult,
};
use std::fmt::Debug;

/// Storage for registered metrics.
///
/// Updates go through [`update`](Self::update), which applies a closure under
/// the backend's own lock, so concurrent increments from several worker threads
/// never lose counts.
pub trait MetricsBackend: Send + Sync + Debug + 'static {
    /// Stores a metric, replacing any metric with the same id.
    fn put_metric(&self, metric: Metric) -> MetricsResult<()>;

    /// Stores a metric only if its id is free. Returns `true` if it was inserted.
    fn insert_if_absent(&self, metric: Metric) -> MetricsResult<bool>;

    /// Returns a copy of a metric.
    fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric>;

    /// Applies `apply` to the stored value atomically and returns the new value.
    fn update(
        &self,
        id: &MetricId,
        apply: &mut dyn FnMut(&mut MetricValue) -> MetricsResult<()>,
    ) -> MetricsResult<MetricValue>;

    /// Returns `true` if a metric with this id exists.
    fn contains_metric(&self, id: &MetricId) -> bool;

    /// Returns copies of every metric.
    fn list_all_metrics(&self) -> Vec<Metric>;

    /// Removes every metric.
    fn clear_all(&self) -> MetricsResult<()>;

    /// Number of stored metrics.
    fn metric_count(&self) -> usize;

    /// Adds `delta` to a counter and returns the new count.
    fn increment_counter(&self, id: &MetricId, delta: u64) -> MetricsResult<u64> {
        let value = self.update(id, &mut |value| match value {
            MetricValue::Counter(count) => {
                *count = count.saturating_add(delta);
                Ok(())
            }
            other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Counter,
                found: other.metric_type(),
            }),
        })?;
        Ok(value.as_counter().unwrap_or_default())
    }

    /// Sets a gauge.
    fn set_gauge(&self, id: &MetricId, new_value: f64) -> MetricsResult<()> {
        self.update(id, &mut |value| match value {
            MetricValue::Gauge(current) => {
                *current = new_value;
                Ok(())
            }
            other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Gauge,
                found: other.metric_type(),
            }),
        })
        .map(|_| ())
    }

    /// Adds `delta` to a gauge and returns the new value.
    fn add_gauge(&self, id: &MetricId, delta: f64) -> MetricsResult<f64> {
        let value = self.update(id, &mut |value| match value {
            MetricValue::Gauge(current) => {
                *current += delta;
                Ok(())
            }
            other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Gauge,
                found: other.metric_type(),
            }),
        })?;
        Ok(value.as_gauge().unwrap_or_default())
    }

    /// Records a histogram sample.
    fn record_histogram_sample(&self, id: &MetricId, sample: f64) -> MetricsResult<()> {
        self.update(id, &mut |value| match value {
            MetricValue::Histogram { .. } => {
                value.observe(sample);
                Ok(())
            }
            other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Histogram,
                found: other.metric_type(),
            }),
        })
        .map(|_| ())
    }
}
