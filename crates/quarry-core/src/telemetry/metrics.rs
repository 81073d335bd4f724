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

//! Abstract definitions for engine metrics.

use serde::Serialize;
use std::fmt::{self, Display};
use thiserror::Error;

/// Identifies a metric as `namespace:name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MetricId {
    /// The subsystem the metric belongs to (e.g. "engine", "buffer_pool").
    pub namespace: String,
    /// The metric itself (e.g. "memory_hits").
    pub name: String,
}

impl MetricId {
    /// Creates a new id.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// The fundamental type of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetricType {
    /// Monotonically increasing count.
    Counter,
    /// A value that can go up and down.
    Gauge,
    /// A distribution over fixed buckets.
    Histogram,
}

/// The current value of a metric.
///
/// Histograms keep bucket counts and a running sum rather than every sample, so
/// their memory use is bounded no matter how many loads are observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MetricValue {
    /// Counter value.
    Counter(u64),
    /// Gauge value.
    Gauge(f64),
    /// Histogram state.
    Histogram {
        /// Inclusive upper bounds, ascending.
        bounds: Vec<f64>,
        /// Samples per bucket; one extra trailing bucket counts overflow.
        counts: Vec<u64>,
        /// Sum of all samples.
        sum: f64,
        /// Number of samples.
        count: u64,
    },
}

impl MetricValue {
    /// An empty histogram over `bounds`.
    pub fn histogram(mut bounds: Vec<f64>) -> Self {
        bounds.sort_by(|a, b| a.total_cmp(b));
        let counts = vec![0; bounds.len() + 1];
        Self::Histogram {
            bounds,
            counts,
            sum: 0.0,
            count: 0,
        }
    }

    /// The type of this value.
    pub fn metric_type(&self) -> MetricType {
        match self {
            Self::Counter(_) => MetricType::Counter,
            Self::Gauge(_) => MetricType::Gauge,
            Self::Histogram { .. } => MetricType::Histogram,
        }
    }

    /// Counter value, if this is a counter.
    pub fn as_counter(&self) -> Option<u64> {
        match self {
            Self::Counter(v) => Some(*v),
            _ => None,
        }
    }

    /// Gauge value, if this is a gauge.
    pub fn as_gauge(&self) -> Option<f64> {
        match self {
            Self::Gauge(v) => Some(*v),
            _ => None,
        }
    }

    /// Records one histogram sample. No-op for other types.
    pub fn observe(&mut self, sample: f64) {
        if let Self::Histogram {
            bounds,
            counts,
            sum,
            count,
        } = self
        {
            let bucket = bounds
                .iter()
                .position(|bound| sample <= *bound)
                .unwrap_or(bounds.len());
            counts[bucket] += 1;
            *sum += sample;
            *count += 1;
        }
    }
}

/// A registered metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    /// Its id.
    pub id: MetricId,
    /// What it measures.
    pub description: String,
    /// Unit of the value ("count", "bytes", "ms").
    pub unit: String,
    /// Current value.
    pub value: MetricValue,
}

/// Result type of metric operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Errors of the metrics system.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    /// No metric is registered under this id.
    #[error("metric not found: {0}")]
    NotFound(MetricId),
    /// The operation does not apply to this metric's type.
    #[error("type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        /// Type the operation needs.
        expected: MetricType,
        /// Type of the registered metric.
        found: MetricType,
    },
    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_id_display() {
        assert_eq!(
            MetricId::new("engine", "memory_hits").to_string(),
            "engine:memory_hits"
        );
    }

    #[test]
    fn test_histogram_buckets_and_overflow() {
        let mut value = MetricValue::histogram(vec![10.0, 1.0, 5.0]);
        for sample in [0.5, 1.0, 3.0, 7.0, 50.0] {
            value.observe(sample);
        }
        match value {
            MetricValue::Histogram {
                bounds,
                counts,
                sum,
                count,
            } => {
                assert_eq!(bounds, vec![1.0, 5.0, 10.0]);
                assert_eq!(counts, vec![2, 1, 1, 1]);
                assert_eq!(count, 5);
                assert!((sum - 61.5).abs() < f64::EPSILON);
            }
            other => panic!("expected histogram, got {other:?}"),
        }
    }

    #[test]
    fn test_observe_ignores_non_histograms() {
        let mut counter = MetricValue::Counter(3);
        counter.observe(1.0);
        assert_eq!(counter.as_counter(), Some(3));
        assert_eq!(counter.metric_type(), MetricType::Counter);
        assert_eq!(MetricValue::Gauge(2.5).as_gauge(), Some(2.5));
    }
}
