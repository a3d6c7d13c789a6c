//! # QDV Monitoring
//!
//! Metric primitives for the QDV distributed validator client.
//!
//! Provides the three metric types matching Prometheus conventions:
//! - **Counter**: monotonically increasing value (e.g., consensus errors)
//! - **Gauge**: value that can go up or down (e.g., last decided round)
//! - **Histogram**: distribution of observations (e.g., consensus durations)
//!
//! Consensus metrics are partitioned by duty type, so each plain metric also
//! has a labelled family variant ([`LabeledCounter`], [`LabeledGauge`],
//! [`LabeledHistogram`]) keyed by a single label value.
//!
//! ## Usage
//!
//! ```rust
//! use qdv_monitoring::{Counter, LabeledHistogram};
//!
//! let errors = Counter::new("consensus_error_total", "Total consensus errors");
//! errors.inc();
//!
//! let duration = LabeledHistogram::new(
//!     "consensus_duration_seconds",
//!     "Duration of a consensus instance in seconds by duty",
//!     "duty",
//!     vec![0.05, 0.1, 0.25, 0.5, 1.0],
//! );
//! duration.observe("attester", 0.2);
//! ```
//!
//! Collectors are plain values passed to their users by configuration; there
//! is no process-global registry.

pub mod prometheus;

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// Metric primitives
// ---------------------------------------------------------------------------

/// A monotonically increasing counter.
pub struct Counter {
    value: AtomicU64,
    name: &'static str,
    help: &'static str,
}

impl Counter {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            value: AtomicU64::new(0),
            name,
            help,
        }
    }

    /// Increment the counter by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Add a value to the counter.
    pub fn add(&self, v: u64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    /// Get the current counter value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn help(&self) -> &'static str {
        self.help
    }
}

/// A gauge that can go up or down.
pub struct Gauge {
    value: AtomicI64,
    name: &'static str,
    help: &'static str,
}

impl Gauge {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            value: AtomicI64::new(0),
            name,
            help,
        }
    }

    /// Set the gauge to an absolute value.
    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    /// Increment the gauge by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement the gauge by 1.
    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get the current gauge value.
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn help(&self) -> &'static str {
        self.help
    }
}

/// A histogram that collects observations into configurable buckets.
///
/// Bucket counts are cumulative, Prometheus-style: an observation lands in
/// every bucket whose upper bound is >= the value.
pub struct Histogram {
    buckets: Vec<f64>,
    counts: Vec<AtomicU64>,
    sum: Mutex<f64>,
    count: AtomicU64,
    name: &'static str,
    help: &'static str,
}

impl Histogram {
    /// Create a histogram with the given bucket upper bounds.
    pub fn new(name: &'static str, help: &'static str, buckets: Vec<f64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            sum: Mutex::new(0.0),
            count: AtomicU64::new(0),
            name,
            help,
        }
    }

    /// Observe a value, adding it to the appropriate bucket(s).
    pub fn observe(&self, v: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        {
            let mut sum = self.sum.lock();
            *sum += v;
        }
        for (i, bound) in self.buckets.iter().enumerate() {
            if v <= *bound {
                self.counts[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Get the total number of observations.
    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Get the sum of all observations.
    pub fn get_sum(&self) -> f64 {
        *self.sum.lock()
    }

    /// Get (upper bound, cumulative count) pairs.
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        self.buckets
            .iter()
            .zip(self.counts.iter())
            .map(|(bound, count)| (*bound, count.load(Ordering::Relaxed)))
            .collect()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn help(&self) -> &'static str {
        self.help
    }
}

// ---------------------------------------------------------------------------
// Labelled families
// ---------------------------------------------------------------------------

/// A counter family partitioned by one label.
///
/// Label values are created lazily on first use.  A `BTreeMap` keeps the
/// exposition output in a stable order.
pub struct LabeledCounter {
    values: Mutex<BTreeMap<String, u64>>,
    label: &'static str,
    name: &'static str,
    help: &'static str,
}

impl LabeledCounter {
    pub fn new(name: &'static str, help: &'static str, label: &'static str) -> Self {
        Self {
            values: Mutex::new(BTreeMap::new()),
            label,
            name,
            help,
        }
    }

    /// Increment the counter for `label_value` by 1.
    pub fn inc(&self, label_value: &str) {
        let mut values = self.values.lock();
        *values.entry(label_value.to_string()).or_insert(0) += 1;
    }

    /// Get the counter for `label_value` (0 if never incremented).
    pub fn get(&self, label_value: &str) -> u64 {
        self.values.lock().get(label_value).copied().unwrap_or(0)
    }

    /// All (label value, count) pairs in stable order.
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        self.values
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn help(&self) -> &'static str {
        self.help
    }
}

/// A gauge family partitioned by one label.
pub struct LabeledGauge {
    values: Mutex<BTreeMap<String, f64>>,
    label: &'static str,
    name: &'static str,
    help: &'static str,
}

impl LabeledGauge {
    pub fn new(name: &'static str, help: &'static str, label: &'static str) -> Self {
        Self {
            values: Mutex::new(BTreeMap::new()),
            label,
            name,
            help,
        }
    }

    /// Set the gauge for `label_value` to an absolute value.
    pub fn set(&self, label_value: &str, v: f64) {
        let mut values = self.values.lock();
        values.insert(label_value.to_string(), v);
    }

    /// Get the gauge for `label_value`, if it was ever set.
    pub fn get(&self, label_value: &str) -> Option<f64> {
        self.values.lock().get(label_value).copied()
    }

    /// All (label value, gauge) pairs in stable order.
    pub fn snapshot(&self) -> Vec<(String, f64)> {
        self.values
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn help(&self) -> &'static str {
        self.help
    }
}

/// Per-label-value histogram state.
#[derive(Debug, Clone)]
pub struct HistogramData {
    /// Cumulative count per bucket, parallel to the family's bounds.
    pub counts: Vec<u64>,
    /// Sum of all observations.
    pub sum: f64,
    /// Total number of observations.
    pub count: u64,
}

/// A histogram family partitioned by one label.
///
/// All label values share the same bucket bounds.
pub struct LabeledHistogram {
    buckets: Vec<f64>,
    values: Mutex<BTreeMap<String, HistogramData>>,
    label: &'static str,
    name: &'static str,
    help: &'static str,
}

impl LabeledHistogram {
    pub fn new(
        name: &'static str,
        help: &'static str,
        label: &'static str,
        buckets: Vec<f64>,
    ) -> Self {
        Self {
            buckets,
            values: Mutex::new(BTreeMap::new()),
            label,
            name,
            help,
        }
    }

    /// Observe a value for `label_value`.
    pub fn observe(&self, label_value: &str, v: f64) {
        let mut values = self.values.lock();
        let data = values
            .entry(label_value.to_string())
            .or_insert_with(|| HistogramData {
                counts: vec![0; self.buckets.len()],
                sum: 0.0,
                count: 0,
            });
        data.count += 1;
        data.sum += v;
        for (i, bound) in self.buckets.iter().enumerate() {
            if v <= *bound {
                data.counts[i] += 1;
            }
        }
    }

    /// The shared bucket upper bounds.
    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }

    /// Histogram state for `label_value`, if any observation was recorded.
    pub fn get(&self, label_value: &str) -> Option<HistogramData> {
        self.values.lock().get(label_value).cloned()
    }

    /// All (label value, histogram state) pairs in stable order.
    pub fn snapshot(&self) -> Vec<(String, HistogramData)> {
        self.values
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn help(&self) -> &'static str {
        self.help
    }
}
