//! Series eviction.
//!
//! Metrics whose label values follow the lifecycle of something external
//! (a tracked host, a tenant, a queue) grow without bound unless series are
//! dropped when that thing goes away. `remove_series` drops exactly one
//! series and leaves the rest of the metric, including its declared labels,
//! untouched.

use crate::labels::LabelSet;
use crate::metrics::{Counter, Gauge, Histogram};
use crate::registry::MetricHandle;

/// A metric store that can forget a series.
pub trait SeriesStore {
    /// Remove the series for `labels`. Returns whether one existed.
    fn remove(&self, labels: &LabelSet) -> bool;
}

impl SeriesStore for Counter {
    fn remove(&self, labels: &LabelSet) -> bool {
        self.series.remove(labels).is_some()
    }
}

impl SeriesStore for Gauge {
    fn remove(&self, labels: &LabelSet) -> bool {
        self.series.remove(labels).is_some()
    }
}

impl SeriesStore for Histogram {
    fn remove(&self, labels: &LabelSet) -> bool {
        self.series.remove(labels).is_some()
    }
}

impl SeriesStore for MetricHandle {
    fn remove(&self, labels: &LabelSet) -> bool {
        match self {
            MetricHandle::Counter(m) => m.remove(labels),
            MetricHandle::Gauge(m) => m.remove(labels),
            MetricHandle::Histogram(m) => m.remove(labels),
            // computed fresh on every scrape, nothing stored
            MetricHandle::Collected(_) => false,
        }
    }
}

/// Remove one series from `metric`. Removing a series that was never
/// recorded is a no-op.
pub fn remove_series<S: SeriesStore + ?Sized>(metric: &S, labels: &LabelSet) {
    if metric.remove(labels) {
        tracing::debug!(%labels, "removed series");
    }
}
