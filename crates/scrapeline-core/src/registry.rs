//! Metric registry and text exposition rendering.
//!
//! The registry owns every registered metric by name. Registration happens
//! once at setup; scrapes call `render`, which walks the metrics in name
//! order and asks lazy collectors for fresh values.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::collected::LazyCollector;
use crate::error::{MetricsError, Result};
use crate::metrics::{Counter, Gauge, Histogram, MetricDesc, MetricKind, DEFAULT_BUCKETS};

/// Shared handle to a registered metric.
#[derive(Debug, Clone)]
pub enum MetricHandle {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    Histogram(Arc<Histogram>),
    Collected(Arc<LazyCollector>),
}

impl MetricHandle {
    pub fn desc(&self) -> &MetricDesc {
        match self {
            MetricHandle::Counter(m) => m.desc(),
            MetricHandle::Gauge(m) => m.desc(),
            MetricHandle::Histogram(m) => m.desc(),
            MetricHandle::Collected(m) => m.desc(),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.desc().kind()
    }

    pub fn as_counter(&self) -> Option<&Arc<Counter>> {
        match self {
            MetricHandle::Counter(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_gauge(&self) -> Option<&Arc<Gauge>> {
        match self {
            MetricHandle::Gauge(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_histogram(&self) -> Option<&Arc<Histogram>> {
        match self {
            MetricHandle::Histogram(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_collected(&self) -> Option<&Arc<LazyCollector>> {
        match self {
            MetricHandle::Collected(m) => Some(m),
            _ => None,
        }
    }

    fn render(&self, out: &mut String) {
        match self {
            MetricHandle::Counter(m) => m.render(out),
            MetricHandle::Gauge(m) => m.render(out),
            MetricHandle::Histogram(m) => m.render(out),
            MetricHandle::Collected(m) => m.render(out),
        }
    }
}

/// Named collection of metrics.
#[derive(Default)]
pub struct Registry {
    metrics: DashMap<String, MetricHandle>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            metrics: DashMap::new(),
        }
    }

    /// Register a stored metric of the given kind.
    ///
    /// Summaries can only be produced by lazy collectors.
    pub fn register(&self, kind: MetricKind, name: &str, help: &str, labels: &[&str]) -> Result<MetricHandle> {
        let desc = MetricDesc::new(kind, name, help, labels)?;
        let handle = match kind {
            MetricKind::Counter => MetricHandle::Counter(Arc::new(Counter::from_desc(desc))),
            MetricKind::Gauge => MetricHandle::Gauge(Arc::new(Gauge::from_desc(desc))),
            MetricKind::Histogram => {
                MetricHandle::Histogram(Arc::new(Histogram::from_desc(desc, &DEFAULT_BUCKETS)?))
            }
            MetricKind::Summary => {
                return Err(MetricsError::UnsupportedKind {
                    name: name.to_string(),
                    kind: kind.as_str(),
                })
            }
        };
        self.insert(handle)
    }

    pub fn counter(&self, name: &str, help: &str, labels: &[&str]) -> Result<Arc<Counter>> {
        let counter = Arc::new(Counter::new(name, help, labels)?);
        self.insert(MetricHandle::Counter(Arc::clone(&counter)))?;
        Ok(counter)
    }

    pub fn gauge(&self, name: &str, help: &str, labels: &[&str]) -> Result<Arc<Gauge>> {
        let gauge = Arc::new(Gauge::new(name, help, labels)?);
        self.insert(MetricHandle::Gauge(Arc::clone(&gauge)))?;
        Ok(gauge)
    }

    pub fn histogram(&self, name: &str, help: &str, labels: &[&str]) -> Result<Arc<Histogram>> {
        self.histogram_with_buckets(name, help, labels, &DEFAULT_BUCKETS)
    }

    pub fn histogram_with_buckets(
        &self,
        name: &str,
        help: &str,
        labels: &[&str],
        buckets: &[f64],
    ) -> Result<Arc<Histogram>> {
        let histogram = Arc::new(Histogram::with_buckets(name, help, labels, buckets)?);
        self.insert(MetricHandle::Histogram(Arc::clone(&histogram)))?;
        Ok(histogram)
    }

    /// Register a lazy collector. Usually called through
    /// `LazyCollectorBuilder::register`.
    pub fn register_collector(&self, collector: Arc<LazyCollector>) -> Result<()> {
        self.insert(MetricHandle::Collected(collector)).map(|_| ())
    }

    fn insert(&self, handle: MetricHandle) -> Result<MetricHandle> {
        let name = handle.desc().name().to_string();
        match self.metrics.entry(name) {
            Entry::Occupied(e) => Err(MetricsError::AlreadyRegistered(e.key().clone())),
            Entry::Vacant(e) => {
                tracing::debug!(metric = %e.key(), kind = handle.kind().as_str(), "registered metric");
                e.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    /// Look up a metric by name.
    pub fn get(&self, name: &str) -> Option<MetricHandle> {
        self.metrics.get(name).map(|r| r.value().clone())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.metrics.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Render every metric in Prometheus text exposition format (0.0.4).
    pub fn render(&self) -> String {
        // Clone handles out first so no shard lock is held while lazy
        // collectors run.
        let mut handles: Vec<MetricHandle> = self.metrics.iter().map(|r| r.value().clone()).collect();
        handles.sort_by(|a, b| a.desc().name().cmp(b.desc().name()));

        let mut out = String::new();
        for handle in &handles {
            handle.render(&mut out);
        }
        out
    }
}
