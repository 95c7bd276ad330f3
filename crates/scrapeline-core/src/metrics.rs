//! Metric stores: counter, gauge and histogram families.
//!
//! Each store keeps one series per label set in a `DashMap`, with atomic
//! values so that mutations from many threads never contend on a lock held
//! by the store itself. Floating point values are kept as `f64` bits inside
//! `AtomicU64` and updated with compare-and-swap loops.
//!
//! Every mutation validates its label set against the declared schema;
//! reads do not, an unknown label set simply has no series.

use std::fmt::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

use crate::error::{MetricsError, Result};
use crate::labels::{is_valid_metric_name, LabelSchema, LabelSet};

/// Declared type of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricKind {
    #[default]
    Gauge,
    Counter,
    Histogram,
    Summary,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
        }
    }

    /// Label names the exposition format claims for this kind.
    pub fn reserved_labels(self) -> &'static [&'static str] {
        match self {
            MetricKind::Histogram => &["le"],
            MetricKind::Summary => &["quantile"],
            MetricKind::Gauge | MetricKind::Counter => &[],
        }
    }
}

impl FromStr for MetricKind {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            "histogram" => Ok(MetricKind::Histogram),
            "summary" => Ok(MetricKind::Summary),
            other => Err(MetricsError::UnknownMetricKind(other.to_string())),
        }
    }
}

/// Identity of a registered metric. Immutable after construction.
#[derive(Debug, Clone)]
pub struct MetricDesc {
    name: String,
    help: String,
    labels: LabelSchema,
    kind: MetricKind,
}

impl MetricDesc {
    pub fn new(kind: MetricKind, name: &str, help: &str, labels: &[&str]) -> Result<Self> {
        let schema = LabelSchema::new(labels.iter().copied(), kind.reserved_labels())?;
        Self::with_schema(kind, name, help, schema)
    }

    pub fn with_schema(kind: MetricKind, name: &str, help: &str, labels: LabelSchema) -> Result<Self> {
        if !is_valid_metric_name(name) {
            return Err(MetricsError::InvalidMetricName(name.to_string()));
        }
        if help.trim().is_empty() {
            return Err(MetricsError::InvalidHelp(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            help: help.to_string(),
            labels,
            kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn help(&self) -> &str {
        &self.help
    }
    pub fn labels(&self) -> &LabelSchema {
        &self.labels
    }
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub(crate) fn render_header(&self, out: &mut String) {
        self.render_header_as(out, self.kind.as_str());
    }

    pub(crate) fn render_header_as(&self, out: &mut String, exposed_type: &str) {
        let help = self.help.replace('\\', "\\\\").replace('\n', "\\n");
        let _ = writeln!(out, "# HELP {} {}", self.name, help);
        let _ = writeln!(out, "# TYPE {} {}", self.name, exposed_type);
    }
}

/// `f64` stored as bits in an `AtomicU64`.
#[derive(Debug, Default)]
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub(crate) fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub(crate) fn store(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn add(&self, v: f64) {
        let mut cur = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(cur) + v).to_bits();
            match self
                .0
                .compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => cur = actual,
            }
        }
    }
}

/// Format a sample value for the text exposition format.
pub(crate) fn fmt_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}

pub(crate) fn render_sample(out: &mut String, name: &str, labels: &LabelSet, v: f64) {
    if labels.is_empty() {
        let _ = writeln!(out, "{} {}", name, fmt_value(v));
    } else {
        let _ = writeln!(out, "{}{{{}}} {}", name, labels.render_pairs(), fmt_value(v));
    }
}

fn sorted_values(map: &DashMap<LabelSet, AtomicF64>) -> Vec<(LabelSet, f64)> {
    let mut rows: Vec<(LabelSet, f64)> = map
        .iter()
        .map(|r| (r.key().clone(), r.value().load()))
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    rows
}

/// Monotonic counter family.
#[derive(Debug)]
pub struct Counter {
    desc: MetricDesc,
    pub(crate) series: DashMap<LabelSet, AtomicF64>,
}

impl Counter {
    pub fn new(name: &str, help: &str, labels: &[&str]) -> Result<Self> {
        Ok(Self::from_desc(MetricDesc::new(MetricKind::Counter, name, help, labels)?))
    }

    pub(crate) fn from_desc(desc: MetricDesc) -> Self {
        Self {
            desc,
            series: DashMap::new(),
        }
    }

    pub fn desc(&self) -> &MetricDesc {
        &self.desc
    }

    /// Increment by 1.
    pub fn inc(&self, labels: &LabelSet) -> Result<()> {
        self.add(labels, 1.0)
    }

    /// Increment by a non-negative amount.
    pub fn add(&self, labels: &LabelSet, v: f64) -> Result<()> {
        if v.is_nan() || v < 0.0 {
            return Err(MetricsError::InvalidValue {
                name: self.desc.name.clone(),
                value: v,
            });
        }
        self.desc.labels.validate(labels)?;
        self.series.entry(labels.clone()).or_default().add(v);
        Ok(())
    }

    pub fn get(&self, labels: &LabelSet) -> Option<f64> {
        self.series.get(labels).map(|r| r.value().load())
    }

    /// All series, ordered by label set.
    pub fn values(&self) -> Vec<(LabelSet, f64)> {
        sorted_values(&self.series)
    }

    pub(crate) fn render(&self, out: &mut String) {
        self.desc.render_header(out);
        for (labels, v) in self.values() {
            render_sample(out, &self.desc.name, &labels, v);
        }
    }
}

/// Gauge family; values may go up and down.
#[derive(Debug)]
pub struct Gauge {
    desc: MetricDesc,
    pub(crate) series: DashMap<LabelSet, AtomicF64>,
}

impl Gauge {
    pub fn new(name: &str, help: &str, labels: &[&str]) -> Result<Self> {
        Ok(Self::from_desc(MetricDesc::new(MetricKind::Gauge, name, help, labels)?))
    }

    pub(crate) fn from_desc(desc: MetricDesc) -> Self {
        Self {
            desc,
            series: DashMap::new(),
        }
    }

    pub fn desc(&self) -> &MetricDesc {
        &self.desc
    }

    pub fn set(&self, labels: &LabelSet, v: f64) -> Result<()> {
        self.desc.labels.validate(labels)?;
        self.series.entry(labels.clone()).or_default().store(v);
        Ok(())
    }

    /// Increment by 1.
    pub fn inc(&self, labels: &LabelSet) -> Result<()> {
        self.add(labels, 1.0)
    }

    /// Decrement by 1.
    pub fn dec(&self, labels: &LabelSet) -> Result<()> {
        self.add(labels, -1.0)
    }

    /// Add an arbitrary signed delta.
    pub fn add(&self, labels: &LabelSet, v: f64) -> Result<()> {
        self.desc.labels.validate(labels)?;
        self.series.entry(labels.clone()).or_default().add(v);
        Ok(())
    }

    pub fn get(&self, labels: &LabelSet) -> Option<f64> {
        self.series.get(labels).map(|r| r.value().load())
    }

    /// All series, ordered by label set.
    pub fn values(&self) -> Vec<(LabelSet, f64)> {
        sorted_values(&self.series)
    }

    pub(crate) fn render(&self, out: &mut String) {
        self.desc.render_header(out);
        for (labels, v) in self.values() {
            render_sample(out, &self.desc.name, &labels, v);
        }
    }
}

/// Default bucket upper bounds, in seconds.
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

#[derive(Debug)]
pub(crate) struct AtomicHistogram {
    count: AtomicU64,
    sum: AtomicF64,
    // cumulative: buckets[i] counts observations <= bounds[i]
    buckets: Vec<AtomicU64>,
}

impl AtomicHistogram {
    fn new(n: usize) -> Self {
        Self {
            count: AtomicU64::new(0),
            sum: AtomicF64::default(),
            buckets: (0..n).map(|_| AtomicU64::new(0)).collect(),
        }
    }
}

/// Point-in-time copy of one histogram series.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// `(upper bound, cumulative count)`, ascending.
    pub buckets: Vec<(f64, u64)>,
    pub count: u64,
    pub sum: f64,
}

impl HistogramSnapshot {
    /// Cumulative count for the bucket with upper bound `le`.
    pub fn bucket(&self, le: f64) -> Option<u64> {
        self.buckets.iter().find(|(b, _)| *b == le).map(|(_, c)| *c)
    }

    /// Count of the `+Inf` bucket, i.e. every observation.
    pub fn infinite_bucket(&self) -> u64 {
        self.count
    }
}

/// Histogram family with fixed cumulative buckets.
#[derive(Debug)]
pub struct Histogram {
    desc: MetricDesc,
    bounds: Vec<f64>,
    pub(crate) series: DashMap<LabelSet, AtomicHistogram>,
}

impl Histogram {
    pub fn new(name: &str, help: &str, labels: &[&str]) -> Result<Self> {
        Self::with_buckets(name, help, labels, &DEFAULT_BUCKETS)
    }

    pub fn with_buckets(name: &str, help: &str, labels: &[&str], bounds: &[f64]) -> Result<Self> {
        let desc = MetricDesc::new(MetricKind::Histogram, name, help, labels)?;
        Self::from_desc(desc, bounds)
    }

    pub(crate) fn from_desc(desc: MetricDesc, bounds: &[f64]) -> Result<Self> {
        let ascending = bounds.windows(2).all(|w| w[0] < w[1]);
        if bounds.is_empty() || !ascending || bounds.iter().any(|b| !b.is_finite()) {
            return Err(MetricsError::BadConfig(format!(
                "histogram {} buckets must be finite and strictly ascending",
                desc.name
            )));
        }
        Ok(Self {
            desc,
            bounds: bounds.to_vec(),
            series: DashMap::new(),
        })
    }

    pub fn desc(&self) -> &MetricDesc {
        &self.desc
    }

    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Record one observation.
    pub fn observe(&self, labels: &LabelSet, v: f64) -> Result<()> {
        self.desc.labels.validate(labels)?;
        let n = self.bounds.len();
        let hist = self
            .series
            .entry(labels.clone())
            .or_insert_with(|| AtomicHistogram::new(n));

        hist.count.fetch_add(1, Ordering::Relaxed);
        hist.sum.add(v);
        for (i, &b) in self.bounds.iter().enumerate() {
            if v <= b {
                hist.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Record a duration in seconds.
    pub fn observe_duration(&self, labels: &LabelSet, d: Duration) -> Result<()> {
        self.observe(labels, d.as_secs_f64())
    }

    pub fn get(&self, labels: &LabelSet) -> Option<HistogramSnapshot> {
        self.series.get(labels).map(|r| self.snapshot(r.value()))
    }

    /// All series, ordered by label set.
    pub fn values(&self) -> Vec<(LabelSet, HistogramSnapshot)> {
        let mut rows: Vec<(LabelSet, HistogramSnapshot)> = self
            .series
            .iter()
            .map(|r| (r.key().clone(), self.snapshot(r.value())))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    fn snapshot(&self, hist: &AtomicHistogram) -> HistogramSnapshot {
        HistogramSnapshot {
            buckets: self
                .bounds
                .iter()
                .zip(hist.buckets.iter())
                .map(|(b, c)| (*b, c.load(Ordering::Relaxed)))
                .collect(),
            count: hist.count.load(Ordering::Relaxed),
            sum: hist.sum.load(),
        }
    }

    pub(crate) fn render(&self, out: &mut String) {
        self.desc.render_header(out);
        let name = &self.desc.name;
        for (labels, snap) in self.values() {
            for (le, count) in &snap.buckets {
                let bucket_labels = labels.clone().with("le", fmt_value(*le));
                render_sample(out, &format!("{name}_bucket"), &bucket_labels, *count as f64);
            }
            let inf = labels.clone().with("le", "+Inf");
            render_sample(out, &format!("{name}_bucket"), &inf, snap.count as f64);
            render_sample(out, &format!("{name}_sum"), &labels, snap.sum);
            render_sample(out, &format!("{name}_count"), &labels, snap.count as f64);
        }
    }
}
