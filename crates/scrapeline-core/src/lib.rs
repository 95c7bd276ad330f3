//! scrapeline core: metric stores, registry and instrumentation primitives.
//!
//! - [`LazyCollector`]: metric values computed at scrape time, with failures
//!   isolated and counted instead of propagated.
//! - [`Request`]: brackets a unit of work with attempt, failure, duration and
//!   in-progress accounting that stays consistent on every exit path.
//! - [`remove_series`]: evicts a single label set from a metric.
//!
//! The registry and its counter/gauge/histogram stores live here too; they
//! carry no transport or runtime dependencies.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. All fallible
//! paths surface as `MetricsError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod collected;
pub mod error;
pub mod evict;
pub mod labels;
pub mod metrics;
pub mod registry;
pub mod request;

pub use collected::{Collected, CollectError, LazyCollector, LazyCollectorBuilder, ValueMap};
pub use error::{ErrorClass, ErrorKind, MetricsError, Result};
pub use evict::{remove_series, SeriesStore};
pub use labels::{LabelSchema, LabelSet};
pub use metrics::{Counter, Gauge, Histogram, HistogramSnapshot, MetricDesc, MetricKind};
pub use registry::{MetricHandle, Registry};
pub use request::{DurationLabels, MeasureError, Request};
