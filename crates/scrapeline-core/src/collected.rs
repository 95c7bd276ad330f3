//! Metrics computed at scrape time.
//!
//! A `LazyCollector` holds no series of its own. Whenever it is scraped (or
//! queried with `get`) it runs its computation once and reports whatever
//! label sets and values come back. There is no background polling and no
//! caching between calls.
//!
//! The computation runs on every scrape, possibly on several threads at the
//! same time when scrapes overlap. It must be cheap, and it must be safe to
//! call concurrently: read shared state, or synchronise it yourself. No lock
//! is taken around it here.
//!
//! Failures never leave the collector. A computation that errors, panics,
//! returns something that is not a value map, or returns label sets that do
//! not match the declared labels makes the metric report nothing for that
//! scrape. The failure is logged and `<name>_collection_errors_total` is
//! incremented with a `class` label naming the failure.

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::Span;

use crate::error::{ErrorClass, MetricsError, Result};
use crate::labels::{LabelSchema, LabelSet};
use crate::metrics::{render_sample, Counter, MetricDesc, MetricKind};
use crate::registry::Registry;

/// Label sets and values produced by one computation.
pub type ValueMap = HashMap<LabelSet, f64>;

/// `class` label value for a result that was not a value map.
pub const NOT_A_MAP: &str = "NotAMap";
/// `class` label value for a result whose label sets failed validation.
pub const INVALID_LABEL_SET: &str = "InvalidLabelSet";
/// `class` label value for a computation that panicked.
pub const PANIC: &str = "Panic";

const UNTYPED: &str = "untyped";

/// Result shape of a computation.
#[derive(Debug, Clone, PartialEq)]
pub enum Collected {
    /// Label sets and their current values.
    Values(ValueMap),
    /// Something other than a value map came back; carries a description of
    /// what it was.
    Unrecognised(String),
}

impl Collected {
    pub fn unrecognised(what: impl fmt::Debug) -> Self {
        Collected::Unrecognised(format!("{what:?}"))
    }
}

impl From<ValueMap> for Collected {
    fn from(map: ValueMap) -> Self {
        Collected::Values(map)
    }
}

impl<const N: usize> From<[(LabelSet, f64); N]> for Collected {
    fn from(pairs: [(LabelSet, f64); N]) -> Self {
        Collected::Values(pairs.into_iter().collect())
    }
}

/// Failure raised by a computation.
///
/// Any `std::error::Error` converts into it with `?`. Errors with an
/// [`ErrorClass`] of their own in this crate (`io::Error`, `MetricsError`)
/// keep that class, so an I/O failure is `io::NotFound` whether it comes from
/// a collector or from measured work. Any other error is classed by its Rust
/// type path, as given by `std::any::type_name`.
pub struct CollectError {
    class: Cow<'static, str>,
    source: Box<dyn StdError + Send + Sync>,
}

impl CollectError {
    pub fn with_class(
        class: impl Into<Cow<'static, str>>,
        err: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            class: class.into(),
            source: err.into(),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn source(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.source.as_ref()
    }
}

impl<E> From<E> for CollectError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        let any: &dyn Any = &err;
        let class = if let Some(io) = any.downcast_ref::<std::io::Error>() {
            io.error_class()
        } else if let Some(metrics) = any.downcast_ref::<MetricsError>() {
            metrics.error_class()
        } else {
            Cow::Borrowed(std::any::type_name::<E>())
        };
        Self {
            class,
            source: Box::new(err),
        }
    }
}

impl fmt::Debug for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectError")
            .field("class", &self.class)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.source, self.class)
    }
}

impl ErrorClass for CollectError {
    fn error_class(&self) -> Cow<'static, str> {
        self.class.clone()
    }
}

type Computation = dyn Fn(&MetricDesc) -> std::result::Result<Collected, CollectError> + Send + Sync;

/// A metric whose values are computed on demand.
pub struct LazyCollector {
    desc: MetricDesc,
    computation: Box<Computation>,
    errors: Arc<Counter>,
    span: Span,
}

impl fmt::Debug for LazyCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyCollector").field("desc", &self.desc).finish_non_exhaustive()
    }
}

impl LazyCollector {
    pub fn builder(name: &str, help: &str) -> LazyCollectorBuilder {
        LazyCollectorBuilder {
            name: name.to_string(),
            help: help.to_string(),
            labels: Vec::new(),
            kind: MetricKind::Gauge,
            span: None,
        }
    }

    pub fn desc(&self) -> &MetricDesc {
        &self.desc
    }

    pub fn kind(&self) -> MetricKind {
        self.desc.kind()
    }

    /// The companion `<name>_collection_errors_total` counter.
    pub fn error_counter(&self) -> &Arc<Counter> {
        &self.errors
    }

    /// Run the computation once and return its values, or an empty map if
    /// anything went wrong.
    pub fn values(&self) -> ValueMap {
        let _entered = self.span.enter();
        let name = self.desc.name();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.computation)(&self.desc)));
        let collected = match outcome {
            Ok(Ok(collected)) => collected,
            Ok(Err(e)) => {
                tracing::error!(metric = %name, class = %e.class(), error = %e.source(), "exception in collection");
                self.count_error(e.class());
                return ValueMap::new();
            }
            Err(_) => {
                tracing::error!(metric = %name, class = PANIC, "collection panicked");
                self.count_error(PANIC);
                return ValueMap::new();
            }
        };

        let map = match collected {
            Collected::Values(map) => map,
            Collected::Unrecognised(what) => {
                tracing::error!(metric = %name, got = %what, "collector did not return a value map");
                self.count_error(NOT_A_MAP);
                return ValueMap::new();
            }
        };

        for labels in map.keys() {
            if let Err(e) = self.desc.labels().validate(labels) {
                tracing::error!(metric = %name, %labels, error = %e, "collector returned an invalid label set");
                self.count_error(INVALID_LABEL_SET);
                return ValueMap::new();
            }
        }

        tracing::trace!(metric = %name, series = map.len(), "collected");
        map
    }

    /// Value for `labels` in a fresh computation.
    ///
    /// An invalid label set is the caller's bug and is returned as an error;
    /// a valid one that the computation did not produce is `None`.
    pub fn get(&self, labels: &LabelSet) -> Result<Option<f64>> {
        self.desc.labels().validate(labels)?;
        Ok(self.values().get(labels).copied())
    }

    fn count_error(&self, class: &str) {
        if let Err(e) = self.errors.inc(&LabelSet::from([("class", class)])) {
            tracing::warn!(metric = %self.desc.name(), error = %e, "failed to count collection error");
        }
    }

    pub(crate) fn render(&self, out: &mut String) {
        let mut rows: Vec<(LabelSet, f64)> = self.values().into_iter().collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        // Plain samples cannot satisfy the histogram and summary layouts
        // (`_bucket`, `_sum`, `_count`), so those kinds are exposed untyped.
        let exposed_type = match self.kind() {
            MetricKind::Histogram | MetricKind::Summary => UNTYPED,
            kind => kind.as_str(),
        };
        self.desc.render_header_as(out, exposed_type);
        for (labels, v) in rows {
            render_sample(out, self.desc.name(), &labels, v);
        }
    }
}

/// Construction options for a `LazyCollector`.
pub struct LazyCollectorBuilder {
    name: String,
    help: String,
    labels: Vec<String>,
    kind: MetricKind,
    span: Option<Span>,
}

impl LazyCollectorBuilder {
    /// Labels every series must carry.
    pub fn labels(mut self, labels: &[&str]) -> Self {
        self.labels = labels.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Declared kind, `Gauge` unless set.
    pub fn kind(mut self, kind: MetricKind) -> Self {
        self.kind = kind;
        self
    }

    /// Span that collection diagnostics are logged in.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Register the collector and its error counter in `registry`.
    pub fn register<F>(self, registry: &Registry, computation: F) -> Result<Arc<LazyCollector>>
    where
        F: Fn(&MetricDesc) -> std::result::Result<Collected, CollectError> + Send + Sync + 'static,
    {
        let schema = LabelSchema::new(self.labels, self.kind.reserved_labels())?;
        let desc = MetricDesc::with_schema(self.kind, &self.name, &self.help, schema)?;

        if registry.get(desc.name()).is_some() {
            return Err(MetricsError::AlreadyRegistered(desc.name().to_string()));
        }

        let errors = registry.counter(
            &format!("{}_collection_errors_total", desc.name()),
            &format!("Errors encountered while collecting for {}", desc.name()),
            &["class"],
        )?;

        let span = self
            .span
            .unwrap_or_else(|| tracing::info_span!("lazy_collector", metric = %desc.name()));

        let collector = Arc::new(LazyCollector {
            desc,
            computation: Box::new(computation),
            errors,
            span,
        });
        registry.register_collector(Arc::clone(&collector))?;
        Ok(collector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn invalid_label_set_class_matches_error_kind() {
        assert_eq!(INVALID_LABEL_SET, ErrorKind::InvalidLabelSet.as_str());
    }
}
