//! Request instrumentation.
//!
//! `Request` brackets a unit of work with four metrics, all registered at
//! construction under the given name:
//!
//! - `<name>_requests_total`: attempts (counter, base labels)
//! - `<name>_exceptions_total`: failures (counter, base labels + `class`)
//! - `<name>_request_duration_seconds`: successful durations (histogram,
//!   duration labels)
//! - `<name>_in_progress_count`: calls currently running (gauge, base labels)
//!
//! The in-progress gauge is held by a drop guard, so it comes back down on
//! every exit path: success, error, panic, or a dropped future. A call
//! records either one duration observation or one failure, never both.
//! Work that succeeds but leaves duration labels outside the schema counts
//! as a failure with class `InvalidLabelSet`.
//!
//! No lock is held while the work runs. Work that never returns leaves its
//! in-progress count raised; timeouts belong to the caller.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::collected::PANIC;
use crate::error::{ErrorClass, MetricsError, Result};
use crate::labels::{LabelSchema, LabelSet};
use crate::metrics::{Counter, Gauge, Histogram};
use crate::registry::Registry;

/// Error returned by a measured call.
#[derive(Debug, Error)]
pub enum MeasureError<E> {
    /// The call was misused: no work, or labels outside the schema.
    #[error(transparent)]
    Usage(#[from] MetricsError),
    /// The work itself failed; the error is passed through unchanged.
    #[error("{0}")]
    Work(E),
}

impl<E> MeasureError<E> {
    pub fn is_usage(&self) -> bool {
        matches!(self, MeasureError::Usage(_))
    }

    pub fn into_work_error(self) -> Option<E> {
        match self {
            MeasureError::Work(e) => Some(e),
            MeasureError::Usage(_) => None,
        }
    }
}

/// Labels for the duration observation of one call.
///
/// Starts out as the call's base labels. The work may read them and set
/// overrides; on success the overrides are laid over the base labels, last
/// write wins. Each call owns its own value.
#[derive(Debug, Clone)]
pub struct DurationLabels {
    base: LabelSet,
    overrides: LabelSet,
}

impl DurationLabels {
    fn new(base: LabelSet) -> Self {
        Self {
            base,
            overrides: LabelSet::new(),
        }
    }

    pub fn base(&self) -> &LabelSet {
        &self.base
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.overrides.get(name).or_else(|| self.base.get(name))
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.overrides.insert(name, value);
        self
    }

    /// Base labels with the overrides applied.
    pub fn resolve(self) -> LabelSet {
        let mut labels = self.base;
        labels.merge(self.overrides);
        labels
    }
}

/// Accounting for one logical operation.
#[derive(Debug)]
pub struct Request {
    name: String,
    labels: LabelSchema,
    requests: Arc<Counter>,
    exceptions: Arc<Counter>,
    durations: Arc<Histogram>,
    in_progress: Arc<Gauge>,
}

impl Request {
    /// Register the four metrics for `name` in `registry`.
    ///
    /// `duration_labels` defaults to `labels` and must include all of them.
    pub fn new(
        name: &str,
        registry: &Registry,
        labels: &[&str],
        duration_labels: Option<&[&str]>,
    ) -> Result<Self> {
        let schema = LabelSchema::new(labels.iter().copied(), &[])?;
        let duration_labels = duration_labels.unwrap_or(labels);
        if let Some(missing) = labels.iter().find(|l| !duration_labels.contains(l)) {
            return Err(MetricsError::BadConfig(format!(
                "{name}: duration labels must include base label {missing:?}"
            )));
        }

        let mut exception_labels = labels.to_vec();
        exception_labels.push("class");

        let requests = registry.counter(
            &format!("{name}_requests_total"),
            &format!("Number of {name} requests"),
            labels,
        )?;
        let exceptions = registry.counter(
            &format!("{name}_exceptions_total"),
            &format!("Number of exceptions while handling {name} requests"),
            &exception_labels,
        )?;
        let durations = registry.histogram(
            &format!("{name}_request_duration_seconds"),
            &format!("Time taken by successful {name} requests"),
            duration_labels,
        )?;
        let in_progress = registry.gauge(
            &format!("{name}_in_progress_count"),
            &format!("Number of {name} requests currently in progress"),
            labels,
        )?;

        Ok(Self {
            name: name.to_string(),
            labels: schema,
            requests,
            exceptions,
            durations,
            in_progress,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn requests_total(&self) -> &Arc<Counter> {
        &self.requests
    }
    pub fn exceptions_total(&self) -> &Arc<Counter> {
        &self.exceptions
    }
    pub fn duration_histogram(&self) -> &Arc<Histogram> {
        &self.durations
    }
    pub fn in_progress(&self) -> &Arc<Gauge> {
        &self.in_progress
    }

    /// Run `work` inside the accounting bracket.
    ///
    /// `None` is a usage error and touches no metric. On success the work's
    /// value is returned; on failure the failure is counted under its class
    /// and returned unchanged as `MeasureError::Work`.
    pub fn measure<W, T, E>(&self, labels: &LabelSet, work: Option<W>) -> std::result::Result<T, MeasureError<E>>
    where
        W: FnOnce(&mut DurationLabels) -> std::result::Result<T, E>,
        E: ErrorClass,
    {
        let work = work.ok_or(MetricsError::MissingWork)?;
        let guard = self.enter(labels)?;
        let mut duration_labels = DurationLabels::new(labels.clone());
        let result = work(&mut duration_labels);
        guard.finish(result, duration_labels)
    }

    /// `measure` with the work given directly.
    pub fn time<W, T, E>(&self, labels: &LabelSet, work: W) -> std::result::Result<T, MeasureError<E>>
    where
        W: FnOnce(&mut DurationLabels) -> std::result::Result<T, E>,
        E: ErrorClass,
    {
        self.measure(labels, Some(work))
    }

    /// Async variant of `measure`.
    ///
    /// The duration labels are handed to the work and handed back with its
    /// result. Dropping the future before it completes releases the
    /// in-progress count without recording a duration or a failure.
    pub async fn measure_async<F, Fut, T, E>(
        &self,
        labels: &LabelSet,
        work: F,
    ) -> std::result::Result<T, MeasureError<E>>
    where
        F: FnOnce(DurationLabels) -> Fut,
        Fut: Future<Output = (DurationLabels, std::result::Result<T, E>)>,
        E: ErrorClass,
    {
        let guard = self.enter(labels)?;
        let (duration_labels, result) = work(DurationLabels::new(labels.clone())).await;
        guard.finish(result, duration_labels)
    }

    fn enter<'a>(&'a self, labels: &'a LabelSet) -> Result<InFlight<'a>> {
        self.labels.validate(labels)?;
        self.requests.inc(labels)?;
        self.in_progress.inc(labels)?;
        Ok(InFlight {
            request: self,
            labels,
            started: Instant::now(),
            settled: false,
        })
    }

    fn count_exception(&self, labels: &LabelSet, class: Cow<'_, str>) {
        let labels = labels.clone().with("class", class);
        if let Err(e) = self.exceptions.inc(&labels) {
            tracing::warn!(request = %self.name, error = %e, "failed to count exception");
        }
    }
}

/// Holds one unit of the in-progress gauge until dropped.
struct InFlight<'a> {
    request: &'a Request,
    labels: &'a LabelSet,
    started: Instant,
    settled: bool,
}

impl InFlight<'_> {
    fn finish<T, E: ErrorClass>(
        mut self,
        result: std::result::Result<T, E>,
        duration_labels: DurationLabels,
    ) -> std::result::Result<T, MeasureError<E>> {
        self.settled = true;
        let request = self.request;
        match result {
            Ok(value) => {
                let labels = duration_labels.resolve();
                let elapsed = self.started.elapsed();
                if let Err(e) = request.durations.observe_duration(&labels, elapsed) {
                    tracing::error!(request = %request.name, %labels, error = %e, "work left an invalid duration label set");
                    request.count_exception(self.labels, e.error_class());
                    return Err(MeasureError::Usage(e));
                }
                Ok(value)
            }
            Err(e) => {
                let class = e.error_class();
                tracing::debug!(request = %request.name, labels = %self.labels, class = %class, "measured work failed");
                request.count_exception(self.labels, class);
                Err(MeasureError::Work(e))
            }
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            if std::thread::panicking() {
                self.request.count_exception(self.labels, Cow::Borrowed(PANIC));
            } else {
                tracing::debug!(request = %self.request.name, labels = %self.labels, "measured work dropped before completion");
            }
        }
        if let Err(e) = self.request.in_progress.dec(self.labels) {
            tracing::warn!(request = %self.request.name, error = %e, "failed to release in-progress count");
        }
    }
}
