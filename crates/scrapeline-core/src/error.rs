//! Shared error type across scrapeline crates.

use std::borrow::Cow;

use thiserror::Error;

/// Stable error codes, usable as metric label values and in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Metric name does not follow the naming rules.
    InvalidMetricName,
    /// Empty help text.
    InvalidHelp,
    /// Declared label name does not follow the naming rules.
    InvalidLabelName,
    /// Declared label name is reserved for the metric kind.
    ReservedLabel,
    /// Observed label set does not match the declared labels.
    InvalidLabelSet,
    /// Value not acceptable for the metric (e.g. negative counter increment).
    InvalidValue,
    /// Metric kind string not recognised.
    UnknownMetricKind,
    /// Metric kind not available for this kind of registration.
    UnsupportedKind,
    /// Name already taken in the registry.
    AlreadyRegistered,
    /// Bracketed call without a unit of work.
    MissingWork,
    /// Server already running.
    AlreadyRunning,
    /// Configuration rejected.
    BadConfig,
    /// I/O failure.
    Io,
}

impl ErrorKind {
    /// String representation used as the `class` label value.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidMetricName => "InvalidMetricName",
            ErrorKind::InvalidHelp => "InvalidHelp",
            ErrorKind::InvalidLabelName => "InvalidLabelName",
            ErrorKind::ReservedLabel => "ReservedLabel",
            ErrorKind::InvalidLabelSet => "InvalidLabelSet",
            ErrorKind::InvalidValue => "InvalidValue",
            ErrorKind::UnknownMetricKind => "UnknownMetricKind",
            ErrorKind::UnsupportedKind => "UnsupportedKind",
            ErrorKind::AlreadyRegistered => "AlreadyRegistered",
            ErrorKind::MissingWork => "MissingWork",
            ErrorKind::AlreadyRunning => "AlreadyRunning",
            ErrorKind::BadConfig => "BadConfig",
            ErrorKind::Io => "Io",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Unified error type used by core and server.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid metric name: {0:?}")]
    InvalidMetricName(String),
    #[error("help text must not be empty (metric {0})")]
    InvalidHelp(String),
    #[error("invalid label name: {0:?}")]
    InvalidLabelName(String),
    #[error("label name is reserved: {0}")]
    ReservedLabel(String),
    #[error("invalid label set: {0}")]
    InvalidLabelSet(String),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: String, value: f64 },
    #[error("unknown metric kind: {0:?} (expected gauge, counter, histogram or summary)")]
    UnknownMetricKind(String),
    #[error("unsupported metric kind for {name}: {kind}")]
    UnsupportedKind { name: String, kind: &'static str },
    #[error("metric already registered: {0}")]
    AlreadyRegistered(String),
    #[error("no unit of work given to measure")]
    MissingWork,
    #[error("server is already running")]
    AlreadyRunning,
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl MetricsError {
    /// Map to a stable error code.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MetricsError::InvalidMetricName(_) => ErrorKind::InvalidMetricName,
            MetricsError::InvalidHelp(_) => ErrorKind::InvalidHelp,
            MetricsError::InvalidLabelName(_) => ErrorKind::InvalidLabelName,
            MetricsError::ReservedLabel(_) => ErrorKind::ReservedLabel,
            MetricsError::InvalidLabelSet(_) => ErrorKind::InvalidLabelSet,
            MetricsError::InvalidValue { .. } => ErrorKind::InvalidValue,
            MetricsError::UnknownMetricKind(_) => ErrorKind::UnknownMetricKind,
            MetricsError::UnsupportedKind { .. } => ErrorKind::UnsupportedKind,
            MetricsError::AlreadyRegistered(_) => ErrorKind::AlreadyRegistered,
            MetricsError::MissingWork => ErrorKind::MissingWork,
            MetricsError::AlreadyRunning => ErrorKind::AlreadyRunning,
            MetricsError::BadConfig(_) => ErrorKind::BadConfig,
            MetricsError::Io(_) => ErrorKind::Io,
        }
    }
}

/// Failure classification used for the `class` label on error counters.
pub trait ErrorClass {
    fn error_class(&self) -> Cow<'static, str>;
}

impl ErrorClass for MetricsError {
    fn error_class(&self) -> Cow<'static, str> {
        Cow::Borrowed(self.kind().as_str())
    }
}

impl ErrorClass for std::io::Error {
    fn error_class(&self) -> Cow<'static, str> {
        Cow::Owned(format!("io::{:?}", self.kind()))
    }
}

impl ErrorClass for std::convert::Infallible {
    fn error_class(&self) -> Cow<'static, str> {
        match *self {}
    }
}
