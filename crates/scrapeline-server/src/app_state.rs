//! Shared application state for the metrics server.
//!
//! Holds the registry being exposed and the instrumentor that measures the
//! server's own HTTP traffic. Startup errors surface as `Result`.

use std::sync::Arc;

use scrapeline_core::{Registry, Request, Result};

use crate::config::ServerSection;

/// Labels carried by every request metric.
pub const HTTP_LABELS: &[&str] = &["method", "path"];
/// Labels carried by the request duration histogram.
pub const HTTP_DURATION_LABELS: &[&str] = &["method", "path", "code"];

#[derive(Clone)]
pub struct AppState {
    registry: Arc<Registry>,
    http: Arc<Request>,
}

impl AppState {
    /// Register `<metrics_prefix>_http` request metrics in `registry`.
    pub fn new(cfg: &ServerSection, registry: Arc<Registry>) -> Result<Self> {
        let http = Request::new(
            &format!("{}_http", cfg.metrics_prefix),
            &registry,
            HTTP_LABELS,
            Some(HTTP_DURATION_LABELS),
        )?;

        Ok(Self {
            registry,
            http: Arc::new(http),
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn http(&self) -> &Request {
        &self.http
    }
}
