//! scrapeline: scrape-time collectors, request instrumentation and series
//! eviction over a Prometheus-style registry.
//!
//! One dependency for applications: the primitives from `scrapeline-core`
//! are re-exported at the root, the HTTP exposition server under [`server`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use scrapeline::{Collected, LabelSet, LazyCollector, Registry};
//!
//! # async fn demo() -> scrapeline::Result<()> {
//! let registry = Arc::new(Registry::new());
//! LazyCollector::builder("queue_depth", "Jobs waiting")
//!     .register(&registry, |_| Ok(Collected::from([(LabelSet::new(), 3.0)])))?;
//!
//! let server = scrapeline::server::MetricsServer::new(&Default::default(), registry)?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub use scrapeline_core::*;

pub mod server {
    pub use scrapeline_server::*;
}
