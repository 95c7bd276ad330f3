//! scrapeline server library entry.
//!
//! Exposes a [`scrapeline_core::Registry`] over HTTP in the Prometheus text
//! format, instruments its own routes with a request instrumentor, and
//! registers the standard process collectors. Consumed by the binary
//! (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod ops;
pub mod process;
pub mod router;
pub mod server;

pub use server::MetricsServer;
