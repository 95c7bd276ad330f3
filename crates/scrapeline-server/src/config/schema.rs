use std::net::SocketAddr;

use serde::Deserialize;
use scrapeline_core::labels::is_valid_metric_name;
use scrapeline_core::{MetricsError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub process: ProcessSection,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: 1,
            server: ServerSection::default(),
            process: ProcessSection::default(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MetricsError::BadConfig(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.server.validate()?;
        self.process.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Prefix of the server's own request metrics.
    #[serde(default = "default_metrics_prefix")]
    pub metrics_prefix: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            metrics_prefix: default_metrics_prefix(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        if self.listen.parse::<SocketAddr>().is_err() {
            return Err(MetricsError::BadConfig(format!(
                "server.listen must be a socket address, got {:?}",
                self.listen
            )));
        }
        if !is_valid_metric_name(&self.metrics_prefix) {
            return Err(MetricsError::BadConfig(format!(
                "server.metrics_prefix is not a valid metric name: {:?}",
                self.metrics_prefix
            )));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|e| MetricsError::BadConfig(format!("server.listen: {e}")))
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_metrics_prefix() -> String {
    "scrapeline_server".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessSection {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_proc_root")]
    pub proc_root: String,

    #[serde(default = "default_clock_ticks")]
    pub clock_ticks_per_second: u64,

    #[serde(default = "default_page_size")]
    pub page_size_bytes: u64,
}

impl Default for ProcessSection {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            proc_root: default_proc_root(),
            clock_ticks_per_second: default_clock_ticks(),
            page_size_bytes: default_page_size(),
        }
    }
}

impl ProcessSection {
    pub fn validate(&self) -> Result<()> {
        if self.clock_ticks_per_second == 0 {
            return Err(MetricsError::BadConfig(
                "process.clock_ticks_per_second must be positive".into(),
            ));
        }
        if !self.page_size_bytes.is_power_of_two() {
            return Err(MetricsError::BadConfig(
                "process.page_size_bytes must be a power of two".into(),
            ));
        }
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}
fn default_proc_root() -> String {
    "/proc".into()
}
fn default_clock_ticks() -> u64 {
    100
}
fn default_page_size() -> u64 {
    4096
}
