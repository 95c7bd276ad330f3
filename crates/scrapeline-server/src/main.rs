//! scrapeline metrics server.
//!
//! Usage: `scrapeline-server [config.yaml]` (defaults to `scrapeline.yaml`).
//! Serves `/metrics` until Ctrl+C or SIGTERM.

use std::process::ExitCode;
use std::sync::Arc;

use scrapeline_core::Registry;
use tracing_subscriber::{fmt, EnvFilter};

use scrapeline_server::{config, process, MetricsServer};

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, kind = e.kind().as_str(), "scrapeline-server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> scrapeline_core::Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "scrapeline.yaml".into());
    let cfg = config::load_from_file(&path)?;

    let registry = Arc::new(Registry::new());
    process::register(&registry, &cfg.process)?;

    let server = MetricsServer::new(&cfg, registry)?;
    let addr = server.run().await?;
    tracing::info!(%addr, config = %path, "scrapeline-server started");

    shutdown_signal().await;
    server.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("signal received, starting graceful shutdown");
}
