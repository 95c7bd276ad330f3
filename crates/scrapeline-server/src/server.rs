//! Metrics server lifecycle.
//!
//! `run` binds the listener, spawns the axum server and returns once the
//! socket is accepting connections. `shutdown` signals a graceful stop and
//! waits for in-flight responses to finish.

use std::net::SocketAddr;
use std::sync::Arc;

use scrapeline_core::{MetricsError, Registry, Result};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::app_state::AppState;
use crate::config::ServerConfig;
use crate::router;

pub struct MetricsServer {
    listen: SocketAddr,
    state: AppState,
    running: Mutex<Option<Running>>,
}

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl MetricsServer {
    /// Prepare a server exposing `registry`.
    ///
    /// The server's own request metrics are registered in `registry` here,
    /// so a name clash fails construction rather than `run`.
    pub fn new(cfg: &ServerConfig, registry: Arc<Registry>) -> Result<Self> {
        cfg.validate()?;
        let listen = cfg.server.listen_addr()?;
        let state = AppState::new(&cfg.server, registry)?;
        Ok(Self {
            listen,
            state,
            running: Mutex::new(None),
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.state.registry()
    }

    /// Address the server is bound to, if running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.addr)
    }

    pub async fn run(&self) -> Result<SocketAddr> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(MetricsError::AlreadyRunning);
        }

        let listener = TcpListener::bind(self.listen).await?;
        let addr = listener.local_addr()?;
        let app = router::build_router(self.state.clone());
        let (stop, stopped) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let shutdown = async {
                // A dropped sender stops the server as well.
                let _ = stopped.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(%addr, error = %e, "metrics server failed");
            }
        });

        tracing::info!(%addr, "metrics server listening");
        *running = Some(Running { addr, stop, task });
        Ok(addr)
    }

    /// Stop the server. Does nothing when it is not running.
    pub async fn shutdown(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        let _ = running.stop.send(());
        if let Err(e) = running.task.await {
            tracing::warn!(addr = %running.addr, error = %e, "metrics server task ended abnormally");
        }
        tracing::info!(addr = %running.addr, "metrics server stopped");
    }
}
