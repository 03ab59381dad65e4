use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};

use relaytv_api::{create_router, AppState};
use relaytv_core::Config;

/// HTTP server hosting the gateway routes
pub struct RelayServer {
    config: Config,
}

impl RelayServer {
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        let address = self.config.http_address();
        let state = AppState::new(self.config)?;
        let router = create_router(state);

        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind HTTP listener on {address}"))?;
        info!("HTTP server listening on {}", address);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;

        info!("HTTP server shut down gracefully");
        Ok(())
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
