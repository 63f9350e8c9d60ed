//! Startup orchestration.
//!
//! # Responsibilities
//! - Start the metrics exporter when enabled
//! - Bind the listener before anything learns the listen port
//! - Build the server and install signal handling
//! - Serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener is bound first so the tunnel shares the real port

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::InterceptorConfig;
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_handler;
use crate::observability::metrics;
use crate::tunnel::TunnelError;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("tunnel setup failed: {0}")]
    Tunnel(#[from] TunnelError),

    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}

/// Run the interceptor until a termination signal completes shutdown.
pub async fn run(mut config: InterceptorConfig) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let address = config.listener.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.clone(),
            source,
        })?;
    let local_addr = listener.local_addr().map_err(StartupError::Serve)?;
    config.listener.port = local_addr.port();

    tracing::info!(
        address = %local_addr,
        tunnel_enabled = config.tunnel.enabled,
        capture_overflow = ?config.capture.overflow,
        "Listening for connections"
    );

    let server = HttpServer::new(config)?;
    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_handler(server.supervisor(), shutdown.clone());

    server
        .run(listener, shutdown.subscribe())
        .await
        .map_err(StartupError::Serve)?;

    tracing::info!("Shutdown complete");
    Ok(())
}
