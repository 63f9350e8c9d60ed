//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT or SIGTERM
//! - Stop the tunnel and release tokens before the server winds down
//! - Exit immediately on a second signal
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Tunnel shutdown is idempotent, so the server's own shutdown path may
//!   run it again safely

use std::sync::Arc;

use crate::lifecycle::shutdown::Shutdown;
use crate::tunnel::TunnelSupervisor;

/// Exit status for a forced exit after repeated interrupts.
const FORCED_EXIT_CODE: i32 = 130;

/// Resolve on the next SIGINT or SIGTERM.
pub async fn wait_for_termination() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Spawn the signal task: first signal stops the tunnel and triggers
/// graceful shutdown, a second one exits the process.
pub fn spawn_signal_handler(supervisor: Arc<TunnelSupervisor>, shutdown: Arc<Shutdown>) {
    tokio::spawn(async move {
        wait_for_termination().await;
        tracing::info!("Termination signal received, cleaning up");

        tokio::spawn(async move {
            supervisor.shutdown().await;
            shutdown.trigger();
        });

        wait_for_termination().await;
        tracing::warn!("Second termination signal, exiting immediately");
        std::process::exit(FORCED_EXIT_CODE);
    });
}
