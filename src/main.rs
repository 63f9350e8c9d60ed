//! API interceptor.
//!
//! A local reverse proxy that records every request/response pair passing
//! through it, streams the captures to websocket observers, and can expose
//! the proxied service through a public tunnel.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!                      │                  INTERCEPTOR                      │
//!   Client request     │  ┌────────┐   ┌─────────┐   ┌──────────────────┐ │
//!   ───────────────────┼─▶│  http  │──▶│  proxy  │──▶│ capture transport│─┼──▶ Backend
//!                      │  │ server │   │ forward │   └────────┬─────────┘ │
//!                      │  └───┬────┘   └─────────┘            │ queue     │
//!                      │      │ /ws                           ▼           │
//!   Observers          │  ┌───┴──────────┐            ┌──────────────┐    │
//!   ◀──────────────────┼──│   observer   │◀───────────│  broadcaster │    │
//!                      │  │   gateway    │            └──────────────┘    │
//!                      │  └──────────────┘                                 │
//!                      │  ┌────────┐ ┌────────┐ ┌──────────┐ ┌──────────┐ │
//!                      │  │ config │ │ health │ │  tunnel  │ │lifecycle │ │
//!                      │  └────────┘ └────────┘ └──────────┘ └──────────┘ │
//!                      └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use api_interceptor::config::load_config;
use api_interceptor::lifecycle;
use api_interceptor::observability::logging::init_tracing;

#[derive(Parser)]
#[command(name = "api-interceptor")]
#[command(version, about = "Capture and inspect the traffic of a local API", long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interceptor
    Serve {
        /// Port to listen on (overrides API_INTERCEPTOR_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to a TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, config } => {
            let config = match load_config(config.as_deref(), port) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            };

            init_tracing(&config.observability);
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-interceptor starting");

            if let Err(e) = lifecycle::run(config).await {
                tracing::error!(error = %e, "Interceptor failed");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
    }
}
