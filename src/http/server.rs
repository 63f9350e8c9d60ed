//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the shared state and every component that hangs off it
//! - Create the Axum router (management, observers, inspector, proxy fallback)
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Run the capture broadcaster alongside the server
//! - Close observers and the tunnel on graceful shutdown

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::{ServeDir, ServeFile},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::capture::{capture_queue, CaptureBroadcaster, CaptureTransport};
use crate::config::InterceptorConfig;
use crate::http::handlers;
use crate::http::middleware::localhost_only;
use crate::http::websocket;
use crate::proxy::ProxyConfigurator;
use crate::state::SharedState;
use crate::tunnel::{TunnelError, TunnelSupervisor};

/// Inspector page paths and the asset each one serves.
const INSPECTOR_PAGES: [(&str, &str); 3] = [
    ("/inspector/configure", "landing/index.html"),
    ("/inspector/dashboard", "dashboard/index.html"),
    ("/inspector/analytics", "analytics/index.html"),
];

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,
    pub configurator: Arc<ProxyConfigurator>,
    pub supervisor: Arc<TunnelSupervisor>,
    pub config: Arc<InterceptorConfig>,
}

/// HTTP server for the interceptor.
pub struct HttpServer {
    router: Router,
    state: AppState,
    broadcaster: CaptureBroadcaster,
}

impl HttpServer {
    /// Create a server. `config.listener.port` must be the port actually bound,
    /// since the tunnel shares it.
    pub fn new(config: InterceptorConfig) -> Result<Self, TunnelError> {
        let shared = Arc::new(SharedState::new(
            config.listener.port,
            Duration::from_secs(config.observers.write_timeout_secs),
        ));

        let (queue, stream) = capture_queue(config.capture.queue_capacity, config.capture.overflow);
        let transport = CaptureTransport::new(queue, config.listener.max_body_bytes);
        let configurator = Arc::new(ProxyConfigurator::new(
            transport,
            Duration::from_secs(config.timeouts.probe_secs),
        ));
        let supervisor = Arc::new(TunnelSupervisor::new(config.tunnel.clone(), shared.clone())?);
        let broadcaster = CaptureBroadcaster::new(stream, shared.observers.clone());

        let state = AppState {
            shared,
            configurator,
            supervisor,
            config: Arc::new(config),
        };

        let router = Self::build_router(&state.config, state.clone());
        Ok(Self {
            router,
            state,
            broadcaster,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &InterceptorConfig, state: AppState) -> Router {
        Router::new()
            .route("/configure", post(handlers::configure))
            .route("/status", get(handlers::status))
            .route("/ws", get(websocket::ws_handler))
            .merge(inspector_routes(config.ui.static_dir.as_deref()))
            .merge(static_routes(config.ui.static_dir.as_deref()))
            .fallback(handlers::proxy)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn shared(&self) -> Arc<SharedState> {
        self.state.shared.clone()
    }

    pub fn supervisor(&self) -> Arc<TunnelSupervisor> {
        self.state.supervisor.clone()
    }

    /// Serve until `shutdown` fires, then close observers and the tunnel.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            configure_url = %format!("http://localhost:{}/inspector/configure", addr.port()),
            "HTTP server starting"
        );

        let broadcaster = tokio::spawn(self.broadcaster.run());
        let observers = self.state.shared.observers.clone();

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
                observers.close_all().await;
            })
            .await?;

        self.state.shared.health.stop();
        self.state.supervisor.shutdown().await;
        broadcaster.abort();

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Localhost-only inspector pages, with and without a trailing slash.
fn inspector_routes(static_dir: Option<&Path>) -> Router<AppState> {
    let mut router = Router::new();
    for (path, asset) in INSPECTOR_PAGES {
        let slashed = format!("{}/", path);
        router = match static_dir {
            Some(dir) => router
                .route_service(path, ServeFile::new(dir.join(asset)))
                .route_service(&slashed, ServeFile::new(dir.join(asset))),
            None => router
                .route(path, get(handlers::assets_missing))
                .route(&slashed, get(handlers::assets_missing)),
        };
    }
    router.layer(middleware::from_fn(localhost_only))
}

fn static_routes(static_dir: Option<&Path>) -> Router<AppState> {
    match static_dir {
        Some(dir) => Router::new().nest_service("/static", ServeDir::new(dir)),
        None => Router::new().route("/static/{*path}", get(handlers::assets_missing)),
    }
}
