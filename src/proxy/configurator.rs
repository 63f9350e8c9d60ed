//! Reverse proxy configurator.
//!
//! # Responsibilities
//! - Validate the operator-supplied backend port
//! - Dial the backend before accepting it
//! - Build a proxy instance bound to the capture transport
//!
//! # Design Decisions
//! - Configuring never touches shared state; the caller installs the result
//! - A failed probe leaves whatever configuration was active untouched

use std::io;
use std::time::Duration;

use axum::http::{uri::Authority, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use url::Url;

use crate::capture::CaptureTransport;
use crate::net::probe_tcp;
use crate::proxy::forward::ReverseProxy;
use crate::tunnel::ReservedToken;

/// Host every backend is reached on.
pub const BACKEND_HOST: &str = "localhost";

/// Errors from a configuration request.
#[derive(Debug, Error)]
pub enum ConfigureError {
    /// Malformed input; nothing was changed.
    #[error("{0}")]
    InvalidInput(String),

    /// The reachability probe failed.
    #[error("Backend server on port {port} is not reachable: {cause}")]
    BackendUnreachable {
        port: u16,
        #[source]
        cause: io::Error,
    },

    /// Shutdown has begun; no new configuration is accepted.
    #[error("Interceptor is shutting down")]
    ShuttingDown,
}

impl IntoResponse for ConfigureError {
    fn into_response(self) -> Response {
        let status = match self {
            ConfigureError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

/// Parse a backend port from a form value.
pub fn parse_port(raw: Option<&str>) -> Result<u16, ConfigureError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(ConfigureError::InvalidInput("Port is required".to_string()));
    }
    match raw.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ConfigureError::InvalidInput(format!("Invalid port: {}", raw))),
    }
}

/// The active proxy target plus the tunnel attached to it.
pub struct ProxyConfiguration {
    pub backend_url: Url,
    pub proxy: ReverseProxy,
    pub backend_port: u16,
    pub tunnel_token: Option<ReservedToken>,
    /// Frontend endpoint announced when the token was reserved.
    pub public_url: Option<String>,
    /// Local port the tunnel shares; the interceptor's own listener.
    pub tunnel_port: u16,
}

impl ProxyConfiguration {
    pub fn with_tunnel(
        mut self,
        token: Option<ReservedToken>,
        public_url: Option<String>,
        tunnel_port: u16,
    ) -> Self {
        self.tunnel_token = token;
        self.public_url = public_url;
        self.tunnel_port = tunnel_port;
        self
    }

    /// Backend base URL as shown to the operator, without the trailing slash.
    pub fn localhost_url(&self) -> &str {
        self.backend_url.as_str().trim_end_matches('/')
    }
}

impl std::fmt::Debug for ProxyConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfiguration")
            .field("backend_url", &self.backend_url.as_str())
            .field("backend_port", &self.backend_port)
            .field("tunnel_token", &self.tunnel_token)
            .field("public_url", &self.public_url)
            .field("tunnel_port", &self.tunnel_port)
            .finish()
    }
}

pub struct ProxyConfigurator {
    transport: CaptureTransport,
    probe_timeout: Duration,
}

impl ProxyConfigurator {
    pub fn new(transport: CaptureTransport, probe_timeout: Duration) -> Self {
        Self {
            transport,
            probe_timeout,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Probe `port` and build a configuration for it.
    pub async fn configure(&self, port: u16) -> Result<ProxyConfiguration, ConfigureError> {
        let authority: Authority = format!("{}:{}", BACKEND_HOST, port)
            .parse()
            .map_err(|e| ConfigureError::InvalidInput(format!("Invalid port: {}", e)))?;
        let backend_url = Url::parse(&format!("http://{}", authority))
            .map_err(|e| ConfigureError::InvalidInput(format!("Invalid port: {}", e)))?;

        probe_tcp(BACKEND_HOST, port, self.probe_timeout)
            .await
            .map_err(|cause| ConfigureError::BackendUnreachable { port, cause })?;

        tracing::info!(backend = %backend_url, "Backend reachable");

        Ok(ProxyConfiguration {
            backend_url,
            proxy: ReverseProxy::new(authority, self.transport.clone()),
            backend_port: port,
            tunnel_token: None,
            public_url: None,
            tunnel_port: 0,
        })
    }
}
