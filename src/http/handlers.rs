//! Management and proxy handlers.
//!
//! # Endpoints
//! - `POST /configure`: switch the proxy to a new backend and restart the tunnel
//! - `GET /status`: backend health, backend URL and public URL
//! - fallback: forward to the configured backend, 503 until one is set

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, Form, FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::health::LivenessMonitor;
use crate::http::server::AppState;
use crate::proxy::{parse_port, ConfigureError, BACKEND_HOST};
use crate::tunnel::{ReservedToken, TokenOrigin, TunnelMode};

/// Fields of the configure form.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigureForm {
    pub port: Option<String>,
    pub zrok_option: Option<String>,
    pub zrok_token: Option<String>,
    pub zrok_port: Option<String>,
}

// The inspector page submits multipart; scripts usually send urlencoded.
impl<S> FromRequest<S> for ConfigureForm
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if !multipart {
            let Form(form) = Form::<ConfigureForm>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            return Ok(form);
        }

        let mut fields = Multipart::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;
        let mut form = ConfigureForm::default();
        while let Some(field) = fields.next_field().await.map_err(IntoResponse::into_response)? {
            let name = field.name().unwrap_or_default().to_string();
            let value = field.text().await.map_err(IntoResponse::into_response)?;
            match name.as_str() {
                "port" => form.port = Some(value),
                "zrok_option" => form.zrok_option = Some(value),
                "zrok_token" => form.zrok_token = Some(value),
                "zrok_port" => form.zrok_port = Some(value),
                _ => {}
            }
        }
        Ok(form)
    }
}

/// Configure the backend, then restart monitoring and the tunnel.
///
/// Everything between the probe and the tunnel restart runs under the
/// reconfiguration lock, so token reservation and release never interleave
/// with another configure request.
pub async fn configure(
    State(state): State<AppState>,
    form: ConfigureForm,
) -> Result<Redirect, ConfigureError> {
    let port = parse_port(form.port.as_deref())?;
    let mode = TunnelMode::from_form(
        form.zrok_option.as_deref(),
        form.zrok_token.as_deref(),
        form.zrok_port.as_deref(),
    )
    .map_err(ConfigureError::InvalidInput)?;

    let _guard = state.shared.begin_reconfigure().await;
    if state.supervisor.is_shut_down() {
        return Err(ConfigureError::ShuttingDown);
    }

    let config = state.configurator.configure(port).await?;

    let listen_port = state.shared.listen_port();
    let tunnel_enabled = state.config.tunnel.enabled;
    let previous_token = state
        .shared
        .current()
        .and_then(|active| active.tunnel_token.clone());

    let (token, public_url) = if tunnel_enabled {
        resolve_token(&state, &mode, listen_port, previous_token.as_ref()).await
    } else {
        (None, None)
    };

    let config = config.with_tunnel(token.clone(), public_url, listen_port);
    let tunnel_port = config.tunnel_port;
    state.shared.install(config);
    tracing::info!(backend_port = port, tunnel_port, mode = ?mode, "Proxy configured");

    LivenessMonitor::spawn(
        state.shared.clone(),
        BACKEND_HOST,
        port,
        Duration::from_secs(state.config.health.interval_secs),
        state.configurator.probe_timeout(),
    );

    if tunnel_enabled {
        state.supervisor.start_session(tunnel_port, token.as_ref()).await;
    }

    if let Some(old) = previous_token {
        if token.as_ref() != Some(&old) {
            state.supervisor.release(&old).await;
        }
    }

    Ok(Redirect::to("/inspector/dashboard"))
}

async fn resolve_token(
    state: &AppState,
    mode: &TunnelMode,
    listen_port: u16,
    previous: Option<&ReservedToken>,
) -> (Option<ReservedToken>, Option<String>) {
    match mode {
        TunnelMode::Public => (None, None),
        TunnelMode::Custom { token, port } => (
            Some(ReservedToken {
                token: token.clone(),
                port: *port,
                origin: TokenOrigin::Operator,
            }),
            None,
        ),
        TunnelMode::Reserved => {
            if let Some(prev) = previous.filter(|t| t.is_owned() && t.port == listen_port) {
                tracing::info!(token = %prev.token, "Reusing reserved tunnel token");
                let url = state.shared.current().and_then(|c| c.public_url.clone());
                return (Some(prev.clone()), url);
            }
            match state.supervisor.reserve(listen_port).await {
                Ok((token, url)) => (Some(token), Some(url)),
                Err(e) => {
                    tracing::warn!(error = %e, "Token reservation failed, using an ad-hoc share");
                    (None, None)
                }
            }
        }
    }
}

/// Body of `GET /status`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    #[serde(rename = "serverStatus")]
    pub server_status: String,
    #[serde(rename = "localhostURL")]
    pub localhost_url: String,
    #[serde(rename = "zrokURL")]
    pub zrok_url: String,
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let server_status = state.shared.health.status().to_string();
    let localhost_url = match state.shared.current() {
        Some(active) => active.localhost_url().to_string(),
        None => format!("http://localhost:{}", state.shared.listen_port()),
    };
    let zrok_url = state.shared.tunnel.status().to_string();

    Json(StatusResponse {
        server_status,
        localhost_url,
        zrok_url,
    })
}

/// Forward anything unmatched to the active backend.
pub async fn proxy(
    State(state): State<AppState>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    match state.shared.current() {
        Some(active) => active.proxy.serve(request, client_addr).await,
        None => (StatusCode::SERVICE_UNAVAILABLE, "Proxy not configured").into_response(),
    }
}

pub async fn assets_missing() -> Response {
    (StatusCode::NOT_FOUND, "Inspector assets are not configured").into_response()
}
