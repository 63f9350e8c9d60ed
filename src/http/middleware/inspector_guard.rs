//! Localhost-only guard for the inspector pages.
//!
//! The inspector can reconfigure the proxy, so it must not be reachable
//! through the public tunnel. Tunnel traffic arrives with the public host
//! name in `Host`, which is what this guard keys on.

use std::net::IpAddr;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

pub async fn localhost_only(req: Request<Body>, next: Next) -> Response {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().host())
        .unwrap_or_default();

    if is_loopback_host(host) {
        return next.run(req).await;
    }

    tracing::warn!(host = %host, path = %req.uri().path(), "Inspector request from non-local host");
    (
        StatusCode::FORBIDDEN,
        "Inspector is only accessible from localhost",
    )
        .into_response()
}

/// Whether a `Host` value (with optional port) names the local machine.
pub fn is_loopback_host(host: &str) -> bool {
    let host = host.trim();
    let name = if let Some(rest) = host.strip_prefix('[') {
        // [v6]:port
        rest.split(']').next().unwrap_or_default()
    } else if host.matches(':').count() > 1 {
        // bare v6
        host
    } else {
        host.split(':').next().unwrap_or_default()
    };

    if name.eq_ignore_ascii_case("localhost") {
        return true;
    }
    name.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false)
}
