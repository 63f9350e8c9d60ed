//! Single-backend reverse proxy.
//!
//! # Responsibilities
//! - Rewrite the request URI and Host header to the backend authority
//! - Strip hop-by-hop headers in both directions
//! - Append the client address to X-Forwarded-For
//! - Hand the request to the capture transport and map its failures
//!
//! # Design Decisions
//! - No retries: a retried call would produce a second capture for one client request
//! - Upstream failures become 502 and never surface transport internals to the client

use std::net::{IpAddr, SocketAddr};

use axum::body::Body;
use axum::http::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    uri::{Authority, PathAndQuery, Scheme},
    Request, Response, StatusCode, Uri, Version,
};
use axum::response::IntoResponse;

use crate::capture::{CaptureError, CaptureTransport};

/// Headers that describe a single transport hop and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Reverse proxy bound to one backend authority.
#[derive(Clone)]
pub struct ReverseProxy {
    authority: Authority,
    transport: CaptureTransport,
}

impl ReverseProxy {
    pub fn new(authority: Authority, transport: CaptureTransport) -> Self {
        Self {
            authority,
            transport,
        }
    }

    /// Forward `request` to the backend and return its response.
    pub async fn serve(&self, request: Request<Body>, client_addr: SocketAddr) -> Response<Body> {
        let (mut parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        let uri = match Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
        {
            Ok(uri) => uri,
            Err(e) => {
                tracing::warn!(error = %e, "Could not build backend URI");
                return (StatusCode::BAD_REQUEST, "Invalid request URI").into_response();
            }
        };

        parts.uri = uri;
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);
        append_forwarded_for(&mut parts.headers, client_addr.ip());
        if let Ok(host) = HeaderValue::from_str(self.authority.as_str()) {
            parts.headers.insert(header::HOST, host);
        }

        let method = parts.method.clone();
        let path = parts.uri.path().to_string();

        match self
            .transport
            .round_trip(Request::from_parts(parts, body), client_addr)
            .await
        {
            Ok(mut response) => {
                strip_hop_by_hop(response.headers_mut());
                response
            }
            Err(CaptureError::RequestBody(e)) => {
                tracing::warn!(method = %method, path = %path, error = %e, "Rejected request body");
                (StatusCode::BAD_REQUEST, "Failed to read request body").into_response()
            }
            Err(e) => {
                tracing::error!(
                    method = %method,
                    path = %path,
                    backend = %self.authority,
                    error = %e,
                    "Upstream error"
                );
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
        }
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Append `client` to X-Forwarded-For, keeping any earlier hops.
pub fn append_forwarded_for(headers: &mut HeaderMap, client: IpAddr) {
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.trim().is_empty() => format!("{}, {}", prior, client),
        _ => client.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
