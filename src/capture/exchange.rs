//! Captured request/response pairs.
//!
//! The serialized form is what observers receive over `/ws`:
//! `{"request": {...}, "response": {...}}` with snake_case fields.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::http::{header, request, response, HeaderMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request half of a capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Correlation ID shared with the response.
    pub id: Uuid,
    pub method: String,
    /// Outbound URL as sent to the backend.
    pub url: String,
    /// First value of every header.
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub client_ip: String,
    pub user_agent: String,
}

impl RequestRecord {
    /// Snapshot an outbound request.
    pub fn capture(id: Uuid, parts: &request::Parts, body: &[u8], client_addr: SocketAddr) -> Self {
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Self {
            id,
            method: parts.method.to_string(),
            url: parts.uri.to_string(),
            headers: first_values(&parts.headers),
            body: String::from_utf8_lossy(body).into_owned(),
            timestamp: Utc::now(),
            client_ip: client_addr.to_string(),
            user_agent,
        }
    }
}

/// Response half of a capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    /// Correlation ID shared with the request.
    pub id: Uuid,
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl ResponseRecord {
    /// Snapshot a backend response.
    pub fn capture(id: Uuid, parts: &response::Parts, body: &[u8]) -> Self {
        Self {
            id,
            status_code: parts.status.as_u16(),
            headers: first_values(&parts.headers),
            body: String::from_utf8_lossy(body).into_owned(),
            timestamp: Utc::now(),
        }
    }
}

/// One completed backend round trip.
///
/// Built once by the capture transport and shared read-only (behind `Arc`)
/// until the broadcaster has fanned it out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedExchange {
    pub request: RequestRecord,
    pub response: ResponseRecord,
}

impl CapturedExchange {
    pub fn new(request: RequestRecord, response: ResponseRecord) -> Self {
        debug_assert_eq!(request.id, response.id);
        Self { request, response }
    }

    pub fn id(&self) -> Uuid {
        self.request.id
    }
}

/// Collapse a header map to one value per name (the first one), keyed by the
/// canonical name. Values that are not visible ASCII are recorded lossily.
fn first_values(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .filter_map(|name| {
            headers.get(name).map(|value| {
                (
                    canonical_name(name.as_str()),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
        })
        .collect()
}

/// `content-type` → `Content-Type`: every `-`-separated segment starts upper
/// case, the rest is lower case. Dashboards key their lookups on this form.
fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }
        upper = c == '-';
    }
    out
}
