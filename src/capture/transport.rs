//! Capture transport: the outbound leg of every proxied request.
//!
//! # Responsibilities
//! - Assign a correlation ID per round trip
//! - Buffer the request body, snapshot it, and forward an identical body
//! - Perform the backend call
//! - Buffer the response body, snapshot it, and hand back an identical body
//! - Push exactly one capture per completed round trip
//!
//! # Design Decisions
//! - A failed backend call produces no capture (no half pairs)
//! - Capture bookkeeping never changes what the client receives

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{Request, Response};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use uuid::Uuid;

use crate::capture::exchange::{CapturedExchange, RequestRecord, ResponseRecord};
use crate::capture::queue::CaptureQueue;
use crate::observability::metrics;

/// Errors from a single captured round trip.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The inbound request body could not be read.
    #[error("failed to read request body: {0}")]
    RequestBody(#[source] axum::Error),

    /// The backend call failed before a response arrived.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    /// The backend response body could not be read.
    #[error("failed to read response body: {0}")]
    ResponseBody(#[source] axum::Error),
}

/// Outbound transport shared by every proxy instance.
#[derive(Clone)]
pub struct CaptureTransport {
    client: Client<HttpConnector, Body>,
    queue: CaptureQueue,
    max_body_bytes: usize,
}

impl CaptureTransport {
    pub fn new(queue: CaptureQueue, max_body_bytes: usize) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            queue,
            max_body_bytes,
        }
    }

    /// Send `request` to the backend named in its URI and record the exchange.
    pub async fn round_trip(
        &self,
        request: Request<Body>,
        client_addr: SocketAddr,
    ) -> Result<Response<Body>, CaptureError> {
        let id = Uuid::new_v4();

        let (parts, body) = request.into_parts();
        let request_body = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(CaptureError::RequestBody)?;
        let request_record = RequestRecord::capture(id, &parts, &request_body, client_addr);

        let request = Request::from_parts(parts, Body::from(request_body));
        let response = self.client.request(request).await?;

        let (parts, body) = response.into_parts();
        let response_body = match axum::body::to_bytes(Body::new(body), usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => {
                metrics::record_captures_dropped("response_body", 1);
                return Err(CaptureError::ResponseBody(e));
            }
        };
        // The client gets the whole body; the capture keeps at most the limit.
        let captured = &response_body[..response_body.len().min(self.max_body_bytes)];
        let response_record = ResponseRecord::capture(id, &parts, captured);

        let status = response_record.status_code;
        self.queue
            .push(CapturedExchange::new(request_record, response_record))
            .await;
        metrics::record_capture(status);

        tracing::debug!(capture_id = %id, status, "Exchange captured");

        Ok(Response::from_parts(parts, Body::from(response_body)))
    }
}
