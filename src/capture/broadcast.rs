//! Capture broadcaster: fans each capture out to the connected observers.

use std::sync::Arc;

use axum::extract::ws::Message;

use crate::capture::queue::CaptureStream;
use crate::net::ObserverRegistry;
use crate::observability::metrics;

/// Single consumer of the capture queue.
pub struct CaptureBroadcaster {
    stream: CaptureStream,
    observers: Arc<ObserverRegistry>,
}

impl CaptureBroadcaster {
    pub fn new(stream: CaptureStream, observers: Arc<ObserverRegistry>) -> Self {
        Self { stream, observers }
    }

    /// Drain the queue until every producer is gone.
    ///
    /// Delivery is sequential, so each observer sees captures in completion
    /// order. Only observers that are members when a capture is dequeued
    /// receive it. Writes are bounded by the registry's write timeout, and an
    /// observer that runs out of time is dropped like one whose write failed.
    pub async fn run(mut self) {
        tracing::info!("Capture broadcaster starting");

        while let Some(exchange) = self.stream.next().await {
            let payload = match serde_json::to_string(exchange.as_ref()) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(capture_id = %exchange.id(), error = %e, "Failed to serialize capture");
                    metrics::record_captures_dropped("serialize", 1);
                    continue;
                }
            };
            let frame = Message::Text(payload.into());

            for observer in self.observers.snapshot() {
                if let Err(e) = observer.send(frame.clone()).await {
                    tracing::debug!(
                        observer_id = %observer.id(),
                        error = %e,
                        "Observer write failed, dropping observer"
                    );
                    self.observers.teardown(&observer).await;
                }
            }
        }

        tracing::info!("Capture broadcaster stopped");
    }
}
