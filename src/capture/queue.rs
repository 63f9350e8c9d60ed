//! Capture queue between the transport (producers) and the broadcaster
//! (single consumer).
//!
//! # Design Decisions
//! - `DropOldest` rides on a broadcast channel with one receiver: a full
//!   ring overwrites the oldest unread capture and the consumer learns how
//!   many it lost, so the proxy never waits on observers
//! - `Block` is a bounded mpsc channel: producers wait for room
//! - Captures travel as `Arc` so the broadcaster can fan out without copies

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::capture::exchange::CapturedExchange;
use crate::config::OverflowPolicy;
use crate::observability::metrics;

/// Producer handle. Cheap to clone; every proxy shares one.
#[derive(Clone)]
pub struct CaptureQueue {
    sender: QueueSender,
}

#[derive(Clone)]
enum QueueSender {
    DropOldest(broadcast::Sender<Arc<CapturedExchange>>),
    Block(mpsc::Sender<Arc<CapturedExchange>>),
}

/// Consumer handle. There is exactly one per queue.
pub struct CaptureStream {
    receiver: QueueReceiver,
}

enum QueueReceiver {
    DropOldest(broadcast::Receiver<Arc<CapturedExchange>>),
    Block(mpsc::Receiver<Arc<CapturedExchange>>),
}

/// Create a queue holding up to `capacity` unread captures.
pub fn capture_queue(capacity: usize, policy: OverflowPolicy) -> (CaptureQueue, CaptureStream) {
    match policy {
        OverflowPolicy::DropOldest => {
            let (tx, rx) = broadcast::channel(capacity);
            (
                CaptureQueue { sender: QueueSender::DropOldest(tx) },
                CaptureStream { receiver: QueueReceiver::DropOldest(rx) },
            )
        }
        OverflowPolicy::Block => {
            let (tx, rx) = mpsc::channel(capacity);
            (
                CaptureQueue { sender: QueueSender::Block(tx) },
                CaptureStream { receiver: QueueReceiver::Block(rx) },
            )
        }
    }
}

impl CaptureQueue {
    /// Enqueue a capture. Only waits under the `Block` policy.
    pub async fn push(&self, exchange: CapturedExchange) {
        let id = exchange.id();
        let exchange = Arc::new(exchange);
        let delivered = match &self.sender {
            QueueSender::DropOldest(tx) => tx.send(exchange).is_ok(),
            QueueSender::Block(tx) => tx.send(exchange).await.is_ok(),
        };

        if !delivered {
            tracing::trace!(capture_id = %id, "No capture consumer, capture discarded");
            metrics::record_captures_dropped("no_consumer", 1);
        }
    }
}

impl CaptureStream {
    /// Next capture in completion order, or `None` once every producer is gone.
    pub async fn next(&mut self) -> Option<Arc<CapturedExchange>> {
        match &mut self.receiver {
            QueueReceiver::DropOldest(rx) => loop {
                match rx.recv().await {
                    Ok(exchange) => return Some(exchange),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Capture queue overflowed, oldest captures dropped");
                        metrics::record_captures_dropped("overflow", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
            QueueReceiver::Block(rx) => rx.recv().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::exchange::{RequestRecord, ResponseRecord};
    use axum::http::{Request, Response};
    use std::time::Duration;
    use uuid::Uuid;

    fn exchange() -> CapturedExchange {
        let id = Uuid::new_v4();
        let (req, _) = Request::builder().uri("/").body(()).unwrap().into_parts();
        let (resp, _) = Response::builder().body(()).unwrap().into_parts();
        CapturedExchange::new(
            RequestRecord::capture(id, &req, b"", "127.0.0.1:1".parse().unwrap()),
            ResponseRecord::capture(id, &resp, b""),
        )
    }

    #[tokio::test]
    async fn preserves_completion_order() {
        let (queue, mut stream) = capture_queue(8, OverflowPolicy::DropOldest);
        let first = exchange();
        let second = exchange();
        let (a, b) = (first.id(), second.id());

        queue.push(first).await;
        queue.push(second).await;

        assert_eq!(stream.next().await.unwrap().id(), a);
        assert_eq!(stream.next().await.unwrap().id(), b);
    }

    #[tokio::test]
    async fn drop_oldest_evicts_unread_entries() {
        let (queue, mut stream) = capture_queue(2, OverflowPolicy::DropOldest);
        let entries: Vec<_> = (0..3).map(|_| exchange()).collect();
        let ids: Vec<_> = entries.iter().map(CapturedExchange::id).collect();

        for entry in entries {
            // Never waits even though nobody is reading.
            tokio::time::timeout(Duration::from_millis(100), queue.push(entry))
                .await
                .expect("push must not block");
        }

        assert_eq!(stream.next().await.unwrap().id(), ids[1]);
        assert_eq!(stream.next().await.unwrap().id(), ids[2]);
    }

    #[tokio::test]
    async fn block_policy_waits_for_room() {
        let (queue, mut stream) = capture_queue(1, OverflowPolicy::Block);
        queue.push(exchange()).await;

        let pending = tokio::time::timeout(Duration::from_millis(100), queue.push(exchange())).await;
        assert!(pending.is_err(), "second push should wait while the queue is full");

        assert!(stream.next().await.is_some());
        tokio::time::timeout(Duration::from_millis(100), queue.push(exchange()))
            .await
            .expect("push proceeds once there is room");
    }

    #[tokio::test]
    async fn stream_ends_when_producers_drop() {
        let (queue, mut stream) = capture_queue(4, OverflowPolicy::DropOldest);
        drop(queue);
        assert!(stream.next().await.is_none());
    }
}
