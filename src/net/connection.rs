//! Observer connection state machine and membership tracking.
//!
//! # Responsibilities
//! - Track connection phase (Connecting → Open → Closing → Closed)
//! - Generate unique observer IDs for tracing
//! - Own the outbound half of each observer's websocket
//! - Keep the set of live observers and make teardown idempotent
//! - Bound every frame write so one stalled peer cannot hold up the rest

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use dashmap::DashMap;
use futures_util::{Sink, SinkExt};
use tokio::sync::Mutex;
use tokio::time;

use crate::observability::metrics;

/// Outbound frame sink of an observer connection.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

/// Unique identifier for an observer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// Connection phase for lifecycle tracking.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverPhase {
    /// Upgrade accepted, not yet registered.
    Connecting = 0,
    /// Registered and receiving captures.
    Open = 1,
    /// Teardown in progress.
    Closing = 2,
    /// Removed from the set and transport closed.
    Closed = 3,
}

impl From<u8> for ObserverPhase {
    fn from(val: u8) -> Self {
        match val {
            0 => ObserverPhase::Connecting,
            1 => ObserverPhase::Open,
            2 => ObserverPhase::Closing,
            _ => ObserverPhase::Closed,
        }
    }
}

/// One streaming observer.
pub struct ObserverConnection {
    id: ObserverId,
    phase: AtomicU8,
    sink: Mutex<FrameSink>,
    write_timeout: Duration,
}

impl ObserverConnection {
    fn new(id: ObserverId, sink: FrameSink, write_timeout: Duration) -> Self {
        Self {
            id,
            phase: AtomicU8::new(ObserverPhase::Connecting as u8),
            sink: Mutex::new(sink),
            write_timeout,
        }
    }

    /// Get this connection's ID.
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Current phase.
    pub fn phase(&self) -> ObserverPhase {
        ObserverPhase::from(self.phase.load(Ordering::SeqCst))
    }

    /// Write one frame to the observer.
    ///
    /// Waiting for the sink and writing share one deadline; running out of
    /// time is reported as a write error.
    pub async fn send(&self, frame: Message) -> Result<(), axum::Error> {
        let write = async {
            let mut sink = self.sink.lock().await;
            sink.send(frame).await
        };
        match time::timeout(self.write_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(axum::Error::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "observer write timed out",
            ))),
        }
    }

    fn transition(&self, from: ObserverPhase, to: ObserverPhase) -> bool {
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// The set of connected observers.
pub struct ObserverRegistry {
    members: DashMap<ObserverId, Arc<ObserverConnection>>,
    next_id: AtomicU64,
    write_timeout: Duration,
}

impl ObserverRegistry {
    /// `write_timeout` bounds every frame written to a member.
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            members: DashMap::new(),
            next_id: AtomicU64::new(0),
            write_timeout,
        }
    }

    /// Register a freshly upgraded connection and move it to `Open`.
    pub fn register(&self, sink: FrameSink) -> Arc<ObserverConnection> {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let conn = Arc::new(ObserverConnection::new(id, sink, self.write_timeout));

        self.members.insert(id, conn.clone());
        conn.transition(ObserverPhase::Connecting, ObserverPhase::Open);
        metrics::set_observers(self.members.len());

        tracing::debug!(observer_id = %id, observers = self.members.len(), "Observer registered");
        conn
    }

    /// Whether the connection is still a member.
    pub fn contains(&self, id: ObserverId) -> bool {
        self.members.contains_key(&id)
    }

    /// Number of connected observers.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members at this instant. The registry lock is released before return.
    pub fn snapshot(&self) -> Vec<Arc<ObserverConnection>> {
        self.members.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Remove the connection and close its transport.
    ///
    /// Safe to call any number of times from any task; only the first call
    /// that finds the connection `Open` does the work.
    pub async fn teardown(&self, conn: &ObserverConnection) {
        if !conn.transition(ObserverPhase::Open, ObserverPhase::Closing) {
            return;
        }

        self.members.remove(&conn.id);
        metrics::set_observers(self.members.len());

        let close = async {
            let mut sink = conn.sink.lock().await;
            sink.close().await
        };
        match time::timeout(conn.write_timeout, close).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::trace!(observer_id = %conn.id, error = %e, "Observer close failed");
            }
            Err(_) => tracing::debug!(observer_id = %conn.id, "Observer close timed out"),
        }

        conn.transition(ObserverPhase::Closing, ObserverPhase::Closed);
        tracing::debug!(observer_id = %conn.id, observers = self.members.len(), "Observer closed");
    }

    /// Tear down every connected observer.
    pub async fn close_all(&self) {
        for conn in self.snapshot() {
            self.teardown(&conn).await;
        }
    }
}
