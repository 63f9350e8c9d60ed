//! Observer websocket gateway.
//!
//! # Responsibilities
//! - Upgrade `/ws` requests and register the observer
//! - Keep the connection alive with periodic pings
//! - Detect peer close or error and tear the observer down
//!
//! # Data Flow
//! ```text
//! Broadcaster ──── capture JSON frames ────▶ Observer
//! Keep-alive  ──── ping every period ──────▶ Observer
//! Read loop   ◀─── close / error ────────── Observer
//! ```
//!
//! # Design Decisions
//! - Observers have no inbound protocol; the read loop only watches for close
//! - Read loop and keep-alive race to tear down; teardown is idempotent
//! - The keep-alive is stopped by signal, never aborted mid-teardown

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::StreamExt;
use tokio::sync::oneshot;
use tokio::time::{self, Instant};

use crate::http::server::AppState;
use crate::net::{ObserverConnection, ObserverRegistry};

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let observers = state.shared.observers.clone();
    let keepalive = Duration::from_secs(state.config.observers.keepalive_secs);
    ws.on_upgrade(move |socket| serve_observer(socket, observers, keepalive))
}

/// Run one observer connection until the peer goes away.
pub async fn serve_observer(socket: WebSocket, observers: Arc<ObserverRegistry>, keepalive: Duration) {
    let (sink, mut stream) = socket.split();
    let conn = observers.register(Box::pin(sink));
    tracing::info!(observer_id = %conn.id(), observers = observers.len(), "Observer connected");

    let (stop_tx, stop_rx) = oneshot::channel();
    let pinger = tokio::spawn(keep_alive(conn.clone(), observers.clone(), keepalive, stop_rx));

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(observer_id = %conn.id(), error = %e, "Observer read failed");
                break;
            }
        }
    }

    observers.teardown(&conn).await;
    let _ = stop_tx.send(());
    let _ = pinger.await;
    tracing::info!(observer_id = %conn.id(), observers = observers.len(), "Observer disconnected");
}

async fn keep_alive(
    conn: Arc<ObserverConnection>,
    observers: Arc<ObserverRegistry>,
    period: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {}
        }

        if !observers.contains(conn.id()) {
            break;
        }
        if let Err(e) = conn.send(Message::Ping(Bytes::new())).await {
            tracing::debug!(observer_id = %conn.id(), error = %e, "Keep-alive failed");
            observers.teardown(&conn).await;
            break;
        }
    }
}
