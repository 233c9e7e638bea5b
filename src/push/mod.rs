//! Live Push Channel
//!
//! Server-to-viewer push of human-readable alert messages. Delivery is
//! best-effort and fire-and-forget: a missed push is not retried because it
//! represents a live notification, not state — current state remains
//! queryable through the session snapshot API.

use crate::types::{AlertLevel, PushAlert};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Broadcast fan-out to every connected viewer. Cheap to clone.
#[derive(Clone)]
pub struct PushChannel {
    tx: broadcast::Sender<PushAlert>,
}

impl PushChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Deliver an alert to all currently connected viewers.
    ///
    /// Never blocks and never fails the caller: with no viewers connected
    /// the message is simply dropped.
    pub fn push(&self, level: AlertLevel, message: impl Into<String>) {
        let alert = PushAlert::new(level, message);
        match self.tx.send(alert) {
            Ok(receivers) => debug!(viewers = receivers, "Alert pushed"),
            Err(_) => debug!("Alert dropped — no viewers connected"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushAlert> {
        self.tx.subscribe()
    }

    /// Number of currently connected viewers.
    pub fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Handle a WebSocket upgrade for `/ws/alerts`.
pub async fn alerts_handler(ws: WebSocketUpgrade, State(push): State<PushChannel>) -> Response {
    ws.on_upgrade(move |socket| serve_viewer(socket, push))
}

/// Forward broadcast alerts to one viewer until it disconnects.
async fn serve_viewer(mut socket: WebSocket, push: PushChannel) {
    let mut rx = push.subscribe();
    debug!(viewers = push.viewer_count(), "Viewer connected");

    loop {
        tokio::select! {
            alert = rx.recv() => {
                match alert {
                    Ok(alert) => {
                        let Ok(text) = serde_json::to_string(&alert) else {
                            continue;
                        };
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Slow viewer: skip ahead rather than stall the channel
                        warn!(missed = missed, "Viewer lagged, alerts skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(error = %e, "Viewer socket error");
                        break;
                    }
                    // Viewers only listen; pings are answered by axum
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!("Viewer disconnected");
}
