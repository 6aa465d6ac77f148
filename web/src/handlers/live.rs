//! WebSocket feed of live snapshots.
//!
//! Any stream of snapshots (for example the combined roster view built from
//! document store subscriptions) can be pushed to a browser with
//! [`stream_snapshots`]. The connection carries JSON envelopes.
//!
//! # Message Protocol
//!
//! **Server → Client (Snapshot):**
//! ```json
//! { "type": "snapshot", "data": { ... } }
//! ```
//!
//! **Server → Client (Error):**
//! ```json
//! { "type": "error", "message": "Document store unavailable" }
//! ```
//!
//! **Client → Server (keep-alive):**
//! ```json
//! { "type": "ping" }
//! ```
//! answered with `{ "type": "pong" }`.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, Stream, stream::StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WsMessage<T> {
    /// Full current view
    Snapshot {
        /// The snapshot payload
        data: T,
    },
    /// The feed failed; the connection is closed afterwards
    Error {
        /// Error description
        message: String,
    },
    /// Keep-alive from client
    Ping,
    /// Keep-alive answer
    Pong,
}

/// Forward `snapshots` to `socket` until either side goes away.
///
/// Spawns two tasks:
/// 1. **Sender**: writes each snapshot (and pong answers) to the client
/// 2. **Receiver**: answers pings and watches for close frames
///
/// A failed snapshot is sent as an error envelope and ends the feed.
#[allow(clippy::cognitive_complexity)] // One select loop per direction
pub async fn stream_snapshots<St, T, E>(socket: WebSocket, mut snapshots: St)
where
    St: Stream<Item = Result<T, E>> + Send + Unpin + 'static,
    T: Serialize + Send + 'static,
    E: Display + Send + 'static,
{
    info!("Live feed connection established");

    let (mut sender, mut receiver) = socket.split();
    let (pong_tx, mut pong_rx) = mpsc::channel::<()>(8);

    let mut send_task = tokio::spawn(async move {
        loop {
            let envelope = tokio::select! {
                next = snapshots.next() => match next {
                    Some(Ok(data)) => WsMessage::Snapshot { data },
                    Some(Err(e)) => {
                        warn!(error = %e, "Live feed failed");
                        let message = WsMessage::<T>::Error { message: e.to_string() };
                        if let Ok(json) = serde_json::to_string(&message) {
                            let _ = sender.send(Message::Text(json)).await;
                        }
                        break;
                    },
                    None => break,
                },
                Some(()) = pong_rx.recv() => WsMessage::Pong,
            };

            let json = match serde_json::to_string(&envelope) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize snapshot");
                    continue;
                },
            };

            if sender.send(Message::Text(json)).await.is_err() {
                // Client disconnected
                break;
            }
        }

        let _ = sender.close().await;
        debug!("Live feed send task terminated");
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<WsMessage<()>>(&text) {
                    Ok(WsMessage::Ping) => {
                        if pong_tx.send(()).await.is_err() {
                            break;
                        }
                    },
                    Ok(other) => warn!(?other, "Unexpected message type from client"),
                    Err(e) => debug!(error = %e, "Ignoring unparsable client message"),
                },
                Message::Close(_) => {
                    info!("Client requested close");
                    break;
                },
                // Protocol-level ping/pong is answered by axum
                Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {},
            }
        }

        debug!("Live feed receive task terminated");
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    info!("Live feed connection closed");
}
