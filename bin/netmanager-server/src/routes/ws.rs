//! Live log stream over a websocket.
//!
//! Every message published on the [`netmanager_core::LogHub`] is forwarded as a
//! text frame.  A ping goes out every 30 s; the connection ends when the
//! client closes it or a write fails.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use netmanager_core::LogSubscription;
use tracing::debug;

use crate::state::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(30);

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(upgrade))
}

pub async fn upgrade(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    // Subscribe before the upgrade completes so nothing published in between is lost.
    let log = state.hub.subscribe();
    ws.on_upgrade(move |socket| stream_log(socket, log))
}

async fn stream_log(socket: WebSocket, mut log: LogSubscription) {
    let (mut sender, mut receiver) = socket.split();
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await;

    loop {
        tokio::select! {
            msg = log.recv() => {
                let Some(msg) = msg else { break };
                if sender.send(Message::Text(msg.as_ref().into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket read failed");
                        break;
                    }
                }
            }
        }
    }
    debug!("websocket log stream closed");
}
