//! HTTP command endpoint and WebSocket transport.
//!
//! `POST /command` executes one command line per request body and
//! returns the reply text. `/ws` upgrades to a WebSocket where each
//! text message is one command and each reply is one message; pub/sub
//! deliveries arrive as additional messages on the same socket.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::db::{Db, HTTP_CLIENT};
use crate::dispatch::dispatch;
use crate::pubsub::WsSink;

/// Router for the HTTP command endpoint.
pub fn command_router(db: Arc<Db>) -> Router {
    Router::new()
        .route("/command", post(handle_command))
        .with_state(db)
}

/// Router for the WebSocket endpoint.
pub fn ws_router(db: Arc<Db>) -> Router {
    Router::new().route("/ws", get(handle_upgrade)).with_state(db)
}

async fn handle_command(
    State(db): State<Arc<Db>>,
    body: String,
) -> Result<String, (StatusCode, String)> {
    let line = body.trim();
    if line.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "empty command".into()));
    }
    let mut reply = dispatch(&db, HTTP_CLIENT, line);
    reply.push_str("\r\n");
    Ok(reply)
}

async fn handle_upgrade(State(db): State<Arc<Db>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| session(db, socket))
}

/// Drives one WebSocket client: commands in, replies and pub/sub
/// deliveries out.
async fn session(db: Arc<Db>, socket: WebSocket) {
    let (mut outgoing, mut incoming) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let client = db.register_client(Arc::new(WsSink::new(tx)));
    debug!(client, "websocket client connected");

    loop {
        tokio::select! {
            message = incoming.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let line = text.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let reply = dispatch(&db, client, line);
                        if outgoing.send(Message::Text(reply)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary/ping/pong are ignored
                    Some(Err(e)) => {
                        debug!(client, "websocket read error: {e}");
                        break;
                    }
                }
            }
            delivery = rx.recv() => {
                if let Some(message) = delivery {
                    if outgoing.send(Message::Text(message)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    db.unregister_client(client);
    debug!(client, "websocket client disconnected");
}
