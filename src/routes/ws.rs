use std::sync::Arc;

use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, Extension},
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{config::Config, relay::{Relay, Session}};

pub fn router() -> Router {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(relay): Extension<Relay>,
    Extension(cfg): Extension<Arc<Config>>,
) -> impl IntoResponse {
    ws.max_message_size(cfg.body_limit)
        .on_upgrade(move |sock| user_ws(sock, relay))
}

/* ---------------- per connection ---------------- */
async fn user_ws(sock: WebSocket, relay: Relay) {
    let conn = Uuid::new_v4();
    let (mut sink, mut stream) = sock.split();
    let (mut session, mut outbound) = Session::open(relay, conn).await;
    info!(%conn, "connected");

    /* writer: drains the outbound queue into the socket */
    let writer = tokio::spawn(async move {
        while let Some(ev) = outbound.recv().await {
            let text = match serde_json::to_string(&ev) {
                Ok(t) => t,
                Err(e) => {
                    warn!(%conn, error = %e, "could not encode outbound event");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    /* reader: frames from this connection, in order */
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(raw)) => {
                session.handle_text(&raw).await;
            }
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(raw) => {
                    session.handle_text(raw).await;
                }
                Err(_) => warn!(%conn, "dropping non-utf8 binary frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(%conn, error = %e, "socket error");
                break;
            }
        }
    }

    /* leave */
    session.close().await;
    writer.abort();
    info!(%conn, "disconnected");
}
