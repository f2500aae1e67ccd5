//! Real server on a free port, WebSocket clients, HTTP hydration.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{net::TcpStream, time::{timeout, Duration}};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use whiteboard_sync::{
    cache::{DurableStore, RoomCache},
    config::Config,
    protocol::ServerEvent,
    registry::RoomRegistry,
    relay::Relay,
};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serves the app on 127.0.0.1:0 and returns the bound port.
async fn start_server() -> u16 {
    let cfg = Config::default();
    let store = DurableStore::in_memory().await.unwrap();
    let cache = RoomCache::new(store, cfg.ttls);
    let relay = Relay::new(RoomRegistry::new(), cache, cfg.rate_limit, cfg.outbound_capacity);
    let app = whiteboard_sync::app(relay, Arc::new(cfg));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    port
}

async fn open(port: u16) -> Ws {
    let (ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws")).await.unwrap();
    ws
}

async fn send(ws: &mut Ws, frame: Value) {
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

async fn next_event(ws: &mut Ws) -> ServerEvent {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for an event")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn stays_quiet(ws: &mut Ws) -> bool {
    timeout(Duration::from_millis(200), ws.next()).await.is_err()
}

async fn join(ws: &mut Ws, room: &str, name: &str) {
    send(ws, json!({"event": "join", "data": {"room": room, "userName": name}})).await;
}

async fn fetch_drawings(port: u16, room: &str) -> Value {
    reqwest::get(format!("http://127.0.0.1:{port}/room/{room}/drawings"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn draw_undo_and_late_fetch() {
    let port = start_server().await;
    let mut a = open(port).await;
    let mut b = open(port).await;

    join(&mut a, "R1", "A").await;
    assert_eq!(next_event(&mut a).await, ServerEvent::UserJoined { count: 1 });
    join(&mut b, "R1", "B").await;
    assert_eq!(next_event(&mut b).await, ServerEvent::UserJoined { count: 2 });
    assert_eq!(next_event(&mut a).await, ServerEvent::UserJoined { count: 2 });

    let id = uuid::Uuid::new_v4();
    let p1 = json!({"id": id, "type": "path", "stroke": "#000", "path": [["M", 1, 1], ["L", 2, 2]]});
    send(&mut a, json!({"event": "draw", "data": {"room": "R1", "path": p1}})).await;

    match next_event(&mut b).await {
        ServerEvent::DrawUpdate { room, path } => {
            assert_eq!(room, "R1");
            assert_eq!(path.id, id);
            assert_eq!(path.fields["stroke"], json!("#000"));
        }
        other => panic!("expected draw_update, got {other:?}"),
    }
    assert_eq!(fetch_drawings(port, "R1").await["drawings"].as_array().unwrap().len(), 1);

    send(&mut a, json!({"event": "undo", "data": {"room": "R1"}})).await;
    assert!(matches!(next_event(&mut b).await, ServerEvent::UndoUpdate { .. }));
    assert!(stays_quiet(&mut a).await, "sender must not get its own events back");

    assert_eq!(fetch_drawings(port, "R1").await, json!({"drawings": []}));
}

#[tokio::test]
async fn rooms_are_isolated_and_disconnect_is_announced() {
    let port = start_server().await;
    let mut a = open(port).await;
    let mut b = open(port).await;
    let mut c = open(port).await;

    join(&mut a, "R1", "A").await;
    next_event(&mut a).await;
    join(&mut b, "R1", "B").await;
    next_event(&mut b).await;
    next_event(&mut a).await;
    join(&mut c, "R2", "C").await;
    next_event(&mut c).await;

    send(&mut a, json!({"event": "cursor_move", "data": {"room": "R1", "x": 3, "y": 4}})).await;
    assert_eq!(
        next_event(&mut b).await,
        ServerEvent::CursorUpdate { room: "R1".into(), user_name: "A".into(), x: 3.0, y: 4.0 }
    );
    assert!(stays_quiet(&mut c).await);

    b.close(None).await.unwrap();
    assert_eq!(next_event(&mut a).await, ServerEvent::UserLeft { count: 1 });
}

#[tokio::test]
async fn malformed_frames_do_not_end_the_session() {
    let port = start_server().await;
    let mut a = open(port).await;
    let mut b = open(port).await;

    a.send(Message::Text("{not json".into())).await.unwrap();
    send(&mut a, json!({"event": "teleport", "data": {"room": "R1"}})).await;

    join(&mut a, "R1", "A").await;
    assert_eq!(next_event(&mut a).await, ServerEvent::UserJoined { count: 1 });
    join(&mut b, "R1", "B").await;
    next_event(&mut b).await;
    next_event(&mut a).await;

    send(&mut a, json!({"event": "clear", "data": {"room": "R1"}})).await;
    assert_eq!(next_event(&mut b).await, ServerEvent::ClearBoard);
}

#[tokio::test]
async fn presence_endpoint_reports_roster() {
    let port = start_server().await;
    let mut a = open(port).await;
    join(&mut a, "R7", "Ana").await;
    next_event(&mut a).await;

    let body: Value = reqwest::get(format!("http://127.0.0.1:{port}/room/R7/presence"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], json!(1));
    let users = body["users"].as_object().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users.values().next().unwrap()["userName"], json!("Ana"));
}
