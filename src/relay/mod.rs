//! Session relay: one handler per inbound event kind.

pub mod limit;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    cache::{RoomCache, StoreError},
    codec::{CodecError, DrawingObject, ObjectId},
    config::RateLimit,
    protocol::{ClientEvent, ObjectData, Point, RoomId, ServerEvent, Viewport},
    registry::{ConnId, Departure, RoomRegistry},
};
pub use limit::TokenBucket;

#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("connection is not registered")]
    NotConnected,

    #[error("`{0}` sent outside any room")]
    NotInRoom(&'static str),

    #[error("event names room {claimed:?} but sender is in {joined:?}")]
    RoomMismatch { joined: RoomId, claimed: RoomId },

    #[error("room id is empty")]
    EmptyRoom,

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,

    #[error("object {0} is unknown to the sender")]
    UnknownObject(ObjectId),

    #[error("cursor position is not finite")]
    BadCoordinates,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One room-scoped fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    pub room:    RoomId,
    pub event:   ServerEvent,
    pub exclude: Option<ConnId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    NoOp,
    Broadcast(Vec<Broadcast>),
}

impl Outcome {
    fn one(room: &str, event: ServerEvent, exclude: Option<ConnId>) -> Self {
        Self::Broadcast(vec![Broadcast { room: room.to_owned(), event, exclude }])
    }

    pub fn is_noop(&self) -> bool { matches!(self, Self::NoOp) }

    pub fn broadcasts(&self) -> &[Broadcast] {
        match self {
            Self::NoOp => &[],
            Self::Broadcast(b) => b,
        }
    }
}

#[derive(Clone)]
pub struct Relay {
    registry:          RoomRegistry,
    cache:             RoomCache,
    rate:              RateLimit,
    outbound_capacity: usize,
}

impl Relay {
    pub fn new(registry: RoomRegistry, cache: RoomCache, rate: RateLimit, outbound_capacity: usize) -> Self {
        Self { registry, cache, rate, outbound_capacity: outbound_capacity.max(1) }
    }

    pub fn registry(&self) -> &RoomRegistry { &self.registry }
    pub fn cache(&self) -> &RoomCache { &self.cache }

    /// Registers a fresh connection; the receiver is its outbound queue.
    pub async fn connect(&self, conn: ConnId) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(self.outbound_capacity);
        self.registry.connect(conn, tx).await;
        rx
    }

    /// Transport saw the socket close. Tells the room it shrank.
    pub async fn disconnect(&self, conn: ConnId) -> Outcome {
        let Some(left) = self.registry.disconnect(conn).await else { return Outcome::NoOp };
        let outcome = self.departed(conn, left).await;
        self.deliver(&outcome).await;
        outcome
    }

    /// Applies one event and performs its broadcasts. Failures are logged and
    /// end as a no-op; a failed durable write also notifies the sender.
    pub async fn handle_event(&self, conn: ConnId, ev: ClientEvent) -> Outcome {
        let kind = ev.name();
        match self.dispatch(conn, ev).await {
            Ok(outcome) => {
                self.deliver(&outcome).await;
                outcome
            }
            Err(RelayError::Store(e)) => {
                error!(%conn, event = kind, error = %e, "durable write failed, not broadcasting");
                let message = format!("failed to record {kind}");
                self.registry.send_to(conn, ServerEvent::Error { message }).await;
                Outcome::NoOp
            }
            Err(e) => {
                warn!(%conn, event = kind, error = %e, "dropping event");
                Outcome::NoOp
            }
        }
    }

    /// Event-kind dispatch table.
    pub async fn dispatch(&self, conn: ConnId, ev: ClientEvent) -> Result<Outcome, RelayError> {
        debug!(%conn, event = ev.name(), room = ev.room(), "inbound");
        match ev {
            ClientEvent::Join { room, user_name }         => self.on_join(conn, room, user_name).await,
            ClientEvent::CursorMove { room, x, y }        => self.on_cursor_move(conn, room, Point::new(x, y)).await,
            ClientEvent::Draw { room, path }              => self.on_draw(conn, room, path).await,
            ClientEvent::Undo { room, object_data }       => self.on_undo(conn, room, object_data).await,
            ClientEvent::Redo { room, object_data }       => self.on_redo(conn, room, object_data).await,
            ClientEvent::Clear { room }                   => self.on_clear(conn, room).await,
            ClientEvent::ViewportUpdate { room, viewport } => self.on_viewport(conn, room, viewport).await,
        }
    }

    async fn deliver(&self, outcome: &Outcome) {
        for b in outcome.broadcasts() {
            let n = self.registry.broadcast(&b.room, &b.event, b.exclude).await;
            debug!(room = %b.room, event = b.event.name(), delivered = n, "broadcast");
        }
    }

    /// Room and display name of a member, checked against the room the event names.
    async fn seat(&self, conn: ConnId, claimed: RoomId, kind: &'static str) -> Result<(RoomId, String), RelayError> {
        let (joined, name) = self.registry.seat_of(conn).await.ok_or(RelayError::NotInRoom(kind))?;
        if joined != claimed {
            return Err(RelayError::RoomMismatch { joined, claimed });
        }
        Ok((joined, name))
    }

    async fn departed(&self, conn: ConnId, left: Departure) -> Outcome {
        self.cache.drop_presence(&left.room, conn).await;
        self.cache.record_member_count(&left.room, left.count).await;
        Outcome::one(&left.room, ServerEvent::UserLeft { count: left.count }, None)
    }

    /* ---------------- handlers ---------------- */

    async fn on_join(&self, conn: ConnId, room: RoomId, user_name: String) -> Result<Outcome, RelayError> {
        if room.trim().is_empty() {
            return Err(RelayError::EmptyRoom);
        }
        let joined = self.registry.join(conn, &room, &user_name).await.ok_or(RelayError::NotConnected)?;

        let mut out = Vec::new();
        if let Some(prev) = joined.previous {
            if let Outcome::Broadcast(b) = self.departed(conn, prev).await {
                out.extend(b);
            }
        }

        // the room row is bookkeeping; a failure here must not keep anyone out
        if let Err(e) = self.cache.touch_room(&room).await {
            error!(room = %room, error = %e, "could not record room activity");
        }
        self.cache.track_presence(&room, conn, &user_name).await;
        self.cache.record_member_count(&room, joined.count).await;

        // the joiner gets the count too
        out.push(Broadcast { room, event: ServerEvent::UserJoined { count: joined.count }, exclude: None });
        Ok(Outcome::Broadcast(out))
    }

    async fn on_cursor_move(&self, conn: ConnId, room: RoomId, at: Point) -> Result<Outcome, RelayError> {
        let (room, user_name) = self.seat(conn, room, "cursor_move").await?;
        if !at.x.is_finite() || !at.y.is_finite() {
            return Err(RelayError::BadCoordinates);
        }
        self.cache.cache_cursor(&room, conn, &user_name, at);
        let ev = ServerEvent::CursorUpdate { room: room.clone(), user_name, x: at.x, y: at.y };
        Ok(Outcome::one(&room, ev, Some(conn)))
    }

    async fn on_draw(&self, conn: ConnId, room: RoomId, path: DrawingObject) -> Result<Outcome, RelayError> {
        let (room, _) = self.seat(conn, room, "draw").await?;
        path.validate()?;
        self.cache.record_draw(&room, &path).await?;
        self.registry.with_history(conn, |h| h.push(path.clone())).await;

        Ok(Outcome::one(&room, ServerEvent::DrawUpdate { room: room.clone(), path }, Some(conn)))
    }

    async fn on_undo(&self, conn: ConnId, room: RoomId, data: Option<ObjectData>) -> Result<Outcome, RelayError> {
        let (room, _) = self.seat(conn, room, "undo").await?;
        let id = match &data {
            Some(d) => d.id(),
            None => self
                .registry
                .with_history(conn, |h| h.done().last().map(|o| o.id))
                .await
                .flatten()
                .ok_or(RelayError::NothingToUndo)?,
        };

        let removed = self.cache.remove_object(&room, id).await?;
        self.registry.with_history(conn, |h| h.undo_where(|o| o.id == id).is_some()).await;
        if !removed {
            debug!(%conn, room = %room, object = %id, "undo of an object already gone");
            return Ok(Outcome::NoOp);
        }

        let object_data = Some(data.unwrap_or(ObjectData::Ref { id }));
        Ok(Outcome::one(&room, ServerEvent::UndoUpdate { room: room.clone(), object_data }, Some(conn)))
    }

    async fn on_redo(&self, conn: ConnId, room: RoomId, data: Option<ObjectData>) -> Result<Outcome, RelayError> {
        let (room, _) = self.seat(conn, room, "redo").await?;
        // only what the sender itself undid can come back
        let wanted = data.as_ref().map(ObjectData::id);
        let obj = self
            .registry
            .with_history(conn, |h| match wanted {
                Some(id) => h.undone().iter().rfind(|o| o.id == id).cloned(),
                None => h.undone().last().cloned(),
            })
            .await
            .flatten()
            .ok_or(match wanted {
                Some(id) => RelayError::UnknownObject(id),
                None => RelayError::NothingToRedo,
            })?;

        let restored = self.cache.restore_object(&room, &obj).await?;
        let id = obj.id;
        self.registry.with_history(conn, |h| h.redo_where(|o| o.id == id).is_some()).await;
        if !restored {
            debug!(%conn, room = %room, object = %id, "redo of an object already present");
            return Ok(Outcome::NoOp);
        }

        let object_data = Some(ObjectData::Object(obj));
        Ok(Outcome::one(&room, ServerEvent::RedoUpdate { room: room.clone(), object_data }, Some(conn)))
    }

    async fn on_clear(&self, conn: ConnId, room: RoomId) -> Result<Outcome, RelayError> {
        let (room, name) = self.seat(conn, room, "clear").await?;
        self.cache.clear_room(&room).await?;
        self.registry.reset_histories(&room).await;
        info!(%conn, room = %room, by = %name, "board cleared");
        Ok(Outcome::one(&room, ServerEvent::ClearBoard, Some(conn)))
    }

    async fn on_viewport(&self, conn: ConnId, room: RoomId, viewport: Viewport) -> Result<Outcome, RelayError> {
        let (room, _) = self.seat(conn, room, "viewport_update").await?;
        Ok(Outcome::one(&room, ServerEvent::ViewportUpdate { room: room.clone(), viewport }, Some(conn)))
    }
}

/// Per-connection half of the relay, owned by the connection's task.
pub struct Session {
    conn:    ConnId,
    relay:   Relay,
    limiter: TokenBucket,
}

impl Session {
    pub async fn open(relay: Relay, conn: ConnId) -> (Self, mpsc::Receiver<ServerEvent>) {
        let rx = relay.connect(conn).await;
        let limiter = TokenBucket::new(relay.rate);
        (Self { conn, relay, limiter }, rx)
    }

    pub fn conn(&self) -> ConnId { self.conn }

    /// One text frame from the socket.
    pub async fn handle_text(&mut self, raw: &str) -> Outcome {
        if !self.limiter.try_acquire() {
            warn!(conn = %self.conn, error = %RelayError::RateLimited, "dropping frame");
            return Outcome::NoOp;
        }
        match serde_json::from_str::<ClientEvent>(raw) {
            Ok(ev) => self.relay.handle_event(self.conn, ev).await,
            Err(e) => {
                warn!(conn = %self.conn, error = %RelayError::from(e), "dropping frame");
                Outcome::NoOp
            }
        }
    }

    pub async fn close(self) -> Outcome {
        self.relay.disconnect(self.conn).await
    }
}
