//! Room registry: connection -> room, room -> members.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use tokio::{
    sync::{mpsc, RwLock},
    time::Instant,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    client::HistoryStack,
    codec::DrawingObject,
    protocol::{RoomId, ServerEvent},
};

pub type ConnId = Uuid;
pub type Outbound = mpsc::Sender<ServerEvent>;

/* ------------ one connected socket ------------ */
struct Member {
    name:    String,
    room:    Option<RoomId>,
    tx:      Outbound,
    /// The participant's own strokes in the current room.
    history: HistoryStack<DrawingObject>,
}

#[derive(Default)]
struct RoomEntry {
    members:     HashSet<ConnId>,
    empty_since: Option<Instant>,
}

#[derive(Default)]
struct Inner {
    conns: HashMap<ConnId, Member>,
    rooms: HashMap<RoomId, RoomEntry>,
}

impl Inner {
    /// Takes `conn` out of its current room. Returns the room and its new size.
    fn detach(&mut self, conn: ConnId) -> Option<Departure> {
        let member = self.conns.get_mut(&conn)?;
        let room = member.room.take()?;
        member.history.clear();

        let entry = self.rooms.entry(room.clone()).or_default();
        entry.members.remove(&conn);
        let count = entry.members.len();
        if count == 0 {
            entry.empty_since = Some(Instant::now());
        }
        Some(Departure { room, count })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room:  RoomId,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub room:     RoomId,
    pub count:    usize,
    /// Same room as before; only the display name may have changed.
    pub rejoined: bool,
    /// Set when the join moved the connection out of another room.
    pub previous: Option<Departure>,
}

#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl RoomRegistry {
    pub fn new() -> Self { Self::default() }

    pub async fn connect(&self, conn: ConnId, tx: Outbound) {
        let member = Member { name: String::new(), room: None, tx, history: HistoryStack::new() };
        self.inner.write().await.conns.insert(conn, member);
        debug!(%conn, "connection registered");
    }

    /// `None` when the connection was never registered (or already gone).
    pub async fn join(&self, conn: ConnId, room: &str, name: &str) -> Option<Membership> {
        let mut inner = self.inner.write().await;
        let member = inner.conns.get_mut(&conn)?;
        member.name = name.to_owned();

        if member.room.as_deref() == Some(room) {
            let count = inner.rooms.get(room).map_or(0, |r| r.members.len());
            return Some(Membership { room: room.to_owned(), count, rejoined: true, previous: None });
        }

        let previous = inner.detach(conn);
        if let Some(member) = inner.conns.get_mut(&conn) {
            member.room = Some(room.to_owned());
        }
        let entry = inner.rooms.entry(room.to_owned()).or_default();
        entry.members.insert(conn);
        entry.empty_since = None;
        let count = entry.members.len();

        info!(%conn, room, name, count, "joined room");
        Some(Membership { room: room.to_owned(), count, rejoined: false, previous })
    }

    /// Leaves the current room but keeps the connection registered.
    pub async fn leave(&self, conn: ConnId) -> Option<Departure> {
        let left = self.inner.write().await.detach(conn);
        if let Some(d) = &left {
            info!(%conn, room = %d.room, count = d.count, "left room");
        }
        left
    }

    /// Connection closed, cleanly or not.
    pub async fn disconnect(&self, conn: ConnId) -> Option<Departure> {
        let mut inner = self.inner.write().await;
        let left = inner.detach(conn);
        inner.conns.remove(&conn);
        match &left {
            Some(d) => info!(%conn, room = %d.room, count = d.count, "disconnected"),
            None => debug!(%conn, "disconnected outside any room"),
        }
        left
    }

    pub async fn members_of(&self, room: &str) -> HashSet<ConnId> {
        self.inner.read().await.rooms.get(room).map(|r| r.members.clone()).unwrap_or_default()
    }

    pub async fn count(&self, room: &str) -> usize {
        self.inner.read().await.rooms.get(room).map_or(0, |r| r.members.len())
    }

    /// Current room and display name of a connection.
    pub async fn seat_of(&self, conn: ConnId) -> Option<(RoomId, String)> {
        let inner = self.inner.read().await;
        let m = inner.conns.get(&conn)?;
        Some((m.room.clone()?, m.name.clone()))
    }

    /// Runs `f` on the connection's own undo/redo history.
    pub async fn with_history<R>(
        &self,
        conn: ConnId,
        f: impl FnOnce(&mut HistoryStack<DrawingObject>) -> R,
    ) -> Option<R> {
        let mut inner = self.inner.write().await;
        inner.conns.get_mut(&conn).map(|m| f(&mut m.history))
    }

    /// Empties every member's history after the room was cleared.
    pub async fn reset_histories(&self, room: &str) {
        let mut inner = self.inner.write().await;
        for member in inner.conns.values_mut().filter(|m| m.room.as_deref() == Some(room)) {
            member.history.clear();
        }
    }

    /// Fire-and-forget fan-out to a room. A full outbound queue drops the event
    /// for that peer only. Returns how many peers took it.
    pub async fn broadcast(&self, room: &str, ev: &ServerEvent, exclude: Option<ConnId>) -> usize {
        let inner = self.inner.read().await;
        let Some(entry) = inner.rooms.get(room) else { return 0 };

        let mut delivered = 0;
        for conn in entry.members.iter().filter(|c| Some(**c) != exclude) {
            let Some(member) = inner.conns.get(conn) else { continue };
            match member.tx.try_send(ev.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(%conn, room, event = ev.name(), "outbound queue full, dropping");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(%conn, room, "outbound queue closed");
                }
            }
        }
        delivered
    }

    /// Sends to a single connection.
    pub async fn send_to(&self, conn: ConnId, ev: ServerEvent) -> bool {
        let inner = self.inner.read().await;
        inner.conns.get(&conn).is_some_and(|m| m.tx.try_send(ev).is_ok())
    }

    /// Forgets rooms that have been empty for at least `grace`.
    pub async fn reap_empty(&self, grace: Duration) -> Vec<RoomId> {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        let expired: Vec<RoomId> = inner
            .rooms
            .iter()
            .filter(|(_, r)| {
                r.members.is_empty() && r.empty_since.is_some_and(|t| now.duration_since(t) >= grace)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            inner.rooms.remove(id);
        }
        expired
    }

    pub async fn room_count(&self) -> usize { self.inner.read().await.rooms.len() }
}
