//! Tiered room state: a TTL fast tier in front of the SQLite history.

pub mod durable;
pub mod fast;

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    codec::{DrawingObject, ObjectId},
    config::CacheTtls,
    protocol::{Point, RoomId},
    registry::ConnId,
};
pub use durable::{DurableStore, StoreError};
pub use fast::TtlCache;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorEntry {
    pub user_name: String,
    pub x:         f64,
    pub y:         f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub user_name: String,
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub user_count:  usize,
    pub last_update: DateTime<Utc>,
}

#[derive(Default)]
struct FastTier {
    cursors:  TtlCache<(RoomId, ConnId), CursorEntry>,
    presence: TtlCache<RoomId, HashMap<ConnId, Presence>>,
    batches:  TtlCache<RoomId, Vec<DrawingObject>>,
    states:   TtlCache<RoomId, RoomSnapshot>,
    stamps:   HashMap<RoomId, u64>,
    clock:    u64,
}

impl FastTier {
    fn bump(&mut self, room: &str) {
        self.clock += 1;
        self.stamps.insert(room.to_owned(), self.clock);
    }

    fn stamp(&self, room: &str) -> u64 {
        self.stamps.get(room).copied().unwrap_or(0)
    }
}

#[derive(Clone)]
pub struct RoomCache {
    fast:    Arc<RwLock<FastTier>>,
    durable: DurableStore,
    ttls:    CacheTtls,
}

impl RoomCache {
    pub fn new(durable: DurableStore, ttls: CacheTtls) -> Self {
        Self { fast: Arc::default(), durable, ttls }
    }

    pub fn durable(&self) -> &DurableStore { &self.durable }

    /* ---------------- drawings ---------------- */

    /// Surviving drawings of a room, in original order.
    pub async fn hydrate(&self, room: &str) -> Result<Vec<DrawingObject>, StoreError> {
        let stamp = {
            let mut fast = self.fast.write().await;
            if let Some(batch) = fast.batches.get(room) {
                debug!(room, objects = batch.len(), "drawing batch hit");
                return Ok(batch.clone());
            }
            fast.stamp(room)
        };

        let drawings = self.durable.load(room).await?;
        debug!(room, objects = drawings.len(), "drawing batch miss, loaded durable history");

        let mut fast = self.fast.write().await;
        if fast.stamp(room) == stamp {
            fast.batches.insert(room.to_owned(), drawings.clone(), self.ttls.drawing_batch);
        }
        Ok(drawings)
    }

    /// Mutations hold the room's write lock across both tiers, so the batch is
    /// patched in the order SQLite committed.
    pub async fn record_draw(&self, room: &str, obj: &DrawingObject) -> Result<(), StoreError> {
        let _guard = self.durable.lock_room(room).await;
        self.durable.append(room, obj).await?;

        let mut fast = self.fast.write().await;
        fast.bump(room);
        if let Some(batch) = fast.batches.get_mut(room) {
            match batch.iter_mut().find(|o| o.id == obj.id) {
                Some(slot) => *slot = obj.clone(),
                None => batch.push(obj.clone()),
            }
        }
        Ok(())
    }

    /// `false` when the object was not in the room's history.
    pub async fn remove_object(&self, room: &str, id: ObjectId) -> Result<bool, StoreError> {
        let _guard = self.durable.lock_room(room).await;
        let removed = self.durable.remove(room, id).await?;
        if removed {
            let mut fast = self.fast.write().await;
            fast.bump(room);
            if let Some(batch) = fast.batches.get_mut(room) {
                batch.retain(|o| o.id != id);
            }
        }
        Ok(removed)
    }

    /// `false` when the object was already in the room's history.
    pub async fn restore_object(&self, room: &str, obj: &DrawingObject) -> Result<bool, StoreError> {
        let _guard = self.durable.lock_room(room).await;
        let restored = self.durable.restore(room, obj).await?;
        if restored {
            let mut fast = self.fast.write().await;
            fast.bump(room);
            if let Some(batch) = fast.batches.get_mut(room) {
                batch.push(obj.clone());
            }
        }
        Ok(restored)
    }

    pub async fn clear_room(&self, room: &str) -> Result<u64, StoreError> {
        let _guard = self.durable.lock_room(room).await;
        let removed = self.durable.clear(room).await?;
        let mut fast = self.fast.write().await;
        fast.bump(room);
        fast.batches.remove(room);
        info!(room, removed, "room cleared");
        Ok(removed)
    }

    pub async fn touch_room(&self, room: &str) -> Result<(), StoreError> {
        self.durable.touch_room(room).await
    }

    /* ---------------- cursors ---------------- */

    /// Best effort: skipped when the fast tier is busy.
    pub fn cache_cursor(&self, room: &str, conn: ConnId, user_name: &str, at: Point) -> bool {
        let Ok(mut fast) = self.fast.try_write() else {
            debug!(room, %conn, "fast tier busy, cursor not cached");
            return false;
        };
        let entry = CursorEntry {
            user_name: user_name.to_owned(),
            x: at.x,
            y: at.y,
            timestamp: Utc::now(),
        };
        fast.cursors.insert((room.to_owned(), conn), entry, self.ttls.cursor);
        true
    }

    pub async fn cursors(&self, room: &str) -> HashMap<ConnId, CursorEntry> {
        let fast = self.fast.read().await;
        fast.cursors
            .live_where(|(r, _)| r == room)
            .map(|((_, conn), entry)| (*conn, entry.clone()))
            .collect()
    }

    /* ---------------- presence / room state ---------------- */

    /// Adds or refreshes a participant in the room roster; the roster TTL restarts.
    pub async fn track_presence(&self, room: &str, conn: ConnId, user_name: &str) {
        let now = Utc::now();
        let mut fast = self.fast.write().await;
        let mut roster = fast.presence.remove(room).unwrap_or_default();
        roster
            .entry(conn)
            .and_modify(|p| {
                p.user_name = user_name.to_owned();
                p.last_seen = now;
            })
            .or_insert_with(|| Presence { user_name: user_name.to_owned(), joined_at: now, last_seen: now });
        fast.presence.insert(room.to_owned(), roster, self.ttls.presence);
    }

    pub async fn drop_presence(&self, room: &str, conn: ConnId) {
        let mut fast = self.fast.write().await;
        fast.cursors.remove(&(room.to_owned(), conn));
        if let Some(roster) = fast.presence.get_mut(room) {
            roster.remove(&conn);
        }
    }

    pub async fn active_users(&self, room: &str) -> HashMap<ConnId, Presence> {
        self.fast.write().await.presence.get(room).cloned().unwrap_or_default()
    }

    pub async fn record_member_count(&self, room: &str, user_count: usize) {
        let snap = RoomSnapshot { user_count, last_update: Utc::now() };
        self.fast.write().await.states.insert(room.to_owned(), snap, self.ttls.room_state);
    }

    pub async fn room_state(&self, room: &str) -> Option<RoomSnapshot> {
        self.fast.write().await.states.get(room).cloned()
    }

    /* ---------------- reclamation ---------------- */

    /// Drops everything the fast tier holds for a room. Durable history stays.
    pub async fn evict_room(&self, room: &str) {
        {
            let mut fast = self.fast.write().await;
            fast.cursors.remove_where(|(r, _)| r == room);
            fast.presence.remove(room);
            fast.batches.remove(room);
            fast.states.remove(room);
            fast.stamps.remove(room);
        }
        self.durable.forget_room(room).await;
        debug!(room, "fast tier evicted");
    }

    /// Reclaims expired fast-tier entries. Returns how many were dropped.
    pub async fn sweep(&self) -> usize {
        let mut fast = self.fast.write().await;
        fast.cursors.sweep() + fast.presence.sweep() + fast.batches.sweep() + fast.states.sweep()
    }
}
