//! Durable tier: every room's drawing history in SQLite.

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error};

use crate::codec::{self, CodecError, DrawingObject, ObjectId};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Db(#[from] sqlx::Error),

    #[error("encode: {0}")]
    Codec(#[from] CodecError),
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS rooms (
        id          TEXT PRIMARY KEY,
        created_at  TEXT NOT NULL,
        last_active TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS drawings (
        seq        INTEGER PRIMARY KEY AUTOINCREMENT,
        room_id    TEXT NOT NULL,
        object_id  TEXT NOT NULL,
        data       TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (room_id, object_id)
    )",
    "CREATE INDEX IF NOT EXISTS drawings_room ON drawings (room_id, seq)",
];

#[derive(Clone)]
pub struct DurableStore {
    pool:  SqlitePool,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl DurableStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(url).await?;
        Self::open(pool).await
    }

    /// A private in-memory database. One pinned connection, so every query
    /// sees the same database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::open(pool).await
    }

    pub async fn open(pool: SqlitePool) -> Result<Self, StoreError> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&pool).await?;
        }
        Ok(Self { pool, locks: Arc::default() })
    }

    pub fn pool(&self) -> &SqlitePool { &self.pool }

    /// Per-room write lock. Held by the caller across a durable write and
    /// whatever fast-tier patch follows it.
    pub async fn lock_room(&self, room: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(room.to_owned()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drops the write lock of a room nobody is using.
    pub async fn forget_room(&self, room: &str) {
        let mut locks = self.locks.lock().await;
        if locks.get(room).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(room);
        }
    }

    /// Creates the room row on first sight, bumps `last_active` otherwise.
    pub async fn touch_room(&self, room: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO rooms (id, created_at, last_active) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET last_active = excluded.last_active",
        )
        .bind(room)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Appends an object. Re-drawing an existing id replaces its data in place.
    pub async fn append(&self, room: &str, obj: &DrawingObject) -> Result<(), StoreError> {
        let data = codec::encode(obj)?;
        sqlx::query(
            "INSERT INTO drawings (room_id, object_id, data, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(room_id, object_id) DO UPDATE SET data = excluded.data",
        )
        .bind(room)
        .bind(obj.id.to_string())
        .bind(&data)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        debug!(room, object = %obj.id, "drawing persisted");
        Ok(())
    }

    /// Removes one object. `false` when it was not there.
    pub async fn remove(&self, room: &str, id: ObjectId) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM drawings WHERE room_id = ? AND object_id = ?")
            .bind(room)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Re-adds an object at the end of the history. `false` when it is already present.
    pub async fn restore(&self, room: &str, obj: &DrawingObject) -> Result<bool, StoreError> {
        let data = codec::encode(obj)?;
        let res = sqlx::query(
            "INSERT OR IGNORE INTO drawings (room_id, object_id, data, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(room)
        .bind(obj.id.to_string())
        .bind(&data)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn clear(&self, room: &str) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM drawings WHERE room_id = ?")
            .bind(room)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    /// Full history in original order. Rows that no longer decode are skipped.
    pub async fn load(&self, room: &str) -> Result<Vec<DrawingObject>, StoreError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT data FROM drawings WHERE room_id = ? ORDER BY seq")
                .bind(room)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(data,)| match codec::decode(&data) {
                Ok(obj) => Some(obj),
                Err(e) => {
                    error!(room, error = %e, "skipping undecodable drawing row");
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn obj(n: i64) -> DrawingObject {
        let mut m = Map::new();
        m.insert("n".into(), json!(n));
        DrawingObject::new("path", m)
    }

    #[tokio::test]
    async fn history_keeps_order_and_room_partitioning() {
        let store = DurableStore::in_memory().await.unwrap();
        let (a, b, c) = (obj(1), obj(2), obj(3));
        store.append("R1", &a).await.unwrap();
        store.append("R2", &b).await.unwrap();
        store.append("R1", &c).await.unwrap();

        assert_eq!(store.load("R1").await.unwrap(), vec![a, c]);
        assert_eq!(store.load("R2").await.unwrap(), vec![b]);
        assert!(store.load("R3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_and_restore_are_idempotent() {
        let store = DurableStore::in_memory().await.unwrap();
        let (a, b) = (obj(1), obj(2));
        store.append("R1", &a).await.unwrap();
        store.append("R1", &b).await.unwrap();

        assert!(store.remove("R1", a.id).await.unwrap());
        assert!(!store.remove("R1", a.id).await.unwrap());
        assert!(store.restore("R1", &a).await.unwrap());
        assert!(!store.restore("R1", &a).await.unwrap());
        assert_eq!(store.load("R1").await.unwrap(), vec![b, a]);
    }

    #[tokio::test]
    async fn redraw_keeps_position() {
        let store = DurableStore::in_memory().await.unwrap();
        let (a, b) = (obj(1), obj(2));
        store.append("R1", &a).await.unwrap();
        store.append("R1", &b).await.unwrap();

        let mut a2 = a.clone();
        a2.fields.insert("n".into(), json!(10));
        store.append("R1", &a2).await.unwrap();
        assert_eq!(store.load("R1").await.unwrap(), vec![a2, b]);
    }

    #[tokio::test]
    async fn clear_only_touches_one_room() {
        let store = DurableStore::in_memory().await.unwrap();
        store.append("R1", &obj(1)).await.unwrap();
        store.append("R1", &obj(2)).await.unwrap();
        store.append("R2", &obj(3)).await.unwrap();

        assert_eq!(store.clear("R1").await.unwrap(), 2);
        assert!(store.load("R1").await.unwrap().is_empty());
        assert_eq!(store.load("R2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_rows_are_skipped() {
        let store = DurableStore::in_memory().await.unwrap();
        let good = obj(1);
        store.append("R1", &good).await.unwrap();
        sqlx::query("INSERT INTO drawings (room_id, object_id, data, created_at) VALUES ('R1', 'x', '{oops', '')")
            .execute(store.pool())
            .await
            .unwrap();
        assert_eq!(store.load("R1").await.unwrap(), vec![good]);
    }

    #[tokio::test]
    async fn closed_pool_surfaces_errors() {
        let store = DurableStore::in_memory().await.unwrap();
        store.pool().close().await;
        assert!(matches!(store.append("R1", &obj(1)).await, Err(StoreError::Db(_))));
    }
}
