//! routes/rooms.rs
use std::collections::HashMap;

use axum::{
    extract::{Extension, Path},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::{error, info};

use crate::{
    cache::{CursorEntry, Presence, RoomCache},
    codec::DrawingObject,
    error::{bad, AppResult},
    registry::{ConnId, RoomRegistry},
};

#[derive(Serialize)]
pub struct DrawingsJson {
    pub drawings: Vec<DrawingObject>,
}

#[derive(Serialize)]
pub struct PresenceJson {
    pub count:   usize,
    pub users:   HashMap<ConnId, Presence>,
    pub cursors: HashMap<ConnId, CursorEntry>,
}

pub fn router() -> Router {
    Router::new()
        .route("/room/:id/drawings", get(drawings))
        .route("/room/:id/presence", get(presence))
}

/* ---------------- hydration ---------------- */
async fn drawings(
    Path(id): Path<String>,
    Extension(cache): Extension<RoomCache>,
) -> AppResult<Json<DrawingsJson>> {
    if id.trim().is_empty() {
        return Err(bad("empty room id"));
    }
    if let Err(e) = cache.touch_room(&id).await {
        error!(room = %id, error = %e, "could not record room activity");
    }

    let drawings = cache.hydrate(&id).await?;
    info!(room = %id, count = drawings.len(), "serving drawings");
    Ok(Json(DrawingsJson { drawings }))
}

/* ---------------- who is here ---------------- */
async fn presence(
    Path(id): Path<String>,
    Extension(cache): Extension<RoomCache>,
    Extension(registry): Extension<RoomRegistry>,
) -> Json<PresenceJson> {
    Json(PresenceJson {
        count:   registry.count(&id).await,
        users:   cache.active_users(&id).await,
        cursors: cache.cursors(&id).await,
    })
}
