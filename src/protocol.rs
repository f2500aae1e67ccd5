//! `{"event": ..., "data": ...}` frames.

use serde::{Deserialize, Serialize};

use crate::codec::{DrawingObject, ObjectId};

pub type RoomId = String;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self { Self { x, y } }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub zoom: f64,
    pub pan:  Point,
}

/// Target of an undo/redo: the full object, or just its id when the sender
/// expects the server to know the object already.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectData {
    Object(DrawingObject),
    Ref { id: ObjectId },
}

impl ObjectData {
    pub fn id(&self) -> ObjectId {
        match self {
            Self::Object(o)   => o.id,
            Self::Ref { id }  => *id,
        }
    }

    pub fn object(&self) -> Option<&DrawingObject> {
        match self {
            Self::Object(o) => Some(o),
            Self::Ref { .. } => None,
        }
    }
}

fn anonymous() -> String { "Anonymous".into() }

/* ------------ client -> relay ------------ */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Join {
        room: RoomId,
        #[serde(rename = "userName", default = "anonymous")]
        user_name: String,
    },
    CursorMove { room: RoomId, x: f64, y: f64 },
    Draw { room: RoomId, path: DrawingObject },
    Undo {
        room: RoomId,
        #[serde(rename = "objectData", default, skip_serializing_if = "Option::is_none")]
        object_data: Option<ObjectData>,
    },
    Redo {
        room: RoomId,
        #[serde(rename = "objectData", default, skip_serializing_if = "Option::is_none")]
        object_data: Option<ObjectData>,
    },
    Clear { room: RoomId },
    ViewportUpdate { room: RoomId, viewport: Viewport },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. }           => "join",
            Self::CursorMove { .. }     => "cursor_move",
            Self::Draw { .. }           => "draw",
            Self::Undo { .. }           => "undo",
            Self::Redo { .. }           => "redo",
            Self::Clear { .. }          => "clear",
            Self::ViewportUpdate { .. } => "viewport_update",
        }
    }

    pub fn room(&self) -> &str {
        match self {
            Self::Join { room, .. }
            | Self::CursorMove { room, .. }
            | Self::Draw { room, .. }
            | Self::Undo { room, .. }
            | Self::Redo { room, .. }
            | Self::Clear { room }
            | Self::ViewportUpdate { room, .. } => room,
        }
    }
}

/* ------------ relay -> client ------------ */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    UserJoined { count: usize },
    UserLeft { count: usize },
    CursorUpdate {
        room: RoomId,
        #[serde(rename = "userName")]
        user_name: String,
        x: f64,
        y: f64,
    },
    DrawUpdate { room: RoomId, path: DrawingObject },
    UndoUpdate {
        room: RoomId,
        #[serde(rename = "objectData", default, skip_serializing_if = "Option::is_none")]
        object_data: Option<ObjectData>,
    },
    RedoUpdate {
        room: RoomId,
        #[serde(rename = "objectData", default, skip_serializing_if = "Option::is_none")]
        object_data: Option<ObjectData>,
    },
    ViewportUpdate { room: RoomId, viewport: Viewport },
    ClearBoard,
    Error { message: String },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserJoined { .. }     => "user_joined",
            Self::UserLeft { .. }       => "user_left",
            Self::CursorUpdate { .. }   => "cursor_update",
            Self::DrawUpdate { .. }     => "draw_update",
            Self::UndoUpdate { .. }     => "undo_update",
            Self::RedoUpdate { .. }     => "redo_update",
            Self::ViewportUpdate { .. } => "viewport_update",
            Self::ClearBoard            => "clear_board",
            Self::Error { .. }          => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_defaults_user_name() {
        let ev: ClientEvent =
            serde_json::from_value(json!({"event": "join", "data": {"room": "R1"}})).unwrap();
        assert_eq!(ev, ClientEvent::Join { room: "R1".into(), user_name: "Anonymous".into() });
    }

    #[test]
    fn clear_board_has_no_payload() {
        let v = serde_json::to_value(ServerEvent::ClearBoard).unwrap();
        assert_eq!(v, json!({"event": "clear_board"}));
    }

    #[test]
    fn undo_accepts_bare_id_or_full_object() {
        let id = uuid::Uuid::new_v4();
        let by_ref: ClientEvent = serde_json::from_value(json!({
            "event": "undo", "data": {"room": "R1", "objectData": {"id": id}}
        }))
        .unwrap();
        let ClientEvent::Undo { object_data: Some(data), .. } = by_ref else { panic!("{by_ref:?}") };
        assert_eq!(data, ObjectData::Ref { id });

        let full: ClientEvent = serde_json::from_value(json!({
            "event": "undo", "data": {"room": "R1", "objectData": {"id": id, "type": "circle", "radius": 4}}
        }))
        .unwrap();
        let ClientEvent::Undo { object_data: Some(data), .. } = full else { panic!("{full:?}") };
        assert_eq!(data.id(), id);
        assert!(data.object().is_some());
    }

    #[test]
    fn cursor_update_uses_wire_names() {
        let v = serde_json::to_value(ServerEvent::CursorUpdate {
            room: "R1".into(), user_name: "ana".into(), x: 1.0, y: 2.0,
        })
        .unwrap();
        assert_eq!(v, json!({"event": "cursor_update", "data": {"room": "R1", "userName": "ana", "x": 1.0, "y": 2.0}}));
    }

    #[test]
    fn unknown_event_is_rejected() {
        let r = serde_json::from_value::<ClientEvent>(json!({"event": "explode", "data": {}}));
        assert!(r.is_err());
    }
}
