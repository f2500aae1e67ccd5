//! Drawing objects: `type` and `id` are checked, every other field passes through.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub type ObjectId = Uuid;

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("malformed drawing object: {0}")]
    Json(#[from] serde_json::Error),

    #[error("drawing object has an empty `type`")]
    EmptyKind,
}

/// Logical shape family, derived from the object's `type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Path,
    Rect,
    Circle,
    Line,
    Text,
    CursorMarker,
    Other,
}

impl ObjectKind {
    pub fn of(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "path"                   => Self::Path,
            "rect" | "rectangle"     => Self::Rect,
            "circle" | "ellipse"     => Self::Circle,
            "line"                   => Self::Line,
            "text" | "i-text" | "textbox" => Self::Text,
            "cursor" | "cursor-marker" => Self::CursorMarker,
            _                        => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingObject {
    #[serde(default = "Uuid::new_v4")]
    pub id: ObjectId,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl DrawingObject {
    pub fn new(kind: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self { id: Uuid::new_v4(), kind: kind.into(), fields }
    }

    pub fn object_kind(&self) -> ObjectKind { ObjectKind::of(&self.kind) }

    /// Checks the invariants the relay relies on.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.kind.trim().is_empty() {
            return Err(CodecError::EmptyKind);
        }
        Ok(())
    }
}

/// Compact JSON, used both on the wire and in the `drawings.data` column.
pub fn encode(obj: &DrawingObject) -> Result<String, CodecError> {
    Ok(serde_json::to_string(obj)?)
}

pub fn decode(raw: &str) -> Result<DrawingObject, CodecError> {
    let obj: DrawingObject = serde_json::from_str(raw)?;
    obj.validate()?;
    Ok(obj)
}

pub fn from_value(v: Value) -> Result<DrawingObject, CodecError> {
    let obj: DrawingObject = serde_json::from_value(v)?;
    obj.validate()?;
    Ok(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn style_fields_survive_storage_form() {
        let raw = r##"{"id":"7d9f1c1e-7a44-4a7e-9a55-1f1d1b3c2a10","type":"path","stroke":"#ff0000","strokeWidth":3,"path":[["M",1,2],["L",3,4]]}"##;
        let obj = decode(raw).unwrap();
        assert_eq!(obj.object_kind(), ObjectKind::Path);
        assert_eq!(obj.fields["stroke"], json!("#ff0000"));

        let again = decode(&encode(&obj).unwrap()).unwrap();
        assert_eq!(again, obj);
    }

    #[test]
    fn missing_id_gets_one_assigned() {
        let a = decode(r#"{"type":"rect","width":10}"#).unwrap();
        let b = decode(r#"{"type":"rect","width":10}"#).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn rejects_objects_without_type() {
        assert!(matches!(decode(r#"{"width":10}"#), Err(CodecError::Json(_))));
        assert!(matches!(decode(r#"{"type":"  "}"#), Err(CodecError::EmptyKind)));
        assert!(decode("not json").is_err());
    }

    #[test]
    fn unknown_kinds_are_carried_as_other() {
        let obj = from_value(json!({"type": "polygon", "points": []})).unwrap();
        assert_eq!(obj.object_kind(), ObjectKind::Other);
        assert_eq!(obj.kind, "polygon");
    }
}
