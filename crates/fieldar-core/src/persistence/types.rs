//! Persistence data types.
//!
//! # Data Model Overview
//!
//! Each machine folder holds one `overlays.json`:
//!
//! ```text
//! {
//!   "base_image": "base_photo.png",
//!   "last_modified": "2024-05-01T12:00:00Z",
//!   "machine_id": "M1",
//!   "overlays": [
//!     {
//!       "id": "...",
//!       "imageName": "bolt.png",
//!       "layerIndex": 0,
//!       "position": { "x": 0.5, "y": 0.25 },
//!       "rotation": 90.0,
//!       "size": { "height": 0.1, "width": 0.2 }
//!     }
//!   ],
//!   "redo_history": [],
//!   "undo_history": []
//! }
//! ```
//!
//! Coordinates are fractions of the base image's dimensions. The store
//! keeps them as given; range checks belong to the drawing UI.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::layout::BASE_IMAGE_FILENAME;

/// Top-level keys owned by [`Document`]'s own fields.
pub const DOCUMENT_KEYS: [&str; 6] = [
    "base_image",
    "last_modified",
    "machine_id",
    "overlays",
    "redo_history",
    "undo_history",
];

/// Keys owned by [`Overlay`]'s own fields.
pub const OVERLAY_KEYS: [&str; 6] = ["id", "imageName", "layerIndex", "position", "rotation", "size"];

/// The per-machine overlay document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Must match the name of the machine folder that holds it.
    pub machine_id: String,

    /// File name of the base image inside the machine folder.
    pub base_image: String,

    /// ISO-8601 timestamp. Owned by the caller; saving never restamps it.
    pub last_modified: String,

    pub overlays: Vec<Overlay>,

    /// Reserved. Opaque to the store.
    pub undo_history: Vec<String>,

    /// Reserved. Opaque to the store.
    pub redo_history: Vec<String>,

    /// Keys this version does not know about, written back unchanged.
    /// Entries named like a field in [`DOCUMENT_KEYS`] are dropped on encode.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Document {
    /// An empty document for `machine_id` pointing at the default base image.
    pub fn new(machine_id: impl Into<String>, last_modified: impl Into<String>) -> Self {
        Self {
            machine_id: machine_id.into(),
            base_image: BASE_IMAGE_FILENAME.to_string(),
            last_modified: last_modified.into(),
            overlays: Vec::new(),
            undo_history: Vec::new(),
            redo_history: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn find_overlay(&self, id: &str) -> Option<&Overlay> {
        self.overlays.iter().find(|o| o.id == id)
    }

    /// Overlay image names referenced by this document, in layer order.
    pub fn referenced_images(&self) -> Vec<&str> {
        let mut overlays: Vec<&Overlay> = self.overlays.iter().collect();
        overlays.sort_by_key(|o| o.layer_index);
        overlays.iter().map(|o| o.image_name.as_str()).collect()
    }
}

/// One overlay image placed on the base image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlay {
    /// Unique within a document (caller-maintained).
    pub id: String,

    /// File name inside `overlay_images/`.
    pub image_name: String,

    pub position: NormalizedPoint,

    pub size: NormalizedSize,

    /// Degrees.
    pub rotation: f64,

    pub layer_index: i64,

    /// Unknown keys. Entries named in [`OVERLAY_KEYS`] are dropped on encode.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSize {
    pub width: f64,
    pub height: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlay(id: &str, image: &str, layer: i64) -> Overlay {
        Overlay {
            id: id.to_string(),
            image_name: image.to_string(),
            position: NormalizedPoint { x: 0.5, y: 0.5 },
            size: NormalizedSize {
                width: 0.1,
                height: 0.1,
            },
            rotation: 0.0,
            layer_index: layer,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn new_document_is_empty() {
        let doc = Document::new("M1", "2024-01-01T00:00:00Z");

        assert_eq!(doc.machine_id, "M1");
        assert_eq!(doc.base_image, "base_photo.png");
        assert_eq!(doc.last_modified, "2024-01-01T00:00:00Z");
        assert!(doc.overlays.is_empty());
        assert!(doc.undo_history.is_empty());
        assert!(doc.redo_history.is_empty());
        assert!(doc.extra.is_empty());
    }

    #[test]
    fn overlay_uses_camel_case_keys() {
        let value = serde_json::to_value(overlay("o1", "bolt.png", 2)).unwrap();

        assert_eq!(value["imageName"], "bolt.png");
        assert_eq!(value["layerIndex"], 2);
        assert!(value.get("image_name").is_none());
    }

    #[test]
    fn document_uses_snake_case_keys() {
        let value = serde_json::to_value(Document::new("M1", "t")).unwrap();

        assert!(value.get("machine_id").is_some());
        assert!(value.get("undo_history").is_some());
        assert!(value.get("redo_history").is_some());
    }

    #[test]
    fn reserved_key_lists_match_serialized_fields() {
        let doc_value = serde_json::to_value(Document::new("M1", "t")).unwrap();
        let mut doc_keys: Vec<&str> = doc_value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        doc_keys.sort();
        assert_eq!(doc_keys, DOCUMENT_KEYS.to_vec());

        let overlay_value = serde_json::to_value(overlay("o1", "a.png", 0)).unwrap();
        let mut overlay_keys: Vec<&str> = overlay_value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        overlay_keys.sort();
        assert_eq!(overlay_keys, OVERLAY_KEYS.to_vec());
    }

    #[test]
    fn find_overlay_by_id() {
        let mut doc = Document::new("M1", "t");
        doc.overlays.push(overlay("o1", "a.png", 0));
        doc.overlays.push(overlay("o2", "b.png", 1));

        assert_eq!(doc.find_overlay("o2").unwrap().image_name, "b.png");
        assert!(doc.find_overlay("o3").is_none());
    }

    #[test]
    fn referenced_images_follow_layer_order() {
        let mut doc = Document::new("M1", "t");
        doc.overlays.push(overlay("top", "top.png", 5));
        doc.overlays.push(overlay("bottom", "bottom.png", 0));

        assert_eq!(doc.referenced_images(), vec!["bottom.png", "top.png"]);
    }
}
