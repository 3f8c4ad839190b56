//! Document encoding and decoding.
//!
//! Encoding goes through `serde_json::Value`, whose object map is ordered by
//! key, so the output is key-sorted and byte-stable for equal content.
//! Floats are parsed with serde_json's `float_roundtrip` feature, so every
//! finite `f64` decodes to the exact value that was encoded.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::ser::Error as _;

use super::error::StoreError;
use super::types::{Document, DOCUMENT_KEYS, OVERLAY_KEYS};

/// Serialize a document to canonical, pretty-printed JSON.
pub fn encode_document(doc: &Document) -> Result<Vec<u8>, StoreError> {
    check_finite(doc)?;
    let doc = without_shadowed_keys(doc);

    let value = serde_json::to_value(doc.as_ref()).map_err(StoreError::Encode)?;
    let mut bytes = serde_json::to_vec_pretty(&value).map_err(StoreError::Encode)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parse a document. Missing fields and wrong shapes are decode errors.
pub fn decode_document(bytes: &[u8]) -> Result<Document, StoreError> {
    serde_json::from_slice(bytes).map_err(StoreError::Decode)
}

/// A flattened `extra` entry named like a real field would overwrite that
/// field in the encoded object.
fn without_shadowed_keys(doc: &Document) -> Cow<'_, Document> {
    let shadows = |extra: &BTreeMap<String, serde_json::Value>, keys: &[&str]| {
        keys.iter().any(|key| extra.contains_key(*key))
    };
    if !shadows(&doc.extra, &DOCUMENT_KEYS)
        && !doc.overlays.iter().any(|o| shadows(&o.extra, &OVERLAY_KEYS))
    {
        return Cow::Borrowed(doc);
    }

    let mut doc = doc.clone();
    strip_keys(&mut doc.extra, &DOCUMENT_KEYS);
    for overlay in &mut doc.overlays {
        strip_keys(&mut overlay.extra, &OVERLAY_KEYS);
    }
    Cow::Owned(doc)
}

fn strip_keys(extra: &mut BTreeMap<String, serde_json::Value>, keys: &[&str]) {
    for key in keys {
        if extra.remove(*key).is_some() {
            log::warn!("Dropping extra key {key:?} that shadows a document field");
        }
    }
}

/// JSON has no NaN or infinity; serde_json would quietly write `null`
/// and the next decode would fail.
fn check_finite(doc: &Document) -> Result<(), StoreError> {
    for overlay in &doc.overlays {
        let values = [
            ("position.x", overlay.position.x),
            ("position.y", overlay.position.y),
            ("size.width", overlay.size.width),
            ("size.height", overlay.size.height),
            ("rotation", overlay.rotation),
        ];
        for (field, value) in values {
            if !value.is_finite() {
                return Err(StoreError::Encode(serde_json::Error::custom(format!(
                    "overlay {}: {field} is not a finite number",
                    overlay.id
                ))));
            }
        }
    }
    Ok(())
}
