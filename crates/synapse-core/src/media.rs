//! Normalization of media descriptors embedded in capture metadata.
//!
//! Capture agents send `metadata.content.images` and
//! `metadata.content.videos` in whatever shape the page produced. Before a
//! row is written these lists are reduced to a fixed set of fields so the
//! stored shape is predictable for search and display.

use serde_json::{Map, Value};

const IMAGE_FIELDS: [&str; 4] = ["src", "alt", "thumbnail", "dataUrl"];
const VIDEO_FIELDS: [&str; 2] = ["src", "thumbnail"];

/// Normalize `content.images` and `content.videos` in place.
///
/// Object entries keep only the known string fields, bare strings become
/// `{"src": ...}`, and anything else is dropped. Entries left with neither
/// a `src` nor a `dataUrl` are dropped too. A non-list value is replaced by
/// an empty list.
pub fn normalize_media(metadata: &mut Value) {
    let Some(content) = metadata.get_mut("content").and_then(Value::as_object_mut) else {
        return;
    };
    for (key, fields) in [("images", &IMAGE_FIELDS[..]), ("videos", &VIDEO_FIELDS[..])] {
        if let Some(list) = content.get_mut(key) {
            *list = Value::Array(normalize_list(list, fields));
        }
    }
}

fn normalize_list(list: &Value, fields: &[&str]) -> Vec<Value> {
    let Some(entries) = list.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| normalize_entry(entry, fields))
        .collect()
}

fn normalize_entry(entry: &Value, fields: &[&str]) -> Option<Value> {
    let mut out = Map::new();
    match entry {
        Value::String(src) => {
            out.insert("src".to_string(), Value::String(src.clone()));
        }
        Value::Object(obj) => {
            for field in fields {
                if let Some(Value::String(v)) = obj.get(*field) {
                    out.insert(field.to_string(), Value::String(v.clone()));
                }
            }
        }
        _ => return None,
    }
    let located = ["src", "dataUrl"]
        .iter()
        .any(|key| matches!(out.get(*key), Some(Value::String(v)) if !v.is_empty()));
    located.then_some(Value::Object(out))
}

/// Whether `metadata.content.<key>` is a non-empty list.
pub fn has_media(metadata: &Value, key: &str) -> bool {
    metadata
        .get("content")
        .and_then(|c| c.get(key))
        .and_then(Value::as_array)
        .map(|list| !list.is_empty())
        .unwrap_or(false)
}
