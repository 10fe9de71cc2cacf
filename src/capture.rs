//! The capture pipeline: classify, resolve segments, persist, notify.
//!
//! A capture carrying N segments is written as N rows sharing `url`,
//! `title`, `contentText`, `createdAt`, and an `allSegments` metadata list.
//! The first segment's row is the primary:
//!
//! ```json
//! { "allSegments": ["Videos", "Study"], "isMultiSegment": true,
//!   "isPrimarySegment": true, "contentType": { ... },
//!   "title": "...", "description": "..." }
//! ```
//!
//! Secondary rows carry `"isPrimarySegment": false` and
//! `"primarySegment": "Videos"` instead of the classifier details. All rows
//! of a capture are written in one [`ContentStore::insert_capture`] call,
//! so a storage failure leaves none of them behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use synapse_core::classify::{ClassificationSource, Classifier, Signals, FALLBACK_TITLE};
use synapse_core::media::{has_media, normalize_media};
use synapse_core::models::{ContentItem, NewContentRow, Segment};
use synapse_core::notify::{ContentEvent, Notifier};
use synapse_core::segments::{resolve_segments, Classification};
use synapse_core::store::ContentStore;

use crate::error::ServiceError;

/// A capture submitted by a client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "text")]
    pub content_text: String,
    #[serde(default, alias = "html")]
    pub content_html: String,
    #[serde(default)]
    pub element_type: Option<String>,
    /// A classification the client already obtained. When absent the
    /// configured classifier runs.
    #[serde(default)]
    pub classification: Option<Classification>,
    #[serde(default)]
    pub metadata: Value,
    /// Capture time for imported content; defaults to now.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// The result of a successful capture.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOutcome {
    /// Id of the primary row.
    pub id: String,
    /// Ids of all rows, primary first.
    pub ids: Vec<String>,
    pub segments: Vec<Segment>,
    pub is_multi_segment: bool,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classified_by: Option<ClassificationSource>,
}

/// Page signals derived from a capture request.
pub fn signals_for(request: &CaptureRequest) -> Signals {
    let text = if request.content_text.trim().is_empty() {
        request.title.clone()
    } else {
        request.content_text.clone()
    };
    Signals {
        text,
        has_images: has_media(&request.metadata, "images"),
        has_videos: has_media(&request.metadata, "videos"),
        has_links: has_media(&request.metadata, "links"),
        element_type: request.element_type.clone(),
    }
}

/// Run the capture pipeline for `owner_id`.
///
/// Nothing is written when validation, segment resolution, or the storage
/// write fails.
pub async fn capture_content(
    store: &dyn ContentStore,
    classifier: &dyn Classifier,
    notifier: &dyn Notifier,
    owner_id: &str,
    request: CaptureRequest,
) -> Result<CaptureOutcome, ServiceError> {
    let url = request.url.trim().to_string();
    if url.is_empty() {
        return Err(ServiceError::validation("url is required"));
    }
    if owner_id.trim().is_empty() {
        return Err(ServiceError::validation("owner is required"));
    }

    let (classification, classified_by) = match &request.classification {
        Some(supplied) => (supplied.clone(), None),
        None => {
            let result = classifier.classify(&signals_for(&request)).await;
            tracing::debug!(
                classifier = classifier.name(),
                source = ?result.source,
                categories = ?result.categories,
                "capture classified"
            );
            (Classification::from(&result), Some(result.source))
        }
    };

    let resolved = resolve_segments(&classification)?;

    let title = [Some(request.title.as_str()), classification.title.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|t| !t.is_empty() && *t != FALLBACK_TITLE)
        .unwrap_or(FALLBACK_TITLE)
        .to_string();

    let mut base = match request.metadata {
        Value::Object(map) => Value::Object(map),
        _ => Value::Object(Map::new()),
    };
    normalize_media(&mut base);

    let created_at = request.created_at.unwrap_or_else(Utc::now);
    let primary = resolved.primary();
    let all_segments: Vec<&str> = resolved.segments.iter().map(Segment::as_str).collect();

    let rows: Vec<NewContentRow> = resolved
        .segments
        .iter()
        .copied()
        .enumerate()
        .map(|(position, segment)| {
            let mut metadata = base.clone();
            if let Value::Object(map) = &mut metadata {
                map.insert("allSegments".to_string(), json!(all_segments));
                map.insert("isMultiSegment".to_string(), json!(resolved.is_multi_segment()));
                map.insert("contentType".to_string(), json!(resolved.content_type));
                if position == 0 {
                    map.insert("isPrimarySegment".to_string(), json!(true));
                    for key in ["title", "description"] {
                        if let Some(value) = resolved.metadata.get(key).filter(|v| !v.is_null()) {
                            map.insert(key.to_string(), value.clone());
                        }
                    }
                } else {
                    map.insert("isPrimarySegment".to_string(), json!(false));
                    map.insert("primarySegment".to_string(), json!(primary));
                }
            }
            NewContentRow {
                owner_id: owner_id.to_string(),
                url: url.clone(),
                title: title.clone(),
                content_text: request.content_text.clone(),
                content_html: request.content_html.clone(),
                segment,
                metadata,
                created_at: Some(created_at),
            }
        })
        .collect();

    let ids = store.insert_capture(&rows).await.map_err(|err| {
        tracing::error!(owner_id, rows = rows.len(), error = %err, "capture write failed");
        ServiceError::Storage(err)
    })?;

    let primary_item = rows.into_iter().zip(ids.iter()).next().map(|(row, id)| ContentItem {
        id: id.clone(),
        owner_id: row.owner_id,
        url: row.url,
        title: row.title,
        content_text: row.content_text,
        content_html: row.content_html,
        segment: row.segment,
        metadata: row.metadata,
        created_at,
    });

    tracing::info!(
        owner_id,
        rows = ids.len(),
        primary = %primary,
        "content captured"
    );

    if let Some(content) = primary_item {
        if let Err(err) = notifier.notify(owner_id, ContentEvent::ContentUpdate { content }) {
            tracing::warn!(owner_id, error = %err, "live update failed");
        }
    }

    Ok(CaptureOutcome {
        id: ids.first().cloned().unwrap_or_default(),
        ids,
        segments: resolved.segments.clone(),
        is_multi_segment: resolved.is_multi_segment(),
        title,
        classified_by,
    })
}
