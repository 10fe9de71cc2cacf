//! Segment resolution for classifier output.
//!
//! Classifier replies arrive in two shapes: the legacy single-label form
//! (`{"category": "Books"}`) and the multi-label form
//! (`{"categories": ["Videos", "Study"]}`). [`Classification::labels`]
//! unifies both into a [`CategoryField`]; [`resolve_segments`] turns that
//! into the ordered, deduplicated segment list that is written to storage.
//!
//! Resolution rules:
//! - labels keep their first-seen order, duplicates are removed;
//! - labels outside the six-segment enumeration are dropped;
//! - educational content is always cross-tagged `Study`;
//! - an empty result rejects the capture ([`SegmentError::NoSegmentDetermined`]).

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::{ContentType, Segment};

/// Errors raised while resolving segments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SegmentError {
    #[error("no segment determined for captured content")]
    NoSegmentDetermined,
}

/// Category labels as a classifier produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryField {
    Single(String),
    Multi(Vec<String>),
}

impl CategoryField {
    pub fn labels(&self) -> Vec<&str> {
        match self {
            CategoryField::Single(label) => vec![label.as_str()],
            CategoryField::Multi(labels) => labels.iter().map(String::as_str).collect(),
        }
    }
}

/// Wire-level classifier output, in either label shape.
///
/// When both `categories` and `category` are present the multi-label field
/// wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub content_type: ContentType,
}

impl Classification {
    /// The label field, whichever shape was supplied.
    pub fn labels(&self) -> Option<CategoryField> {
        match (&self.categories, &self.category) {
            (Some(labels), _) => Some(CategoryField::Multi(labels.clone())),
            (None, Some(label)) => Some(CategoryField::Single(label.clone())),
            (None, None) => None,
        }
    }
}

/// Output of [`resolve_segments`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSegments {
    /// Primary segment first.
    pub segments: Vec<Segment>,
    pub content_type: ContentType,
    /// Classifier details to merge into the primary row's metadata.
    pub metadata: serde_json::Value,
}

impl ResolvedSegments {
    pub fn primary(&self) -> Segment {
        self.segments[0]
    }

    pub fn is_multi_segment(&self) -> bool {
        self.segments.len() > 1
    }
}

/// Normalize a label list into valid, ordered, unique segments, then apply
/// the educational cross-tag rule.
pub fn normalize_labels<'a, I>(labels: I, content_type: &ContentType) -> Vec<Segment>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut segments: Vec<Segment> = Vec::new();
    for segment in labels.into_iter().filter_map(Segment::from_label) {
        if !segments.contains(&segment) {
            segments.push(segment);
        }
    }
    if content_type.is_educational && !segments.contains(&Segment::Study) {
        segments.push(Segment::Study);
    }
    segments
}

/// Resolve classifier output into the segments a capture is filed under.
pub fn resolve_segments(classification: &Classification) -> Result<ResolvedSegments, SegmentError> {
    let field = classification.labels();
    let labels = field.as_ref().map(CategoryField::labels).unwrap_or_default();
    let segments = normalize_labels(labels, &classification.content_type);

    if segments.is_empty() {
        return Err(SegmentError::NoSegmentDetermined);
    }

    let metadata = json!({
        "title": classification.title,
        "description": classification.description,
        "contentType": classification.content_type,
    });

    Ok(ResolvedSegments {
        segments,
        content_type: classification.content_type.clone(),
        metadata,
    })
}
