//! Core data models for captured content.
//!
//! These types flow through the capture pipeline (classification, segment
//! resolution, storage) and the search pipeline (fuzzy matching, semantic
//! scoring, rank fusion).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the six fixed content categories.
///
/// Labels are serialized exactly as displayed (`"Images"`, `"Study"`, ...).
/// Anything outside this enumeration is rejected by [`Segment::from_label`]
/// and never reaches storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Segment {
    Images,
    Products,
    Books,
    Articles,
    Videos,
    Study,
}

impl Segment {
    /// All segments in canonical order.
    pub const ALL: [Segment; 6] = [
        Segment::Images,
        Segment::Products,
        Segment::Books,
        Segment::Articles,
        Segment::Videos,
        Segment::Study,
    ];

    /// The canonical label string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::Images => "Images",
            Segment::Products => "Products",
            Segment::Books => "Books",
            Segment::Articles => "Articles",
            Segment::Videos => "Videos",
            Segment::Study => "Study",
        }
    }

    /// Parse a label, tolerating surrounding whitespace. Matching is exact
    /// otherwise; `"articles"` is not a valid label.
    pub fn from_label(label: &str) -> Option<Segment> {
        Segment::ALL
            .iter()
            .copied()
            .find(|s| s.as_str() == label.trim())
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Segment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Segment::from_label(s).ok_or_else(|| {
            format!(
                "unknown segment '{}'. Must be one of: Images, Products, Books, Articles, Videos, Study",
                s
            )
        })
    }
}

/// Classifier-derived flags describing the nature of a capture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentType {
    #[serde(default)]
    pub is_educational: bool,
    #[serde(default)]
    pub is_technical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// A persisted content row.
///
/// A multi-segment capture is stored as one row per segment; see
/// [`ContentItem::all_segments`] for the logical segment set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    /// UUID assigned by the store.
    pub id: String,
    pub owner_id: String,
    pub url: String,
    pub title: String,
    pub content_text: String,
    pub content_html: String,
    /// The segment this row is filed under.
    #[serde(rename = "segmentType")]
    pub segment: Segment,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ContentItem {
    /// The complete segment set of the logical capture this row belongs to.
    ///
    /// Primary rows carry `allSegments` in their metadata; secondary and
    /// single-segment rows fall back to their own segment.
    pub fn all_segments(&self) -> Vec<Segment> {
        let listed: Vec<Segment> = self
            .metadata
            .get("allSegments")
            .and_then(|v| v.as_array())
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|l| l.as_str().and_then(Segment::from_label))
                    .collect()
            })
            .unwrap_or_default();
        if listed.is_empty() {
            vec![self.segment]
        } else {
            listed
        }
    }

    /// Whether this row is the primary row of its capture.
    pub fn is_primary(&self) -> bool {
        self.metadata
            .get("isPrimarySegment")
            .and_then(|v| v.as_bool())
            .unwrap_or(true)
    }
}

/// A row to be inserted. The store assigns the id, and `created_at` when
/// it is not supplied.
#[derive(Debug, Clone)]
pub struct NewContentRow {
    pub owner_id: String,
    pub url: String,
    pub title: String,
    pub content_text: String,
    pub content_html: String,
    pub segment: Segment,
    pub metadata: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
}

/// Per-segment row count for an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentCount {
    pub segment: Segment,
    pub count: i64,
}
