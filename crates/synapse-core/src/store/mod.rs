//! Storage abstraction for captured content.
//!
//! The [`ContentStore`] trait covers everything the capture and search
//! pipelines need from a backend: inserting rows (singly or one capture
//! at a time), owner-scoped reads, a per-segment summary, and a cache for
//! candidate embeddings.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ContentItem, NewContentRow, Segment, SegmentCount};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_content_row`](ContentStore::insert_content_row) | Persist one row, returning its id |
/// | [`insert_capture`](ContentStore::insert_capture) | Persist all rows of one capture atomically |
/// | [`find_by_owner`](ContentStore::find_by_owner) | All of an owner's rows, newest first |
/// | [`search_by_owner`](ContentStore::search_by_owner) | Capped, optionally text- and segment-filtered read |
/// | [`segment_stats`](ContentStore::segment_stats) | Row count per segment |
/// | [`cached_embedding`](ContentStore::cached_embedding) | Look up a cached vector |
/// | [`store_embedding`](ContentStore::store_embedding) | Cache a vector |
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a row. The store assigns the id, and `created_at` when the
    /// row does not carry one.
    async fn insert_content_row(&self, row: &NewContentRow) -> Result<String>;

    /// Insert every row of one capture, all or nothing. Ids are returned
    /// in input order.
    async fn insert_capture(&self, rows: &[NewContentRow]) -> Result<Vec<String>>;

    /// All rows owned by `owner_id`, newest first, optionally limited to
    /// one segment.
    async fn find_by_owner(
        &self,
        owner_id: &str,
        segment: Option<Segment>,
    ) -> Result<Vec<ContentItem>>;

    /// Up to `limit` rows owned by `owner_id`, newest first.
    ///
    /// `query` filters by case-insensitive substring over title, content
    /// text, URL, image alt text, link targets, and video sources.
    /// `segments` restricts to rows filed under any of the given segments.
    async fn search_by_owner(
        &self,
        owner_id: &str,
        query: Option<&str>,
        limit: usize,
        segments: Option<&[Segment]>,
    ) -> Result<Vec<ContentItem>>;

    /// Row counts per segment for `owner_id`; segments without rows are omitted.
    async fn segment_stats(&self, owner_id: &str) -> Result<Vec<SegmentCount>>;

    /// Cached vector for a composite-text hash and model.
    async fn cached_embedding(&self, content_hash: &str, model: &str) -> Result<Option<Vec<f32>>>;

    /// Cache a vector for a composite-text hash and model, replacing any
    /// previous entry.
    async fn store_embedding(&self, content_hash: &str, model: &str, vector: &[f32]) -> Result<()>;
}

/// Whether `item` matches a free-text `query` under the
/// [`ContentStore::search_by_owner`] rules. `query` must already be
/// lower-cased and trimmed.
pub fn matches_text(item: &ContentItem, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let hit = |s: &str| s.to_lowercase().contains(query);
    if hit(&item.title) || hit(&item.content_text) || hit(&item.url) {
        return true;
    }
    let content = item.metadata.get("content");
    [("images", "alt"), ("links", "href"), ("videos", "src")]
        .iter()
        .any(|(list, field)| {
            content
                .and_then(|c| c.get(*list))
                .and_then(|l| l.as_array())
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|e| e.get(*field).and_then(|v| v.as_str()))
                        .any(hit)
                })
                .unwrap_or(false)
        })
}
