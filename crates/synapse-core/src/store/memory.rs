//! In-memory [`ContentStore`] implementation for tests and embedding use.
//!
//! Rows live in a `Vec` behind `std::sync::RwLock`; reads scan and sort.
//! Ordering matches the SQLite backend: newest first, later inserts first
//! on equal timestamps.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{ContentItem, NewContentRow, Segment, SegmentCount};

use super::{matches_text, ContentStore};

struct StoredRow {
    seq: u64,
    item: ContentItem,
}

/// In-memory store for tests and embedding in other applications.
pub struct InMemoryStore {
    rows: RwLock<Vec<StoredRow>>,
    embeddings: RwLock<HashMap<(String, String), Vec<f32>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            embeddings: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored rows across all owners.
    pub fn len(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn owner_rows<F>(&self, owner_id: &str, keep: F) -> Vec<ContentItem>
    where
        F: Fn(&ContentItem) -> bool,
    {
        let rows = self.rows.read().unwrap();
        let mut matched: Vec<&StoredRow> = rows
            .iter()
            .filter(|r| r.item.owner_id == owner_id && keep(&r.item))
            .collect();
        matched.sort_by(|a, b| {
            b.item
                .created_at
                .cmp(&a.item.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        matched.into_iter().map(|r| r.item.clone()).collect()
    }
}

fn push_row(rows: &mut Vec<StoredRow>, row: &NewContentRow) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    let seq = rows.len() as u64;
    rows.push(StoredRow {
        seq,
        item: ContentItem {
            id: id.clone(),
            owner_id: row.owner_id.clone(),
            url: row.url.clone(),
            title: row.title.clone(),
            content_text: row.content_text.clone(),
            content_html: row.content_html.clone(),
            segment: row.segment,
            metadata: row.metadata.clone(),
            created_at: row.created_at.unwrap_or_else(Utc::now),
        },
    });
    id
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn insert_content_row(&self, row: &NewContentRow) -> Result<String> {
        let mut rows = self.rows.write().unwrap();
        Ok(push_row(&mut rows, row))
    }

    async fn insert_capture(&self, batch: &[NewContentRow]) -> Result<Vec<String>> {
        let mut rows = self.rows.write().unwrap();
        Ok(batch.iter().map(|row| push_row(&mut rows, row)).collect())
    }

    async fn find_by_owner(
        &self,
        owner_id: &str,
        segment: Option<Segment>,
    ) -> Result<Vec<ContentItem>> {
        Ok(self.owner_rows(owner_id, |item| {
            segment.map(|s| item.segment == s).unwrap_or(true)
        }))
    }

    async fn search_by_owner(
        &self,
        owner_id: &str,
        query: Option<&str>,
        limit: usize,
        segments: Option<&[Segment]>,
    ) -> Result<Vec<ContentItem>> {
        let query = query.map(|q| q.trim().to_lowercase()).unwrap_or_default();
        let mut items = self.owner_rows(owner_id, |item| {
            segments.map(|s| s.contains(&item.segment)).unwrap_or(true)
                && matches_text(item, &query)
        });
        items.truncate(limit);
        Ok(items)
    }

    async fn segment_stats(&self, owner_id: &str) -> Result<Vec<SegmentCount>> {
        let rows = self.rows.read().unwrap();
        let mut counts: BTreeMap<Segment, i64> = BTreeMap::new();
        for row in rows.iter().filter(|r| r.item.owner_id == owner_id) {
            *counts.entry(row.item.segment).or_insert(0) += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(segment, count)| SegmentCount { segment, count })
            .collect())
    }

    async fn cached_embedding(&self, content_hash: &str, model: &str) -> Result<Option<Vec<f32>>> {
        let embeddings = self.embeddings.read().unwrap();
        Ok(embeddings
            .get(&(content_hash.to_string(), model.to_string()))
            .cloned())
    }

    async fn store_embedding(&self, content_hash: &str, model: &str, vector: &[f32]) -> Result<()> {
        let mut embeddings = self.embeddings.write().unwrap();
        embeddings.insert(
            (content_hash.to_string(), model.to_string()),
            vector.to_vec(),
        );
        Ok(())
    }
}
