//! SQLite-backed [`ContentStore`] implementation.
//!
//! Rows live in the `content` table, one per (capture, segment). Timestamps
//! are Unix milliseconds; ties are broken by insertion order so reads are
//! newest first and deterministic. Metadata is stored as JSON text and
//! searched with SQLite's JSON functions.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};

use synapse_core::embedding::{blob_to_vec, vec_to_blob};
use synapse_core::models::{ContentItem, NewContentRow, Segment, SegmentCount};
use synapse_core::store::ContentStore;

const SELECT_COLUMNS: &str = "SELECT id, owner_id, url, title, content_text, content_html, \
     segment_type, metadata_json, created_at FROM content";

/// SQLite implementation of the [`ContentStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_item(row: &SqliteRow) -> Result<ContentItem> {
    let label: String = row.try_get("segment_type")?;
    let segment = Segment::from_label(&label)
        .ok_or_else(|| anyhow!("unknown segment '{}' in content row", label))?;
    let metadata_json: String = row.try_get("metadata_json")?;
    let created_ms: i64 = row.try_get("created_at")?;
    let created_at = DateTime::from_timestamp_millis(created_ms)
        .ok_or_else(|| anyhow!("invalid created_at {} in content row", created_ms))?;

    Ok(ContentItem {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        url: row.try_get("url")?,
        title: row.try_get("title")?,
        content_text: row.try_get("content_text")?,
        content_html: row.try_get("content_html")?,
        segment,
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::json!({})),
        created_at,
    })
}

/// Append a case-insensitive substring match on `needle` over one
/// string field of every object in a metadata list.
fn push_metadata_match(qb: &mut QueryBuilder<'_, Sqlite>, list: &str, field: &str, needle: &str) {
    qb.push(format!(
        " OR EXISTS (SELECT 1 FROM json_each(content.metadata_json, '$.content.{}') \
         WHERE instr(lower(CASE WHEN json_each.type = 'object' \
         THEN json_extract(json_each.value, '$.{}') END), ",
        list, field
    ));
    qb.push_bind(needle.to_string());
    qb.push(") > 0)");
}

async fn insert_row(conn: &mut SqliteConnection, row: &NewContentRow) -> Result<String> {
    let id = uuid::Uuid::new_v4().to_string();
    let created_at = row.created_at.unwrap_or_else(Utc::now);

    sqlx::query(
        r#"
        INSERT INTO content (id, owner_id, url, title, content_text, content_html,
                             segment_type, metadata_json, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&row.owner_id)
    .bind(&row.url)
    .bind(&row.title)
    .bind(&row.content_text)
    .bind(&row.content_html)
    .bind(row.segment.as_str())
    .bind(row.metadata.to_string())
    .bind(created_at.timestamp_millis())
    .execute(&mut *conn)
    .await?;

    Ok(id)
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn insert_content_row(&self, row: &NewContentRow) -> Result<String> {
        let mut conn = self.pool.acquire().await?;
        insert_row(&mut *conn, row).await
    }

    async fn insert_capture(&self, rows: &[NewContentRow]) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(insert_row(&mut *tx, row).await?);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn find_by_owner(
        &self,
        owner_id: &str,
        segment: Option<Segment>,
    ) -> Result<Vec<ContentItem>> {
        let mut qb = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        qb.push(" WHERE owner_id = ");
        qb.push_bind(owner_id.to_string());
        if let Some(segment) = segment {
            qb.push(" AND segment_type = ");
            qb.push_bind(segment.as_str());
        }
        qb.push(" ORDER BY created_at DESC, rowid DESC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_item).collect()
    }

    async fn search_by_owner(
        &self,
        owner_id: &str,
        query: Option<&str>,
        limit: usize,
        segments: Option<&[Segment]>,
    ) -> Result<Vec<ContentItem>> {
        let mut qb = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        qb.push(" WHERE owner_id = ");
        qb.push_bind(owner_id.to_string());

        if let Some(segments) = segments {
            if segments.is_empty() {
                return Ok(Vec::new());
            }
            qb.push(" AND segment_type IN (");
            let mut separated = qb.separated(", ");
            for segment in segments {
                separated.push_bind(segment.as_str());
            }
            separated.push_unseparated(")");
        }

        let needle = query.map(|q| q.trim().to_lowercase()).unwrap_or_default();
        if !needle.is_empty() {
            qb.push(" AND (instr(lower(title), ");
            qb.push_bind(needle.clone());
            qb.push(") > 0 OR instr(lower(content_text), ");
            qb.push_bind(needle.clone());
            qb.push(") > 0 OR instr(lower(url), ");
            qb.push_bind(needle.clone());
            qb.push(") > 0");
            push_metadata_match(&mut qb, "images", "alt", &needle);
            push_metadata_match(&mut qb, "links", "href", &needle);
            push_metadata_match(&mut qb, "videos", "src", &needle);
            qb.push(")");
        }

        qb.push(" ORDER BY created_at DESC, rowid DESC LIMIT ");
        qb.push_bind(limit as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_item).collect()
    }

    async fn segment_stats(&self, owner_id: &str) -> Result<Vec<SegmentCount>> {
        let rows = sqlx::query(
            "SELECT segment_type, COUNT(*) AS count FROM content WHERE owner_id = ? GROUP BY segment_type",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = Vec::with_capacity(rows.len());
        for row in &rows {
            let label: String = row.try_get("segment_type")?;
            let count: i64 = row.try_get("count")?;
            if let Some(segment) = Segment::from_label(&label) {
                stats.push(SegmentCount { segment, count });
            }
        }
        stats.sort_by_key(|s| s.segment);
        Ok(stats)
    }

    async fn cached_embedding(&self, content_hash: &str, model: &str) -> Result<Option<Vec<f32>>> {
        let row = sqlx::query(
            "SELECT embedding FROM embedding_cache WHERE content_hash = ? AND model = ?",
        )
        .bind(content_hash)
        .bind(model)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let blob: Vec<u8> = row.try_get("embedding")?;
                Ok(Some(blob_to_vec(&blob)))
            }
            None => Ok(None),
        }
    }

    async fn store_embedding(&self, content_hash: &str, model: &str, vector: &[f32]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO embedding_cache (content_hash, model, dims, embedding, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(content_hash, model) DO UPDATE SET
                dims = excluded.dims,
                embedding = excluded.embedding,
                created_at = excluded.created_at
            "#,
        )
        .bind(content_hash)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(vec_to_blob(vector))
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
