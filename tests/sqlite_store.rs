use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;

use synapse::capture::{capture_content, CaptureRequest};
use synapse::error::ServiceError;
use synapse::db::connect_path;
use synapse::migrate::apply;
use synapse::sqlite_store::SqliteStore;
use synapse_core::classify::FallbackClassifier;
use synapse_core::models::{NewContentRow, Segment};
use synapse_core::notify::NoopNotifier;
use synapse_core::segments::Classification;
use synapse_core::store::ContentStore;

async fn open_store(tmp: &TempDir) -> SqliteStore {
    let pool = connect_path(&tmp.path().join("data").join("synapse.sqlite"))
        .await
        .unwrap();
    apply(&pool).await.unwrap();
    SqliteStore::new(pool)
}

fn row(owner: &str, title: &str, segment: Segment, minutes_ago: i64) -> NewContentRow {
    let base = Utc.with_ymd_and_hms(2024, 11, 20, 12, 0, 0).unwrap();
    NewContentRow {
        owner_id: owner.to_string(),
        url: format!("https://example.com/{}", title.to_lowercase().replace(' ', "-")),
        title: title.to_string(),
        content_text: format!("{} body", title),
        content_html: String::new(),
        segment,
        metadata: json!({}),
        created_at: Some(base - Duration::minutes(minutes_ago)),
    }
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    apply(store.pool()).await.unwrap();
    assert!(store.find_by_owner("u1", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_round_trip_and_ordering() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let old = store.insert_content_row(&row("u1", "Old", Segment::Books, 60)).await.unwrap();
    let new = store.insert_content_row(&row("u1", "New", Segment::Books, 0)).await.unwrap();
    let tie = store.insert_content_row(&row("u1", "Tie", Segment::Study, 0)).await.unwrap();
    store.insert_content_row(&row("u2", "Other", Segment::Books, 0)).await.unwrap();

    let items = store.find_by_owner("u1", None).await.unwrap();
    let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec![tie.as_str(), new.as_str(), old.as_str()]);
    assert_eq!(items[2].title, "Old");
    assert_eq!(items[2].content_text, "Old body");
    assert_eq!(
        items[2].created_at,
        Utc.with_ymd_and_hms(2024, 11, 20, 11, 0, 0).unwrap()
    );

    let books = store.find_by_owner("u1", Some(Segment::Books)).await.unwrap();
    assert_eq!(books.len(), 2);
    assert!(books.iter().all(|i| i.segment == Segment::Books));
}

#[tokio::test]
async fn test_search_by_owner_matches_metadata_fields() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let mut with_media = row("u1", "Gallery", Segment::Images, 10);
    with_media.metadata = json!({
        "content": {
            "images": [{"src": "a.png", "alt": "Golden Gate at Dusk"}],
            "links": [{"href": "https://maps.example.com/bridge"}],
            "videos": ["not-an-object.mp4"]
        }
    });
    store.insert_content_row(&with_media).await.unwrap();
    store.insert_content_row(&row("u1", "Plain", Segment::Articles, 5)).await.unwrap();

    let hits = store.search_by_owner("u1", Some("golden gate"), 10, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Gallery");

    let hits = store.search_by_owner("u1", Some("MAPS.example"), 10, None).await.unwrap();
    assert_eq!(hits.len(), 1);

    let hits = store.search_by_owner("u1", Some("plain"), 10, None).await.unwrap();
    assert_eq!(hits[0].title, "Plain");

    let all = store.search_by_owner("u1", None, 1, None).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].title, "Plain");

    let scoped = store
        .search_by_owner("u1", None, 10, Some(&[Segment::Images]))
        .await
        .unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].segment, Segment::Images);

    assert!(store.search_by_owner("u1", None, 10, Some(&[])).await.unwrap().is_empty());
    assert!(store.search_by_owner("u2", None, 10, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_segment_stats() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let request = CaptureRequest {
        url: "https://video.example.com/talk".to_string(),
        title: "Conference talk".to_string(),
        classification: Some(Classification {
            categories: Some(vec!["Videos".to_string(), "Study".to_string()]),
            ..Classification::default()
        }),
        ..CaptureRequest::default()
    };
    capture_content(&store, &FallbackClassifier, &NoopNotifier, "u1", request)
        .await
        .unwrap();
    store.insert_content_row(&row("u1", "Extra", Segment::Study, 0)).await.unwrap();

    let stats = store.segment_stats("u1").await.unwrap();
    let pairs: Vec<(Segment, i64)> = stats.iter().map(|s| (s.segment, s.count)).collect();
    assert_eq!(pairs, vec![(Segment::Videos, 1), (Segment::Study, 2)]);
}

#[tokio::test]
async fn test_embedding_cache_upsert() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    assert!(store.cached_embedding("h1", "m").await.unwrap().is_none());
    store.store_embedding("h1", "m", &[0.25, -1.5]).await.unwrap();
    assert_eq!(
        store.cached_embedding("h1", "m").await.unwrap(),
        Some(vec![0.25, -1.5])
    );

    store.store_embedding("h1", "m", &[1.0]).await.unwrap();
    assert_eq!(store.cached_embedding("h1", "m").await.unwrap(), Some(vec![1.0]));
    assert!(store.cached_embedding("h1", "other-model").await.unwrap().is_none());
}

#[tokio::test]
async fn test_insert_capture_returns_ids_in_order() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let ids = store
        .insert_capture(&[
            row("u1", "Talk", Segment::Videos, 0),
            row("u1", "Talk", Segment::Study, 0),
        ])
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);

    let study = store.find_by_owner("u1", Some(Segment::Study)).await.unwrap();
    assert_eq!(study[0].id, ids[1]);
}

#[tokio::test]
async fn test_failed_capture_write_leaves_no_rows() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    sqlx::query(
        "CREATE TRIGGER reject_study BEFORE INSERT ON content \
         WHEN NEW.segment_type = 'Study' \
         BEGIN SELECT RAISE(ABORT, 'study rows rejected'); END",
    )
    .execute(store.pool())
    .await
    .unwrap();

    let request = CaptureRequest {
        url: "https://video.example.com/talk".to_string(),
        title: "Conference talk".to_string(),
        classification: Some(Classification {
            categories: Some(vec!["Videos".to_string(), "Study".to_string()]),
            ..Classification::default()
        }),
        ..CaptureRequest::default()
    };
    let err = capture_content(&store, &FallbackClassifier, &NoopNotifier, "u1", request)
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Storage(_)));
    assert!(store.find_by_owner("u1", None).await.unwrap().is_empty());
    assert!(store.segment_stats("u1").await.unwrap().is_empty());
}
