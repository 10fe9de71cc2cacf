use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use synapse::capture::{capture_content, CaptureRequest};
use synapse::config::Config;
use synapse::error::ServiceError;
use synapse::notify::{next_for_owner, BroadcastNotifier, ContentEvent};
use synapse::search::search_content_at;
use synapse::services::Services;
use synapse_core::classify::{ClassificationSource, FallbackClassifier};
use synapse_core::embedding::{composite_text, content_hash, DisabledEmbedder, Embedder};
use synapse_core::models::Segment;
use synapse_core::notify::NoopNotifier;
use synapse_core::search::MatchSource;
use synapse_core::segments::Classification;
use synapse_core::store::memory::InMemoryStore;
use synapse_core::store::ContentStore;
use synapse_core::temporal::TimeWindow;

/// Maps text to one of two directions: "tea" and the prompt "zzqx" point
/// one way, everything else the other. Text mentioning "broken" fails.
struct StubEmbedder {
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl StubEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Some(delay),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let lower = text.to_lowercase();
        if lower.contains("broken") {
            None
        } else if lower.contains("tea") || lower.contains("zzqx") {
            Some(vec![1.0, 0.0])
        } else {
            Some(vec![0.0, 1.0])
        }
    }
}

fn test_config(extra: &str) -> Config {
    toml::from_str(&format!(
        r#"
[db]
path = "unused.sqlite"

[server]
bind = "127.0.0.1:0"

{}
"#,
        extra
    ))
    .unwrap()
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 20, 15, 30, 0).unwrap()
}

fn request(
    url: &str,
    title: &str,
    text: &str,
    categories: &[&str],
    created_at: DateTime<Utc>,
) -> CaptureRequest {
    CaptureRequest {
        url: url.to_string(),
        title: title.to_string(),
        content_text: text.to_string(),
        classification: Some(Classification {
            categories: Some(categories.iter().map(|c| c.to_string()).collect()),
            ..Classification::default()
        }),
        created_at: Some(created_at),
        ..CaptureRequest::default()
    }
}

async fn seed(store: &InMemoryStore, owner: &str, req: CaptureRequest) {
    capture_content(store, &FallbackClassifier, &NoopNotifier, owner, req)
        .await
        .unwrap();
}

// ============ Capture ============

#[tokio::test]
async fn test_multi_segment_capture_writes_one_row_per_segment() {
    let store = InMemoryStore::new();
    let outcome = capture_content(
        &store,
        &FallbackClassifier,
        &NoopNotifier,
        "u1",
        request(
            "https://video.example.com/rust",
            "Rust ownership explained",
            "A lecture on borrowing",
            &["Videos", "Study", "Videos"],
            now(),
        ),
    )
    .await
    .unwrap();

    assert_eq!(outcome.segments, vec![Segment::Videos, Segment::Study]);
    assert!(outcome.is_multi_segment);
    assert_eq!(outcome.ids.len(), 2);
    assert_eq!(outcome.id, outcome.ids[0]);
    assert_eq!(outcome.classified_by, None);

    let rows = store.find_by_owner("u1", None).await.unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.url, "https://video.example.com/rust");
        assert_eq!(row.title, "Rust ownership explained");
        assert_eq!(row.created_at, now());
        assert_eq!(row.all_segments(), vec![Segment::Videos, Segment::Study]);
        assert_eq!(row.metadata["isMultiSegment"], true);
    }

    let primary = rows.iter().find(|r| r.segment == Segment::Videos).unwrap();
    assert!(primary.is_primary());
    assert!(primary.metadata.get("primarySegment").is_none());

    let secondary = rows.iter().find(|r| r.segment == Segment::Study).unwrap();
    assert!(!secondary.is_primary());
    assert_eq!(secondary.metadata["primarySegment"], "Videos");

    let stats = store.segment_stats("u1").await.unwrap();
    assert_eq!(stats.len(), 2);
    assert!(stats.iter().all(|s| s.count == 1));
}

#[tokio::test]
async fn test_capture_runs_classifier_when_none_supplied() {
    let store = InMemoryStore::new();
    let req = CaptureRequest {
        url: "https://photos.example.com/sunset".to_string(),
        metadata: serde_json::json!({
            "content": {"images": ["https://photos.example.com/sunset.jpg", {"alt": "no src"}]}
        }),
        ..CaptureRequest::default()
    };

    let outcome = capture_content(&store, &FallbackClassifier, &NoopNotifier, "u1", req)
        .await
        .unwrap();
    assert_eq!(outcome.segments, vec![Segment::Images]);
    assert_eq!(outcome.classified_by, Some(ClassificationSource::Fallback));
    assert_eq!(outcome.title, "Untitled");

    let rows = store.find_by_owner("u1", None).await.unwrap();
    let images = rows[0].metadata["content"]["images"].as_array().unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0]["src"], "https://photos.example.com/sunset.jpg");
}

#[tokio::test]
async fn test_capture_back_fills_title_from_classification() {
    let store = InMemoryStore::new();
    let mut req = request("https://shop.example.com/lamp", "  ", "", &["Products"], now());
    if let Some(classification) = req.classification.as_mut() {
        classification.title = Some("Brass desk lamp".to_string());
        classification.description = Some("Solid brass, adjustable arm".to_string());
    }

    let outcome = capture_content(&store, &FallbackClassifier, &NoopNotifier, "u1", req)
        .await
        .unwrap();
    assert_eq!(outcome.title, "Brass desk lamp");

    let rows = store.find_by_owner("u1", None).await.unwrap();
    assert_eq!(rows[0].metadata["title"], "Brass desk lamp");
    assert_eq!(rows[0].metadata["description"], "Solid brass, adjustable arm");
}

#[tokio::test]
async fn test_screenshot_capture_keeps_data_url_images() {
    let store = InMemoryStore::new();
    let req = CaptureRequest {
        url: "https://example.com/dashboard".to_string(),
        metadata: serde_json::json!({
            "content": {"images": [{"dataUrl": "data:image/png;base64,AAAA", "alt": "screenshot"}]}
        }),
        ..CaptureRequest::default()
    };

    let outcome = capture_content(&store, &FallbackClassifier, &NoopNotifier, "u1", req)
        .await
        .unwrap();
    assert_eq!(outcome.segments, vec![Segment::Images]);

    let rows = store.find_by_owner("u1", None).await.unwrap();
    assert_eq!(
        rows[0].metadata["content"]["images"],
        serde_json::json!([{"dataUrl": "data:image/png;base64,AAAA", "alt": "screenshot"}])
    );
}

#[tokio::test]
async fn test_capture_without_valid_segment_stores_nothing() {
    let store = InMemoryStore::new();
    let err = capture_content(
        &store,
        &FallbackClassifier,
        &NoopNotifier,
        "u1",
        request("https://example.com", "Song", "", &["Music", "Podcasts"], now()),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ServiceError::NoSegmentDetermined));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_capture_requires_url() {
    let store = InMemoryStore::new();
    let err = capture_content(
        &store,
        &FallbackClassifier,
        &NoopNotifier,
        "u1",
        request("   ", "No url", "", &["Books"], now()),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ServiceError::Validation(_)));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_capture_notifies_owner_with_primary_row() {
    let store = Arc::new(InMemoryStore::new());
    let services = Services::new(
        test_config(""),
        store.clone(),
        Arc::new(DisabledEmbedder),
        Arc::new(FallbackClassifier),
    );
    let mut rx = services.notifier.subscribe();

    services
        .capture(
            "u1",
            request("https://example.com/b", "Dune", "", &["Books", "Study"], now()),
        )
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), next_for_owner(&mut rx, "u1"))
        .await
        .unwrap();
    match event {
        Some(ContentEvent::ContentUpdate { content }) => {
            assert_eq!(content.segment, Segment::Books);
            assert_eq!(content.title, "Dune");
        }
        None => panic!("expected a content_update event"),
    }
}

#[tokio::test]
async fn test_notifier_failure_does_not_fail_capture() {
    let store = InMemoryStore::new();
    let notifier = BroadcastNotifier::new();
    // No subscribers: the send is dropped.
    let outcome = capture_content(
        &store,
        &FallbackClassifier,
        &notifier,
        "u1",
        request("https://example.com", "Alone", "", &["Articles"], now()),
    )
    .await
    .unwrap();
    assert_eq!(outcome.segments, vec![Segment::Articles]);
}

// ============ Search ============

#[tokio::test]
async fn test_articles_from_last_week_about_databases() {
    let store = InMemoryStore::new();
    let last_week = Utc.with_ymd_and_hms(2024, 11, 13, 10, 0, 0).unwrap();
    let older = Utc.with_ymd_and_hms(2024, 10, 2, 9, 0, 0).unwrap();

    seed(
        &store,
        "u1",
        request(
            "https://blog.example.com/postgres",
            "Scaling Postgres databases",
            "How to shard databases without downtime",
            &["Articles"],
            last_week,
        ),
    )
    .await;
    seed(
        &store,
        "u1",
        request(
            "https://craft.example.com/knit",
            "Knitting patterns",
            "Cable stitch",
            &["Study"],
            older,
        ),
    )
    .await;
    seed(
        &store,
        "u2",
        request(
            "https://other.example.com/db",
            "Databases for everyone",
            "databases",
            &["Articles"],
            last_week,
        ),
    )
    .await;

    let config = test_config("");
    let response = search_content_at(
        &config,
        &store,
        &DisabledEmbedder,
        "u1",
        "articles from last week about databases",
        &[],
        now(),
    )
    .await
    .unwrap();

    assert!(response.results.iter().all(|r| r.item.owner_id == "u1"));
    assert_eq!(response.results.len(), 2);

    let top = &response.results[0];
    assert_eq!(top.item.title, "Scaling Postgres databases");
    assert_eq!(top.source, MatchSource::Fuzzy);
    assert!(top.score > 3.0, "score was {}", top.score);

    let intent = response.time_intent.as_ref().unwrap();
    assert!(intent.has_explicit_date_context);
    assert!(!response.has_semantic_results);
    assert_eq!(response.grouped_results[&Segment::Articles].len(), 1);
}

#[tokio::test]
async fn test_recent_article_outranks_old_study_note_outside_last_week() {
    let store = InMemoryStore::new();
    let three_days_ago = now() - chrono::Duration::days(3);
    let two_months_ago = now() - chrono::Duration::days(60);

    seed(
        &store,
        "u1",
        request(
            "https://blog.example.com/postgres",
            "Tuning Postgres databases",
            "Comparing embedded databases for small services",
            &["Articles"],
            three_days_ago,
        ),
    )
    .await;
    seed(
        &store,
        "u1",
        request(
            "https://craft.example.com/knit",
            "Knitting patterns",
            "Cable stitch",
            &["Study"],
            two_months_ago,
        ),
    )
    .await;

    let response = search_content_at(
        &test_config(""),
        &store,
        &DisabledEmbedder,
        "u1",
        "articles from last week about databases",
        &[],
        now(),
    )
    .await
    .unwrap();

    let intent = response.time_intent.as_ref().unwrap();
    match intent.window {
        TimeWindow::Exact { date } => assert_eq!(date, now() - chrono::Duration::days(7)),
        TimeWindow::Range { .. } => panic!("expected an exact day for 'last week'"),
    }

    let titles: Vec<&str> = response.results.iter().map(|r| r.item.title.as_str()).collect();
    assert_eq!(titles, vec!["Tuning Postgres databases", "Knitting patterns"]);

    // Neither item falls on the parsed day, so both are demoted.
    let article = &response.results[0];
    assert_eq!(article.source, MatchSource::Fuzzy);
    assert!(article.score > 0.25 && article.score <= 0.3, "score was {}", article.score);
    let note = &response.results[1];
    assert_eq!(note.source, MatchSource::Basic);
    assert!((note.score - 0.15).abs() < 1e-9, "score was {}", note.score);

    let articles = &response.grouped_results[&Segment::Articles];
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].item.title, "Tuning Postgres databases");
    assert_eq!(response.grouped_results[&Segment::Study].len(), 1);
}

#[tokio::test]
async fn test_search_runs_on_spawned_task() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, "u1", request("https://e.com/tea", "Green tea sampler", "", &["Products"], now())).await;
    seed(&store, "u1", request("https://e.com/boots", "Hiking boots", "", &["Products"], now())).await;

    let services = Arc::new(Services::new(
        test_config(""),
        store,
        Arc::new(StubEmbedder::new()),
        Arc::new(FallbackClassifier),
    ));
    let handle = tokio::spawn({
        let services = services.clone();
        async move { services.search("u1", "zzqx", &[]).await }
    });

    let response = handle.await.unwrap().unwrap();
    assert!(response.has_semantic_results);
    assert_eq!(response.results[0].item.title, "Green tea sampler");
    assert_eq!(response.results[0].source, MatchSource::Semantic);
}

#[tokio::test]
async fn test_empty_prompt_is_rejected() {
    let store = InMemoryStore::new();
    let err = search_content_at(&test_config(""), &store, &DisabledEmbedder, "u1", "   ", &[], now())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn test_search_with_no_content_is_empty() {
    let store = InMemoryStore::new();
    let embedder = StubEmbedder::new();
    let response = search_content_at(&test_config(""), &store, &embedder, "u1", "tea", &[], now())
        .await
        .unwrap();
    assert!(response.results.is_empty());
    assert!(response.grouped_results.is_empty());
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_segment_filter_scopes_candidates() {
    let store = InMemoryStore::new();
    seed(&store, "u1", request("https://e.com/1", "Dune", "", &["Books"], now())).await;
    seed(&store, "u1", request("https://e.com/2", "Dune poster", "", &["Images"], now())).await;

    let response = search_content_at(
        &test_config(""),
        &store,
        &DisabledEmbedder,
        "u1",
        "dune",
        &[Segment::Books, Segment::Books],
        now(),
    )
    .await
    .unwrap();

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].item.segment, Segment::Books);
}

#[tokio::test]
async fn test_semantic_matching_and_failed_embeddings() {
    let store = InMemoryStore::new();
    seed(&store, "u1", request("https://e.com/tea", "Green tea sampler", "", &["Products"], now())).await;
    seed(&store, "u1", request("https://e.com/boots", "Hiking boots", "", &["Products"], now())).await;
    seed(&store, "u1", request("https://e.com/broken", "broken page", "", &["Articles"], now())).await;

    let embedder = StubEmbedder::new();
    let config = test_config("");
    let response = search_content_at(&config, &store, &embedder, "u1", "zzqx", &[], now())
        .await
        .unwrap();

    assert!(response.has_semantic_results);
    let titles: Vec<&str> = response.results.iter().map(|r| r.item.title.as_str()).collect();
    assert_eq!(titles, vec!["Green tea sampler", "broken page", "Hiking boots"]);

    assert_eq!(response.results[0].source, MatchSource::Semantic);
    assert!((response.results[0].score - 1.0).abs() < 1e-6);
    assert_eq!(response.results[1].source, MatchSource::Basic);
    assert!((response.results[1].score - 0.5).abs() < 1e-9);
    assert_eq!(response.results[2].source, MatchSource::Semantic);

    // prompt + three candidates
    assert_eq!(embedder.calls(), 4);

    let rows = store.find_by_owner("u1", None).await.unwrap();
    let tea = rows.iter().find(|r| r.title == "Green tea sampler").unwrap();
    let hash = content_hash(&composite_text(tea, config.retrieval.composite_max_chars));
    assert_eq!(
        store.cached_embedding(&hash, "stub").await.unwrap(),
        Some(vec![1.0, 0.0])
    );

    // Cached vectors are reused; the failed item is retried.
    search_content_at(&config, &store, &embedder, "u1", "zzqx", &[], now())
        .await
        .unwrap();
    assert_eq!(embedder.calls(), 6);
}

#[tokio::test]
async fn test_cache_disabled_embeds_every_time() {
    let store = InMemoryStore::new();
    seed(&store, "u1", request("https://e.com/tea", "Green tea", "", &["Products"], now())).await;

    let embedder = StubEmbedder::new();
    let config = test_config("[embedding]\ncache = false\n");
    for _ in 0..2 {
        search_content_at(&config, &store, &embedder, "u1", "zzqx", &[], now())
            .await
            .unwrap();
    }
    assert_eq!(embedder.calls(), 4);
}

#[tokio::test]
async fn test_semantic_deadline_drops_semantic_results() {
    let store = InMemoryStore::new();
    seed(&store, "u1", request("https://e.com/tea", "Green tea", "", &["Products"], now())).await;

    let embedder = StubEmbedder::slow(Duration::from_millis(300));
    let config = test_config("[retrieval]\nrequest_deadline_ms = 50\n");
    let response = search_content_at(&config, &store, &embedder, "u1", "zzqx", &[], now())
        .await
        .unwrap();

    assert!(!response.has_semantic_results);
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].source, MatchSource::Basic);
}

#[tokio::test]
async fn test_per_call_timeout_skips_slow_embeddings() {
    let store = InMemoryStore::new();
    seed(&store, "u1", request("https://e.com/tea", "Green tea", "", &["Products"], now())).await;

    let embedder = StubEmbedder::slow(Duration::from_millis(300));
    let config = test_config("[retrieval]\nembed_timeout_ms = 20\n");
    let response = search_content_at(&config, &store, &embedder, "u1", "zzqx", &[], now())
        .await
        .unwrap();

    assert!(!response.has_semantic_results);
    assert_eq!(response.results[0].source, MatchSource::Basic);
}

#[tokio::test]
async fn test_final_limit_truncates_flat_list_only() {
    let store = InMemoryStore::new();
    for i in 0..5 {
        seed(
            &store,
            "u1",
            request(&format!("https://e.com/{}", i), &format!("Note {}", i), "", &["Study"], now()),
        )
        .await;
    }

    let config = test_config("[retrieval]\nfinal_limit = 2\n");
    let response = search_content_at(&config, &store, &DisabledEmbedder, "u1", "zzqx", &[], now())
        .await
        .unwrap();

    assert_eq!(response.results.len(), 2);
    assert_eq!(response.grouped_results[&Segment::Study].len(), 5);
}
