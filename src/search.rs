//! Search orchestration: candidate retrieval, fuzzy and semantic matching,
//! temporal parsing, and rank fusion.
//!
//! # Pipeline
//!
//! 1. Reject empty prompts.
//! 2. Fetch up to `retrieval.candidate_limit` of the owner's rows, newest
//!    first, restricted to the segment filter when one is given.
//! 3. Fuzzy-match the prompt over the candidates.
//! 4. When an embedder is enabled, embed the prompt once and each
//!    candidate's composite text concurrently (bounded by
//!    `retrieval.embed_concurrency`, each call under
//!    `retrieval.embed_timeout_ms`). Vectors are cached per content hash.
//!    If the whole stage overruns `retrieval.request_deadline_ms` its
//!    results are dropped.
//! 5. Parse the prompt's time reference.
//! 6. Fuse everything with [`synapse_core::search::fuse`].
//!
//! Embedding failures only shrink the semantic bucket. A storage failure
//! in step 2 fails the search.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::time::Instant;

use synapse_core::embedding::{composite_text, content_hash, cosine_similarity, Embedder};
use synapse_core::fuzzy::{FieldWeights, FuzzyMatcher};
use synapse_core::models::{ContentItem, Segment};
use synapse_core::search::{fuse, FusionInput, SearchResponse, SemanticHit};
use synapse_core::store::ContentStore;
use synapse_core::temporal;

use crate::config::Config;
use crate::error::ServiceError;

/// Search `owner_id`'s content for `prompt`.
pub async fn search_content(
    config: &Config,
    store: &dyn ContentStore,
    embedder: &dyn Embedder,
    owner_id: &str,
    prompt: &str,
    segments: &[Segment],
) -> Result<SearchResponse, ServiceError> {
    search_content_at(config, store, embedder, owner_id, prompt, segments, Utc::now()).await
}

/// [`search_content`] with an explicit clock for temporal parsing.
pub async fn search_content_at(
    config: &Config,
    store: &dyn ContentStore,
    embedder: &dyn Embedder,
    owner_id: &str,
    prompt: &str,
    segments: &[Segment],
    now: DateTime<Utc>,
) -> Result<SearchResponse, ServiceError> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(ServiceError::validation("prompt must not be empty"));
    }

    let started = Instant::now();
    let retrieval = &config.retrieval;

    let mut filter: Vec<Segment> = Vec::with_capacity(segments.len());
    for segment in segments {
        if !filter.contains(segment) {
            filter.push(*segment);
        }
    }

    let candidates = store
        .search_by_owner(
            owner_id,
            None,
            retrieval.candidate_limit,
            (!filter.is_empty()).then_some(filter.as_slice()),
        )
        .await
        .map_err(|err| {
            tracing::error!(owner_id, error = %err, "candidate retrieval failed");
            ServiceError::Storage(err)
        })?;

    let fuzzy = FuzzyMatcher::new(FieldWeights::default(), retrieval.fuzzy_threshold)
        .search(&candidates, prompt);
    let semantic = semantic_hits(config, store, embedder, &candidates, prompt).await;
    let time_intent = temporal::parse_at(prompt, now);

    let response = fuse(
        FusionInput {
            candidates: &candidates,
            fuzzy: &fuzzy,
            semantic: &semantic,
            segment_filter: &filter,
            time_intent: time_intent.as_ref(),
        },
        &retrieval.fusion_params(),
    );

    tracing::debug!(
        owner_id,
        candidates = candidates.len(),
        fuzzy = fuzzy.len(),
        semantic = semantic.len(),
        results = response.results.len(),
        temporal = time_intent.is_some(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "search complete"
    );

    Ok(response)
}

/// Cosine similarity of every embeddable candidate against the prompt.
///
/// Empty when the embedder is disabled, the prompt cannot be embedded, or
/// the stage deadline passes.
async fn semantic_hits(
    config: &Config,
    store: &dyn ContentStore,
    embedder: &dyn Embedder,
    candidates: &[ContentItem],
    prompt: &str,
) -> Vec<SemanticHit> {
    if !embedder.is_enabled() || candidates.is_empty() {
        return Vec::new();
    }

    let retrieval = &config.retrieval;
    let stage = async {
        let prompt_vec = match tokio::time::timeout(retrieval.embed_timeout(), embedder.embed(prompt)).await {
            Ok(Some(vector)) => vector,
            Ok(None) => {
                tracing::warn!("prompt embedding unavailable; skipping semantic matching");
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!("prompt embedding timed out; skipping semantic matching");
                return Vec::new();
            }
        };
        let prompt_vec = &prompt_vec;

        let lookups: Vec<_> = candidates
            .iter()
            .enumerate()
            .map(|(index, item)| async move {
                let vector = candidate_vector(config, store, embedder, item).await?;
                cosine_similarity(prompt_vec, &vector).map(|similarity| SemanticHit { index, similarity })
            })
            .collect();

        stream::iter(lookups)
            .buffer_unordered(retrieval.embed_concurrency)
            .filter_map(|hit| async move { hit })
            .collect::<Vec<_>>()
            .await
    };

    match tokio::time::timeout(retrieval.request_deadline(), stage).await {
        Ok(hits) => hits,
        Err(_) => {
            tracing::warn!(
                deadline_ms = retrieval.request_deadline_ms,
                candidates = candidates.len(),
                "semantic stage deadline exceeded; dropping semantic results"
            );
            Vec::new()
        }
    }
}

/// The embedding for one candidate, from cache when possible.
async fn candidate_vector(
    config: &Config,
    store: &dyn ContentStore,
    embedder: &dyn Embedder,
    item: &ContentItem,
) -> Option<Vec<f32>> {
    let text = composite_text(item, config.retrieval.composite_max_chars);
    let model = embedder.model_name();
    let use_cache = config.embedding.cache;
    let hash = content_hash(&text);

    if use_cache {
        match store.cached_embedding(&hash, model).await {
            Ok(Some(vector)) => return Some(vector),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(item_id = %item.id, error = %err, "embedding cache read failed");
            }
        }
    }

    match tokio::time::timeout(config.retrieval.embed_timeout(), embedder.embed(&text)).await {
        Ok(Some(vector)) => {
            if use_cache {
                if let Err(err) = store.store_embedding(&hash, model, &vector).await {
                    tracing::warn!(item_id = %item.id, error = %err, "embedding cache write failed");
                }
            }
            Some(vector)
        }
        Ok(None) => {
            tracing::warn!(item_id = %item.id, "candidate embedding failed; excluded from semantic matching");
            None
        }
        Err(_) => {
            tracing::warn!(item_id = %item.id, "candidate embedding timed out; excluded from semantic matching");
            None
        }
    }
}
