//! Rank fusion for hybrid content search.
//!
//! The calling application fetches candidates, runs the fuzzy matcher and
//! the embedding stage, and hands their outputs to [`fuse`]. Fusion is pure:
//! no storage, network, or clock access.
//!
//! # Fusion Algorithm
//!
//! 1. **Fuzzy bucket**: every fuzzy hit, relevance `1 - distance`.
//! 2. **Semantic bucket**: the top `semantic_top_k` cosine matches not
//!    already in the fuzzy bucket, relevance `max(cosine, 0)`.
//! 3. **Basic bucket**: up to `basic_limit` remaining candidates in store
//!    order (newest first), relevance `basic_score`.
//! 4. Each result is scored `relevance × segment boost × time boost`.
//! 5. Stable sort by score, descending.
//! 6. The flat list is cut to `final_limit`; the per-segment grouping is
//!    built from the full sorted list.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::fuzzy::FuzzyHit;
use crate::models::{ContentItem, Segment};
use crate::temporal::{time_boost, TimeIntent};

/// Boost for items whose segment is in the requested filter.
pub const SEGMENT_MATCH_BOOST: f64 = 1.2;
/// Boost for items outside the requested filter.
pub const SEGMENT_MISS_BOOST: f64 = 0.8;

/// Fusion tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct FusionParams {
    pub final_limit: usize,
    pub semantic_top_k: usize,
    pub basic_limit: usize,
    pub basic_score: f64,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            final_limit: 20,
            semantic_top_k: 20,
            basic_limit: 10,
            basic_score: 0.5,
        }
    }
}

/// A cosine similarity between the prompt and one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SemanticHit {
    /// Position of the candidate in the candidate slice.
    pub index: usize,
    pub similarity: f32,
}

/// Which strategy surfaced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSource {
    Fuzzy,
    Semantic,
    Basic,
}

/// A content item with its fused score.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedResult {
    #[serde(flatten)]
    pub item: ContentItem,
    pub score: f64,
    pub source: MatchSource,
}

/// The response to a search.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<RankedResult>,
    pub grouped_results: BTreeMap<Segment, Vec<RankedResult>>,
    pub has_semantic_results: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_intent: Option<TimeIntent>,
}

/// Everything [`fuse`] combines.
#[derive(Debug, Clone, Copy)]
pub struct FusionInput<'a> {
    pub candidates: &'a [ContentItem],
    pub fuzzy: &'a [FuzzyHit],
    pub semantic: &'a [SemanticHit],
    pub segment_filter: &'a [Segment],
    pub time_intent: Option<&'a TimeIntent>,
}

/// `1.0` without a filter, otherwise a reward or penalty for membership.
pub fn segment_boost(segment: Segment, filter: &[Segment]) -> f64 {
    if filter.is_empty() {
        1.0
    } else if filter.contains(&segment) {
        SEGMENT_MATCH_BOOST
    } else {
        SEGMENT_MISS_BOOST
    }
}

/// Merge fuzzy, semantic, and basic matches into one ranked response.
pub fn fuse(input: FusionInput<'_>, params: &FusionParams) -> SearchResponse {
    let mut taken: HashSet<usize> = HashSet::new();
    let mut ranked: Vec<RankedResult> = Vec::new();

    let mut push = |index: usize, relevance: f64, source: MatchSource, ranked: &mut Vec<RankedResult>| {
        let Some(item) = input.candidates.get(index) else {
            return false;
        };
        if !taken.insert(index) {
            return false;
        }
        let score = relevance
            * segment_boost(item.segment, input.segment_filter)
            * time_boost(item, input.time_intent);
        ranked.push(RankedResult {
            item: item.clone(),
            score,
            source,
        });
        true
    };

    for hit in input.fuzzy {
        push(hit.index, 1.0 - hit.score.clamp(0.0, 1.0), MatchSource::Fuzzy, &mut ranked);
    }

    let mut semantic: Vec<SemanticHit> = input.semantic.to_vec();
    semantic.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut has_semantic_results = false;
    for hit in semantic.iter().take(params.semantic_top_k) {
        let relevance = f64::from(hit.similarity).max(0.0);
        has_semantic_results |= push(hit.index, relevance, MatchSource::Semantic, &mut ranked);
    }

    let mut basic = 0;
    for index in 0..input.candidates.len() {
        if basic >= params.basic_limit {
            break;
        }
        if push(index, params.basic_score, MatchSource::Basic, &mut ranked) {
            basic += 1;
        }
    }

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut grouped_results: BTreeMap<Segment, Vec<RankedResult>> = BTreeMap::new();
    for result in &ranked {
        grouped_results
            .entry(result.item.segment)
            .or_default()
            .push(result.clone());
    }

    ranked.truncate(params.final_limit);

    SearchResponse {
        results: ranked,
        grouped_results,
        has_semantic_results,
        time_intent: input.time_intent.cloned(),
    }
}
