//! Weighted fuzzy matching over content fields.
//!
//! Each query term is located in each field with approximate substring
//! matching (Sellers' edit-distance variant, where a match may start and
//! end anywhere in the field). A term's distance is its edit count divided
//! by its length, so `0.0` is an exact occurrence and `1.0` is no useful
//! match. Terms farther than the threshold count as `1.0`.
//!
//! A field's distance is the best distance of any term; the item score is
//! the weighted mean of field distances. Items where no field has a term
//! within the threshold are not returned. Results are ordered best first
//! (lowest score), ties keeping input order.

use crate::models::ContentItem;

/// Terms shorter than this are ignored unless nothing else remains.
const MIN_TERM_CHARS: usize = 3;

/// Fields longer than this are only matched over their leading characters.
const MAX_FIELD_CHARS: usize = 2000;

const STOP_WORDS: &[&str] = &[
    "the", "are", "was", "were", "been", "being", "for", "with", "from", "and", "but", "not",
    "then", "about", "into", "that", "this", "what", "when", "which", "some", "any", "all", "show",
    "find", "my", "me",
];

/// Default threshold on normalized per-term distance.
pub const DEFAULT_THRESHOLD: f64 = 0.4;

/// Relative importance of each searchable field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldWeights {
    pub title: f64,
    pub content_text: f64,
    pub segment: f64,
    pub url: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            title: 0.4,
            content_text: 0.3,
            segment: 0.2,
            url: 0.1,
        }
    }
}

/// One matched item. `score` is a distance in `[0, 1]`; lower is closer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyHit {
    /// Position of the item in the searched slice.
    pub index: usize,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    weights: FieldWeights,
    threshold: f64,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new(FieldWeights::default(), DEFAULT_THRESHOLD)
    }
}

impl FuzzyMatcher {
    pub fn new(weights: FieldWeights, threshold: f64) -> Self {
        Self { weights, threshold }
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self::new(FieldWeights::default(), threshold)
    }

    /// Match `query` against `items`, best first.
    pub fn search(&self, items: &[ContentItem], query: &str) -> Vec<FuzzyHit> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let total_weight = self.weights.title
            + self.weights.content_text
            + self.weights.segment
            + self.weights.url;
        if total_weight <= 0.0 {
            return Vec::new();
        }

        let mut hits: Vec<FuzzyHit> = items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| {
                let fields = [
                    (item.title.as_str(), self.weights.title),
                    (item.content_text.as_str(), self.weights.content_text),
                    (item.segment.as_str(), self.weights.segment),
                    (item.url.as_str(), self.weights.url),
                ];
                let mut matched = false;
                let mut weighted = 0.0;
                for (text, weight) in fields {
                    let distance = self.field_distance(&terms, text);
                    matched |= distance < 1.0;
                    weighted += weight * distance;
                }
                matched.then(|| FuzzyHit {
                    index,
                    score: weighted / total_weight,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits
    }

    fn field_distance(&self, terms: &[Vec<char>], text: &str) -> f64 {
        if text.is_empty() {
            return 1.0;
        }
        let text: Vec<char> = text
            .chars()
            .take(MAX_FIELD_CHARS)
            .flat_map(char::to_lowercase)
            .collect();
        terms
            .iter()
            .map(|term| term_distance(term, &text))
            .filter(|d| *d <= self.threshold)
            .fold(1.0, f64::min)
    }
}

/// Split a query into lower-cased match terms.
///
/// Stop words and very short tokens are dropped. If that leaves nothing,
/// the whole trimmed query is used as a single term.
pub fn query_terms(query: &str) -> Vec<Vec<char>> {
    let lower = query.to_lowercase();
    let terms: Vec<Vec<char>> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TERM_CHARS && !STOP_WORDS.contains(t))
        .map(|t| t.chars().collect())
        .collect();
    if !terms.is_empty() {
        return terms;
    }
    let trimmed = lower.trim();
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![trimmed.chars().collect()]
    }
}

/// Normalized distance of the best approximate occurrence of `term` in `text`.
fn term_distance(term: &[char], text: &[char]) -> f64 {
    let m = term.len();
    if m == 0 {
        return 1.0;
    }
    // prev[j] = edits to match term[..i] ending at text[..j], free start.
    let mut prev = vec![0usize; text.len() + 1];
    let mut curr = vec![0usize; text.len() + 1];
    for (i, tc) in term.iter().enumerate() {
        curr[0] = i + 1;
        for (j, xc) in text.iter().enumerate() {
            let substitution = prev[j] + usize::from(tc != xc);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let best = prev.iter().copied().min().unwrap_or(m);
    (best as f64 / m as f64).min(1.0)
}
