//! Embedding trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that embedding backends implement, plus
//! pure helpers for similarity, BLOB serialization, and the composite text
//! that represents a content item in vector space.
//!
//! Concrete embedders (OpenAI, disabled) live in the `synapse` app crate.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::models::ContentItem;

/// An embedding backend.
///
/// `embed` returns `None` instead of an error: a missing credential or a
/// failed call means "no vector", and callers degrade by skipping semantic
/// matching for that text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, used to key cached vectors.
    fn model_name(&self) -> &str;

    /// Whether this embedder can produce vectors at all.
    fn is_enabled(&self) -> bool;

    async fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

/// Embedder used when no provider is configured.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn embed(&self, _text: &str) -> Option<Vec<f32>> {
        None
    }
}

/// The text embedded for a candidate: `"<segment>: <title> <content text>"`,
/// cut to `max_chars` characters.
pub fn composite_text(item: &ContentItem, max_chars: usize) -> String {
    format!("{}: {} {}", item.segment, item.title, item.content_text)
        .chars()
        .take(max_chars)
        .collect()
}

/// SHA-256 hex digest of `text`, used as the embedding cache key.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two vectors, in `[-1.0, 1.0]`.
///
/// Returns `None` when the similarity is undefined: empty vectors,
/// mismatched lengths, or a zero-norm operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return None;
    }

    Some((dot / denom).clamp(-1.0, 1.0))
}
