//! Client-visible error taxonomy for the capture and search pipelines.
//!
//! Remote-service failures never appear here: they degrade to fallbacks
//! inside the classifier and embedder.

use synapse_core::segments::SegmentError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Malformed request; nothing was done.
    #[error("{0}")]
    Validation(String),

    /// Classification yielded no valid segment; nothing was stored.
    #[error("no segment determined for captured content")]
    NoSegmentDetermined,

    /// The content store failed.
    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }
}

impl From<SegmentError> for ServiceError {
    fn from(err: SegmentError) -> Self {
        match err {
            SegmentError::NoSegmentDetermined => ServiceError::NoSegmentDetermined,
        }
    }
}
