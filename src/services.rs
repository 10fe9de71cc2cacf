//! The wired-up service graph shared by the CLI and the HTTP server.

use anyhow::Result;
use std::sync::Arc;

use synapse_core::classify::{ClassificationResult, Classifier, Signals};
use synapse_core::embedding::Embedder;
use synapse_core::models::{ContentItem, Segment};
use synapse_core::search::SearchResponse;
use synapse_core::store::ContentStore;

use crate::capture::{capture_content, CaptureOutcome, CaptureRequest};
use crate::classifier::create_classifier;
use crate::config::{Config, ServiceCredentials};
use crate::embedding::create_embedder;
use crate::error::ServiceError;
use crate::notify::BroadcastNotifier;
use crate::search::search_content;
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate};

pub struct Services {
    pub config: Arc<Config>,
    pub store: Arc<dyn ContentStore>,
    pub embedder: Arc<dyn Embedder>,
    pub classifier: Arc<dyn Classifier>,
    pub notifier: Arc<BroadcastNotifier>,
}

impl Services {
    /// Open the database (creating and migrating it if needed) and build
    /// the remote clients selected by `config`.
    pub async fn open(config: Config, credentials: &ServiceCredentials) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::apply(&pool).await?;

        let embedder = create_embedder(&config.embedding, credentials)?;
        let classifier = create_classifier(&config.classifier, credentials)?;
        tracing::info!(
            db = %config.db.path.display(),
            embedder = embedder.model_name(),
            embeddings_enabled = embedder.is_enabled(),
            classifier = classifier.name(),
            "services ready"
        );

        Ok(Self::new(
            config,
            Arc::new(SqliteStore::new(pool)),
            embedder,
            classifier,
        ))
    }

    pub fn new(
        config: Config,
        store: Arc<dyn ContentStore>,
        embedder: Arc<dyn Embedder>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            embedder,
            classifier,
            notifier: Arc::new(BroadcastNotifier::new()),
        }
    }

    pub async fn search(
        &self,
        owner_id: &str,
        prompt: &str,
        segments: &[Segment],
    ) -> Result<SearchResponse, ServiceError> {
        search_content(
            &self.config,
            self.store.as_ref(),
            self.embedder.as_ref(),
            owner_id,
            prompt,
            segments,
        )
        .await
    }

    /// An owner's rows, newest first. A non-blank `query` narrows them to
    /// case-insensitive substring matches, capped at
    /// `retrieval.candidate_limit`.
    pub async fn list(
        &self,
        owner_id: &str,
        segment: Option<Segment>,
        query: Option<&str>,
    ) -> Result<Vec<ContentItem>, ServiceError> {
        let rows = match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(query) => {
                let segments = segment.map(|s| [s]);
                self.store
                    .search_by_owner(
                        owner_id,
                        Some(query),
                        self.config.retrieval.candidate_limit,
                        segments.as_ref().map(|s| s.as_slice()),
                    )
                    .await
            }
            None => self.store.find_by_owner(owner_id, segment).await,
        };
        rows.map_err(ServiceError::Storage)
    }

    pub async fn capture(
        &self,
        owner_id: &str,
        request: CaptureRequest,
    ) -> Result<CaptureOutcome, ServiceError> {
        capture_content(
            self.store.as_ref(),
            self.classifier.as_ref(),
            self.notifier.as_ref(),
            owner_id,
            request,
        )
        .await
    }

    pub async fn classify(&self, signals: &Signals) -> ClassificationResult {
        self.classifier.classify(signals).await
    }
}
