//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/ai/search` | Hybrid search over the caller's content |
//! | `POST` | `/api/ai/categorize` | Classify page signals without saving |
//! | `POST` | `/api/content` | Capture content (one row per segment) |
//! | `GET`  | `/api/content` | List the caller's content with per-segment counts |
//! | `GET`  | `/api/events` | Server-sent `content_update` events |
//!
//! Every `/api` route requires an `X-Owner-Id` header naming the
//! authenticated owner. Token verification happens upstream.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "prompt must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `no_segment` (422),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser extension
//! and web dashboard can call the API directly.

use axum::{
    extract::{FromRequestParts, Query, State},
    http::{request::Parts, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use synapse_core::classify::{ClassificationResult, Signals};
use synapse_core::models::{ContentItem, Segment, SegmentCount};
use synapse_core::search::SearchResponse;

use crate::capture::{CaptureOutcome, CaptureRequest};
use crate::error::ServiceError;
use crate::notify::next_for_owner;
use crate::services::Services;

/// Header carrying the authenticated owner id.
pub const OWNER_HEADER: &str = "x-owner-id";

#[derive(Clone)]
struct AppState {
    services: Arc<Services>,
}

/// Build the application router.
pub fn router(services: Arc<Services>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/ai/search", post(handle_search))
        .route("/api/ai/categorize", post(handle_categorize))
        .route("/api/content", post(handle_capture).get(handle_list))
        .route("/api/events", get(handle_events))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { services })
}

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(services: Arc<Services>) -> anyhow::Result<()> {
    let bind_addr = services.config.server.bind.clone();
    let app = router(services);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(bind = %bind_addr, "server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: message.into(),
    }
}

fn no_segment(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        code: "no_segment".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(message) => bad_request(message),
            ServiceError::NoSegmentDetermined => no_segment(err.to_string()),
            ServiceError::Storage(_) => {
                tracing::error!(error = %err, "request failed");
                internal("storage failure")
            }
        }
    }
}

// ============ Owner extraction ============

/// The owner named by the `X-Owner-Id` header.
pub struct OwnerId(pub String);

impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| OwnerId(v.to_string()))
            .ok_or_else(|| unauthorized("missing X-Owner-Id header"))
    }
}

fn parse_segments(labels: &[String]) -> Result<Vec<Segment>, AppError> {
    labels
        .iter()
        .map(|label| {
            Segment::from_label(label)
                .ok_or_else(|| bad_request(format!("unknown segment: {}", label)))
        })
        .collect()
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/ai/search ============

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    segments: Vec<String>,
}

async fn handle_search(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let segments = parse_segments(&req.segments)?;
    let response = state
        .services
        .search(&owner_id, &req.prompt, &segments)
        .await?;
    Ok(Json(response))
}

// ============ POST /api/ai/categorize ============

#[derive(Serialize)]
struct CategorizeResponse {
    classification: ClassificationResult,
}

async fn handle_categorize(
    State(state): State<AppState>,
    OwnerId(_owner_id): OwnerId,
    Json(signals): Json<Signals>,
) -> Json<CategorizeResponse> {
    let classification = state.services.classify(&signals).await;
    Json(CategorizeResponse { classification })
}

// ============ POST /api/content ============

#[derive(Serialize)]
struct CaptureResponse {
    #[serde(flatten)]
    outcome: CaptureOutcome,
    message: String,
}

async fn handle_capture(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Json(req): Json<CaptureRequest>,
) -> Result<(StatusCode, Json<CaptureResponse>), AppError> {
    let outcome = state.services.capture(&owner_id, req).await?;
    let message = if outcome.is_multi_segment {
        format!("Content saved to {} segments", outcome.segments.len())
    } else {
        "Content saved".to_string()
    };
    Ok((StatusCode::CREATED, Json(CaptureResponse { outcome, message })))
}

// ============ GET /api/content ============

#[derive(Deserialize)]
struct ListQuery {
    segment: Option<String>,
    q: Option<String>,
}

#[derive(Serialize)]
struct ListResponse {
    content: Vec<ContentItem>,
    stats: Vec<SegmentCount>,
}

async fn handle_list(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    let segment = match query.segment.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(label) => Some(
            Segment::from_label(label)
                .ok_or_else(|| bad_request(format!("unknown segment: {}", label)))?,
        ),
    };

    let content = state
        .services
        .list(&owner_id, segment, query.q.as_deref())
        .await?;
    let stats = state
        .services
        .store
        .segment_stats(&owner_id)
        .await
        .map_err(ServiceError::Storage)?;

    Ok(Json(ListResponse { content, stats }))
}

// ============ GET /api/events ============

async fn handle_events(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let receiver = state.services.notifier.subscribe();
    tracing::debug!(owner_id = %owner_id, "live update subscriber connected");

    let events = stream::unfold((receiver, owner_id), |(mut receiver, owner_id)| async move {
        let event = next_for_owner(&mut receiver, &owner_id).await?;
        let sse = Event::default().event(event.name()).json_data(&event);
        Some((sse, (receiver, owner_id)))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
