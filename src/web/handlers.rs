//! HTTP request handlers for the search and catalog API.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::state::AppState;
use crate::embeddings::HealthStatus;
use crate::error::SearchError;
use crate::metrics;
use crate::questions::{ListQuestions, NewQuestion, Question, QuestionUpdate};
use crate::search::{parse_tag_list, FusedResult, LexicalHit, SearchFilter, SemanticHit};

/// `SearchError` rendered as `{"error": message}` with a matching status.
#[derive(Debug)]
pub struct ApiError(pub SearchError);

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            SearchError::InvalidRequest(_) | SearchError::InvalidFilterCombination(_) => {
                StatusCode::BAD_REQUEST
            }
            SearchError::NotFound(_) => StatusCode::NOT_FOUND,
            SearchError::EmbeddingUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            SearchError::DimensionMismatch { .. }
            | SearchError::Index(_)
            | SearchError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, kind = self.0.kind(), "Request failed");
        } else {
            warn!(error = %self.0, kind = self.0.kind(), "Request rejected");
        }
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

// Malformed query strings, paths and bodies get the same JSON error body
impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(SearchError::InvalidRequest(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(SearchError::InvalidRequest(rejection.body_text()))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(SearchError::InvalidRequest(rejection.body_text()))
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Query string of the hybrid and semantic search endpoints
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    pub top_n: Option<usize>,
    pub difficulty: Option<String>,
    /// Comma-separated
    pub tags: Option<String>,
}

/// Query string of the keyword search endpoint
#[derive(Debug, Deserialize)]
pub struct KeywordParams {
    #[serde(default)]
    pub query: String,
    pub difficulty: Option<String>,
    pub tags: Option<String>,
    pub limit: Option<usize>,
}

/// Query string of the question listing endpoint
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub tags: Option<String>,
    pub difficulty: Option<String>,
    pub text: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<FusedResult>,
    /// True when the semantic branch was skipped
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    pub took_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub stored: usize,
    pub questions: Vec<Question>,
}

#[derive(Debug, Serialize)]
pub struct EmbeddingHealth {
    pub provider: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub embedding: EmbeddingHealth,
}

fn filter_from(difficulty: Option<String>, tags: Option<String>) -> SearchFilter {
    SearchFilter::new(
        difficulty,
        tags.as_deref().map(parse_tag_list).unwrap_or_default(),
    )
}

/// GET /api/v1/search
pub async fn search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> ApiResult<Json<SearchResponse>> {
    let Query(params) = params?;
    let start = Instant::now();
    let top_n = params.top_n.unwrap_or(state.config.search.default_top_n);
    let filter = filter_from(params.difficulty, params.tags);

    let outcome = state
        .search
        .hybrid_search_detailed(&params.query, filter, top_n)
        .await?;

    let took_ms = start.elapsed().as_millis() as u64;
    info!(
        results = outcome.results.len(),
        took_ms = took_ms,
        "Search completed"
    );

    Ok(Json(SearchResponse {
        query: params.query,
        degraded: outcome.is_degraded(),
        degraded_reason: outcome.degraded,
        results: outcome.results,
        took_ms,
    }))
}

/// GET /api/v1/semantic-search
pub async fn semantic_search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> ApiResult<Json<Vec<SemanticHit>>> {
    let Query(params) = params?;
    let top_n = params.top_n.unwrap_or(state.config.search.default_top_n);
    let filter = filter_from(params.difficulty, params.tags);
    let hits = state
        .search
        .semantic_search(&params.query, filter, top_n)
        .await?;
    Ok(Json(hits))
}

/// GET /api/v1/keyword-search
pub async fn keyword_search(
    State(state): State<AppState>,
    params: Result<Query<KeywordParams>, QueryRejection>,
) -> ApiResult<Json<Vec<LexicalHit>>> {
    let Query(params) = params?;
    let filter = filter_from(params.difficulty, params.tags);
    let hits = state
        .search
        .keyword_search(&params.query, filter, params.limit)
        .await?;
    Ok(Json(hits))
}

/// POST /api/v1/questions
pub async fn create_question(
    State(state): State<AppState>,
    new: Result<Json<NewQuestion>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Question>)> {
    let Json(new) = new?;
    let question = state.catalog.store_question(new).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

/// POST /api/v1/questions/bulk
pub async fn bulk_create_questions(
    State(state): State<AppState>,
    items: Result<Json<Vec<NewQuestion>>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<BulkResponse>)> {
    let Json(items) = items?;
    let questions = state.catalog.bulk_store_questions(items).await?;
    Ok((
        StatusCode::CREATED,
        Json(BulkResponse {
            stored: questions.len(),
            questions,
        }),
    ))
}

/// GET /api/v1/questions
pub async fn list_questions(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<Vec<Question>>> {
    let Query(params) = params?;
    let defaults = ListQuestions::default();
    let request = ListQuestions {
        tags: params.tags.as_deref().map(parse_tag_list).unwrap_or_default(),
        difficulty: params.difficulty,
        text: params.text,
        limit: params.limit.unwrap_or(defaults.limit),
        offset: params.offset.unwrap_or(defaults.offset),
    };
    Ok(Json(state.catalog.list_questions(request).await?))
}

/// GET /api/v1/questions/{id}
pub async fn get_question(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Question>> {
    let Path(id) = id?;
    Ok(Json(state.catalog.get_question(id).await?))
}

/// PATCH /api/v1/questions/{id}
pub async fn update_question(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    update: Result<Json<QuestionUpdate>, JsonRejection>,
) -> ApiResult<Json<Question>> {
    let Path(id) = id?;
    let Json(update) = update?;
    Ok(Json(state.catalog.update_question(id, update).await?))
}

/// DELETE /api/v1/questions/{id}
pub async fn delete_question(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    if state.catalog.delete_question(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(SearchError::NotFound(format!("question {}", id)).into())
    }
}

/// Health check endpoint.
///
/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let embedder = state.search.embedder();
    let status = match embedder.health_check().await {
        Ok(status) => status,
        Err(e) => HealthStatus::Unhealthy {
            error: format!("{:#}", e),
        },
    };

    let detail = match &status {
        HealthStatus::Healthy => None,
        HealthStatus::Degraded { reason } => Some(reason.clone()),
        HealthStatus::Unhealthy { error } => Some(error.clone()),
    };

    // Search keeps answering lexically without embeddings
    let overall = if status == HealthStatus::Healthy {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: overall.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        embedding: EmbeddingHealth {
            provider: embedder.provider_name().to_string(),
            status: status.label().to_string(),
            detail,
        },
    })
}

/// Prometheus metrics endpoint.
///
/// GET /metrics
pub async fn metrics_handler() -> impl IntoResponse {
    let output = metrics::gather_metrics();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], output)
}
