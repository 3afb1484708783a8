//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/vibe` | Active search backend and query cache occupancy |
//! | `GET`  | `/search` | Single-topic search (`topic`, `max_results`, `content_type`) |
//! | `GET`  | `/search/youtube` | Video-only search (`topic`, `max_results`) |
//! | `GET`  | `/bookshelf` | Curated resources for comma-separated `topics` |
//! | `POST` | `/bookshelf` | Same, topics in the body |
//! | `POST` | `/bookshelf/refresh` | Same, bypassing every cache |
//! | `POST` | `/bookshelf/prewarm` | Fill the caches (body optional) |
//! | `POST` | `/speech` | Text to MP3 |
//! | `GET`/`POST` | `/posts` | List or create posts |
//! | `GET`/`PUT`/`DELETE` | `/posts/{id}` | Read, replace or delete a post |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "text is required and cannot be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `speech_unavailable` (502), `internal` (500). Malformed query strings,
//! bodies and path ids are reported as `bad_request` too.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser frontends on
//! other origins can call the API.

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::bookshelf::{split_topics, vibe_message, Bookshelf};
use crate::config::Config;
use crate::models::{CacheStats, Resource};
use crate::posts::{self, Post, PostInput};
use crate::speech::{prepare_text, SpeechClient};
use crate::{db, migrate};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    shelf: Arc<Bookshelf>,
    speech: Arc<SpeechClient>,
    pool: SqlitePool,
}

impl AppState {
    pub fn new(shelf: Bookshelf, speech: SpeechClient, pool: SqlitePool) -> Self {
        Self {
            shelf: Arc::new(shelf),
            speech: Arc::new(speech),
            pool,
        }
    }

    /// Build every component from config, opening the database and
    /// creating its schema if needed.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(
            Bookshelf::from_config(config)?,
            SpeechClient::new(&config.speech)?,
            pool,
        ))
    }
}

/// Starts the HTTP server on `[server].bind` and serves until the process
/// is terminated.
pub async fn run_server(config: &Config) -> Result<()> {
    let state = AppState::from_config(config).await?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("bookshelf server listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

/// The full route table with CORS applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/vibe", get(handle_vibe))
        .route("/search", get(handle_search))
        .route("/search/youtube", get(handle_search_youtube))
        .route("/bookshelf", get(handle_bookshelf_get).post(handle_bookshelf_post))
        .route("/bookshelf/refresh", post(handle_bookshelf_refresh))
        .route("/bookshelf/prewarm", post(handle_bookshelf_prewarm))
        .route("/speech", post(handle_speech))
        .route("/posts", get(handle_list_posts).post(handle_create_post))
        .route(
            "/posts/{id}",
            get(handle_get_post)
                .put(handle_update_post)
                .delete(handle_delete_post),
        )
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn speech_unavailable(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "speech_unavailable".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    warn!("request failed: {:#}", err);
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: format!("{:#}", err),
    }
}

/// Extractor rejections (bad query string, body or path) become `bad_request`.
fn rejected(err: impl std::fmt::Display) -> AppError {
    bad_request(err.to_string())
}

// ============ GET /health, GET /vibe ============

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

#[derive(Serialize)]
struct VibeResponse {
    status: &'static str,
    ready: bool,
    backend: &'static str,
    cache: CacheStats,
    message: &'static str,
}

async fn handle_vibe(State(state): State<AppState>) -> Json<VibeResponse> {
    let backend = state.shelf.backend_name();
    Json(VibeResponse {
        status: "chill",
        ready: true,
        backend,
        cache: state.shelf.cache_stats(),
        message: vibe_message(backend),
    })
}

// ============ Search ============

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default = "default_search_topic")]
    topic: String,
    #[serde(default = "default_max_results")]
    max_results: usize,
    content_type: Option<String>,
}

#[derive(Deserialize)]
struct VideoSearchParams {
    #[serde(default = "default_video_topic")]
    topic: String,
    #[serde(default = "default_max_results")]
    max_results: usize,
}

fn default_search_topic() -> String {
    "merge sort algorithm".to_string()
}

fn default_video_topic() -> String {
    "quadratic equation tutorial".to_string()
}

fn default_max_results() -> usize {
    5
}

#[derive(Serialize)]
struct SearchResponse {
    topic: String,
    results: Vec<Resource>,
}

/// Handler for `GET /search`. The optional `content_type` filter matches the
/// raw `type` of each hit.
async fn handle_search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Query(params) = params.map_err(rejected)?;
    let mut results = state
        .shelf
        .search()
        .search(&params.topic, params.max_results, false)
        .await;
    if let Some(filter) = params.content_type.as_deref().filter(|f| !f.is_empty()) {
        results.retain(|r| r.kind.map(|k| k.as_str()) == Some(filter));
    }
    Ok(Json(SearchResponse {
        topic: params.topic,
        results,
    }))
}

async fn handle_search_youtube(
    State(state): State<AppState>,
    params: Result<Query<VideoSearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Query(params) = params.map_err(rejected)?;
    let results = state
        .shelf
        .search()
        .search_video(&params.topic, params.max_results)
        .await;
    Ok(Json(SearchResponse {
        topic: params.topic,
        results,
    }))
}

// ============ Bookshelf ============

#[derive(Deserialize)]
struct BookshelfQuery {
    #[serde(default = "default_bookshelf_topics")]
    topics: String,
    #[serde(default = "default_per_topic")]
    per_topic: usize,
    content_type: Option<String>,
}

#[derive(Deserialize)]
struct ContentTypeQuery {
    content_type: Option<String>,
}

/// Body of `POST /bookshelf`, `/bookshelf/refresh` and `/bookshelf/prewarm`.
#[derive(Debug, Deserialize)]
pub struct BookshelfRequest {
    pub topics: Vec<String>,
    #[serde(default = "default_per_topic")]
    pub per_topic: usize,
}

fn default_bookshelf_topics() -> String {
    "merge sort,binary search,divide and conquer".to_string()
}

fn default_per_topic() -> usize {
    3
}

#[derive(Serialize)]
struct ResourcesResponse {
    resources: Vec<Resource>,
}

async fn handle_bookshelf_get(
    State(state): State<AppState>,
    params: Result<Query<BookshelfQuery>, QueryRejection>,
) -> Result<Json<ResourcesResponse>, AppError> {
    let Query(params) = params.map_err(rejected)?;
    let topics = split_topics(&params.topics);
    let resources = state
        .shelf
        .get_resources(&topics, params.per_topic, false, params.content_type.as_deref())
        .await;
    Ok(Json(ResourcesResponse { resources }))
}

async fn handle_bookshelf_post(
    State(state): State<AppState>,
    params: Result<Query<ContentTypeQuery>, QueryRejection>,
    body: Result<Json<BookshelfRequest>, JsonRejection>,
) -> Result<Json<ResourcesResponse>, AppError> {
    let Query(params) = params.map_err(rejected)?;
    let Json(body) = body.map_err(rejected)?;
    let resources = state
        .shelf
        .get_resources(&body.topics, body.per_topic, false, params.content_type.as_deref())
        .await;
    Ok(Json(ResourcesResponse { resources }))
}

async fn handle_bookshelf_refresh(
    State(state): State<AppState>,
    body: Result<Json<BookshelfRequest>, JsonRejection>,
) -> Result<Json<ResourcesResponse>, AppError> {
    let Json(body) = body.map_err(rejected)?;
    let resources = state
        .shelf
        .get_resources(&body.topics, body.per_topic, true, None)
        .await;
    Ok(Json(ResourcesResponse { resources }))
}

/// Handler for `POST /bookshelf/prewarm`. An empty body, `null`, or an empty
/// topic list warms the demo topics.
async fn handle_bookshelf_prewarm(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ResourcesResponse>, AppError> {
    let request: Option<BookshelfRequest> = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        serde_json::from_slice(&body).map_err(rejected)?
    };
    let resources = match request {
        Some(r) => state.shelf.prewarm(Some(r.topics), r.per_topic).await,
        None => state.shelf.prewarm(None, default_per_topic()).await,
    };
    Ok(Json(ResourcesResponse { resources }))
}

// ============ POST /speech ============

#[derive(Deserialize)]
struct SpeechRequest {
    #[serde(default)]
    text: String,
    #[serde(default = "default_lang")]
    lang: String,
}

fn default_lang() -> String {
    "en".to_string()
}

async fn handle_speech(
    State(state): State<AppState>,
    body: Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = body.map_err(rejected)?;
    let text = prepare_text(&body.text, state.speech.max_chars())
        .ok_or_else(|| bad_request("text is required and cannot be empty"))?;

    let audio = state
        .speech
        .synthesize(&text, &body.lang)
        .await
        .map_err(|e| {
            warn!("speech failed: {:#}", e);
            speech_unavailable(format!("{:#}", e))
        })?;

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}

// ============ Posts ============

#[derive(Serialize)]
struct DataResponse<T> {
    data: T,
}

async fn handle_list_posts(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<Vec<Post>>>, AppError> {
    let data = posts::list(&state.pool).await.map_err(internal)?;
    Ok(Json(DataResponse { data }))
}

async fn handle_create_post(
    State(state): State<AppState>,
    body: Result<Json<PostInput>, JsonRejection>,
) -> Result<(StatusCode, Json<DataResponse<Post>>), AppError> {
    let Json(input) = body.map_err(rejected)?;
    input.validate().map_err(rejected)?;
    let data = posts::create(&state.pool, &input).await.map_err(internal)?;
    Ok((StatusCode::CREATED, Json(DataResponse { data })))
}

async fn handle_get_post(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<DataResponse<Post>>, AppError> {
    let Path(id) = id.map_err(rejected)?;
    let data = posts::get(&state.pool, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("post with id {} not found", id)))?;
    Ok(Json(DataResponse { data }))
}

async fn handle_update_post(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<PostInput>, JsonRejection>,
) -> Result<Json<DataResponse<Post>>, AppError> {
    let Path(id) = id.map_err(rejected)?;
    let Json(input) = body.map_err(rejected)?;
    input.validate().map_err(rejected)?;
    let data = posts::update(&state.pool, id, &input)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("post with id {} not found", id)))?;
    Ok(Json(DataResponse { data }))
}

async fn handle_delete_post(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let Path(id) = id.map_err(rejected)?;
    if posts::delete(&state.pool, id).await.map_err(internal)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("post with id {} not found", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bookshelf_request_defaults() {
        let req: BookshelfRequest = serde_json::from_str(r#"{"topics": ["a"]}"#).unwrap();
        assert_eq!(req.per_topic, 3);
        assert!(serde_json::from_str::<BookshelfRequest>(r#"{"per_topic": 2}"#).is_err());
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let resp = not_found("post with id 9 not found").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["code"], "not_found");
        assert_eq!(json["error"]["message"], "post with id 9 not found");
    }
}
