//! MTGuru HTTP API
//!
//! Axum-based HTTP server exposing the embedding proxy routes and the
//! client-facing gateway routes.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a
//! pure inner function. The inner functions are directly testable without
//! axum dispatch machinery; full-router dispatch is covered by the
//! integration tests against simulated upstreams.
//!
//! Endpoints:
//! - POST /prompt      — generate a semantic card description
//! - POST /insert      — embed card data and upsert it into the vector index
//! - POST /search      — semantic card search (proxy contract)
//! - POST /api/search  — semantic card search with metadata filters (UI contract)
//! - GET  /api/health  — gateway liveness check
//! - GET  /health      — server info
//! - GET  /version     — version info
//! - anything else     — `{"status": 404}`

use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

use mtguru_core::chat::card_prompt_messages;
use mtguru_core::index::{metadata_filter, IndexMatch, VectorEntry, VectorizeIndexClient};
use mtguru_core::models::{CardMetadata, Match, SearchFilters, SearchResponse};
use mtguru_core::{
    CloudflareConfig, EmbeddingBackend, MtguruConfig, MtguruError, WorkersAiChatClient,
    WorkersAiEmbeddingClient,
};

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: MtguruConfig,
    pub embedder: Arc<dyn EmbeddingBackend>,
    pub chat: WorkersAiChatClient,
    pub index: VectorizeIndexClient,
}

impl AppState {
    /// Build the upstream clients from configuration.
    pub fn from_config(config: MtguruConfig) -> Result<Self, MtguruError> {
        let cloudflare = CloudflareConfig::from_settings(&config.cloudflare);

        let embedder =
            WorkersAiEmbeddingClient::new(cloudflare.clone(), config.embedding.clone())?;
        let chat = WorkersAiChatClient::new(cloudflare.clone(), config.chat.clone())?;
        let index = VectorizeIndexClient::new(cloudflare, config.index.clone())?;

        Ok(Self {
            config,
            embedder: Arc::new(embedder),
            chat,
            index,
        })
    }
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = build_cors(&state.config.http.allowed_origin);

    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/prompt", post(prompt_handler))
        .route("/insert", post(insert_handler))
        .route("/search", post(search_handler))
        .route("/api/search", post(api_search_handler))
        .route("/api/health", get(api_health_handler))
        .fallback(not_found_handler)
        .layer(cors)
        .with_state(state)
}

fn build_cors(allowed_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if allowed_origin == "*" {
        return cors.allow_origin(Any);
    }

    match allowed_origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!(origin = %allowed_origin, "Invalid allowed_origin; falling back to any");
            cors.allow_origin(Any)
        }
    }
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("MTGuru HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct InsertRequest {
    pub id: String,
    pub data: serde_json::Value,
    #[serde(default)]
    pub metadata: CardMetadata,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiSearchRequest {
    pub query: Option<String>,
    #[serde(default)]
    pub filters: SearchFilters,
}

// ============================================================================
// Response helpers
// ============================================================================

/// Standard error body: machine-readable `code`, human-readable `error`.
pub fn error_body(code: &str, message: impl Into<String>) -> serde_json::Value {
    serde_json::json!({
        "status": "error",
        "code": code,
        "error": message.into(),
    })
}

fn ok_json<T: serde::Serialize>(value: &T) -> (StatusCode, serde_json::Value) {
    match serde_json::to_value(value) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_body("internal", e.to_string()),
        ),
    }
}

/// Decode an index match into the pinned wire schema. Metadata that does not
/// decode as card metadata degrades to the empty mapping rather than failing
/// the whole result set.
pub fn to_wire_match(index_match: IndexMatch) -> Match {
    let IndexMatch {
        id,
        score,
        metadata,
    } = index_match;

    let metadata = match metadata {
        Some(value) => match serde_json::from_value::<CardMetadata>(value) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "Match metadata did not decode");
                CardMetadata::default()
            }
        },
        None => CardMetadata::default(),
    };

    Match {
        id,
        score,
        metadata,
    }
}

/// Card data is embedded as text: strings pass through, anything else is
/// compact-serialized JSON.
pub fn embedding_text(data: &serde_json::Value) -> String {
    match data {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health — server info, no upstream calls (the upstreams are
/// metered; liveness here means "the proxy is up").
pub fn health_inner(config: &MtguruConfig) -> (StatusCode, serde_json::Value) {
    (
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "embedding_model": config.embedding.model,
            "index": config.index.name,
        }),
    )
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "mtguru/1",
    })
}

/// Inner prompt — wraps the payload in the card-description template and
/// runs the chat model.
pub async fn prompt_inner(
    state: &AppState,
    req: PromptRequest,
) -> (StatusCode, serde_json::Value) {
    let messages = card_prompt_messages(&req.data);

    match state.chat.generate(&messages).await {
        Ok(response) => (StatusCode::OK, serde_json::json!({ "response": response })),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            error_body("prompt_failed", e.to_string()),
        ),
    }
}

/// Inner insert — embeds the card data and upserts one index entry per
/// returned vector, all under the given id with the given metadata.
pub async fn insert_inner(
    state: &AppState,
    req: InsertRequest,
) -> (StatusCode, serde_json::Value) {
    if req.id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_body("empty_id", "id field is required"),
        );
    }

    let text = embedding_text(&req.data);

    let vectors = match state.embedder.embed_batch(&[text]).await {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::BAD_GATEWAY,
                error_body("embedding_failed", e.to_string()),
            );
        }
    };

    let metadata = match serde_json::to_value(&req.metadata) {
        Ok(m) => m,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("internal", e.to_string()),
            );
        }
    };

    let entries: Vec<VectorEntry> = vectors
        .into_iter()
        .map(|values| VectorEntry {
            id: req.id.clone(),
            values,
            metadata: metadata.clone(),
        })
        .collect();

    match state.index.upsert(&entries).await {
        Ok(ack) => (
            StatusCode::OK,
            serde_json::json!({
                "mutation_id": ack.mutation_id,
                "count": entries.len(),
            }),
        ),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            error_body("index_failed", e.to_string()),
        ),
    }
}

/// Inner search for the proxy contract — no filters.
pub async fn search_inner(
    state: &AppState,
    req: SearchRequest,
) -> (StatusCode, serde_json::Value) {
    let query = match req.query {
        Some(q) if !q.trim().is_empty() => q,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                error_body("empty_query", "query field is required"),
            );
        }
    };

    run_search(state, &query, None).await
}

/// Inner search for the UI contract — applies the structured filters as a
/// metadata filter on the index query.
pub async fn api_search_inner(
    state: &AppState,
    req: ApiSearchRequest,
) -> (StatusCode, serde_json::Value) {
    let query = match req.query {
        Some(q) if !q.trim().is_empty() => q,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                error_body("empty_query", "query field is required"),
            );
        }
    };

    tracing::info!(query = %query, filters = ?req.filters, "Received search request");

    run_search(state, &query, metadata_filter(&req.filters)).await
}

/// Embed the query as a single-element batch, take the first vector, and run
/// the nearest-neighbor query. Both search surfaces share this path so they
/// can never drift apart in shape.
async fn run_search(
    state: &AppState,
    query: &str,
    filter: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let vectors = match state.embedder.embed_batch(&[query.to_string()]).await {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::BAD_GATEWAY,
                error_body("embedding_failed", e.to_string()),
            );
        }
    };

    let Some(vector) = vectors.into_iter().next() else {
        return (
            StatusCode::BAD_GATEWAY,
            error_body("embedding_failed", "embedding model returned no vectors"),
        );
    };

    match state.index.query(&vector, filter).await {
        Ok(matches) => {
            let response = SearchResponse::new(matches.into_iter().map(to_wire_match).collect());
            ok_json(&response)
        }
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            error_body("index_failed", e.to_string()),
        ),
    }
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

fn invalid_json(rejection: JsonRejection) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(error_body("invalid_json", rejection.body_text())),
    )
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.config);
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn api_health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

pub async fn prompt_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> impl IntoResponse {
    match payload {
        Ok(Json(req)) => {
            let (status, body) = prompt_inner(&state, req).await;
            (status, Json(body))
        }
        Err(rejection) => invalid_json(rejection),
    }
}

pub async fn insert_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<InsertRequest>, JsonRejection>,
) -> impl IntoResponse {
    match payload {
        Ok(Json(req)) => {
            let (status, body) = insert_inner(&state, req).await;
            (status, Json(body))
        }
        Err(rejection) => invalid_json(rejection),
    }
}

pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> impl IntoResponse {
    match payload {
        Ok(Json(req)) => {
            let (status, body) = search_inner(&state, req).await;
            (status, Json(body))
        }
        Err(rejection) => invalid_json(rejection),
    }
}

pub async fn api_search_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ApiSearchRequest>, JsonRejection>,
) -> impl IntoResponse {
    match payload {
        Ok(Json(req)) => {
            let (status, body) = api_search_inner(&state, req).await;
            (status, Json(body))
        }
        Err(rejection) => invalid_json(rejection),
    }
}

/// Any unrouted path: the fixed not-found shape, no side effects.
pub async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "status": 404 })),
    )
}

// ============================================================================
// Unit Tests — inner functions and pure helpers
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use mtguru_core::config::{
        ChatConfig, CloudflareSettings, EmbeddingConfig, HttpConfig, IndexConfig, ServiceConfig,
    };

    /// State wired to an unreachable upstream. Fine for tests that must
    /// reject before any upstream call is made.
    fn offline_state() -> AppState {
        let config = MtguruConfig {
            service: ServiceConfig {
                log_level: "info".to_string(),
            },
            cloudflare: CloudflareSettings {
                api_base: "http://127.0.0.1:9".to_string(),
                account_id: "test-account".to_string(),
                api_token: "test-token".to_string(),
            },
            http: HttpConfig::default(),
            embedding: EmbeddingConfig {
                max_retries: 1,
                retry_delay_ms: 1,
                ..EmbeddingConfig::default()
            },
            chat: ChatConfig::default(),
            index: IndexConfig {
                max_retries: 1,
                retry_delay_ms: 1,
                ..IndexConfig::default()
            },
        };
        AppState::from_config(config).expect("state should build without network")
    }

    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string(), "version must be string");
        assert_eq!(v["protocol"], "mtguru/1", "protocol must be mtguru/1");
    }

    #[test]
    fn test_health_inner_reports_configured_upstreams() {
        let state = offline_state();
        let (status, body) = health_inner(&state.config);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["embedding_model"], "@cf/baai/bge-base-en-v1.5");
        assert_eq!(body["index"], "mtguru-cards");
    }

    #[test]
    fn test_error_body_shape() {
        let body = error_body("empty_query", "query field is required");
        assert_eq!(body["status"], "error");
        assert_eq!(body["code"], "empty_query");
        assert_eq!(body["error"], "query field is required");
    }

    #[test]
    fn test_embedding_text_passes_strings_through() {
        let data = serde_json::json!("Creature — Bird. Flying.");
        assert_eq!(embedding_text(&data), "Creature — Bird. Flying.");
    }

    #[test]
    fn test_embedding_text_compacts_objects() {
        let data = serde_json::json!({ "type_line": "Instant" });
        assert_eq!(embedding_text(&data), r#"{"type_line":"Instant"}"#);
    }

    #[test]
    fn test_to_wire_match_decodes_metadata() {
        let m = to_wire_match(IndexMatch {
            id: "a".to_string(),
            score: 0.8,
            metadata: Some(serde_json::json!({ "name": "Storm Crow", "rarity": "common" })),
        });
        assert_eq!(m.metadata.name, "Storm Crow");
        assert_eq!(m.metadata.rarity, "common");
    }

    #[test]
    fn test_to_wire_match_degrades_undecodable_metadata() {
        let m = to_wire_match(IndexMatch {
            id: "a".to_string(),
            score: 0.8,
            metadata: Some(serde_json::json!("not an object")),
        });
        assert_eq!(m.id, "a");
        assert_eq!(m.metadata, CardMetadata::default());
    }

    #[tokio::test]
    async fn test_search_inner_empty_query() {
        let state = offline_state();
        let req = SearchRequest {
            query: Some("".to_string()),
        };

        let (status, body) = search_inner(&state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "empty_query");
    }

    #[tokio::test]
    async fn test_search_inner_whitespace_query() {
        let state = offline_state();
        let req = SearchRequest {
            query: Some("   ".to_string()),
        };

        let (status, body) = search_inner(&state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_search_inner_no_query() {
        let state = offline_state();
        let req = SearchRequest { query: None };

        let (status, body) = search_inner(&state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "empty_query");
    }

    #[tokio::test]
    async fn test_api_search_inner_empty_query() {
        let state = offline_state();
        let req = ApiSearchRequest {
            query: Some(" ".to_string()),
            filters: SearchFilters::default(),
        };

        let (status, body) = api_search_inner(&state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "empty_query");
    }

    #[tokio::test]
    async fn test_insert_inner_empty_id() {
        let state = offline_state();
        let req = InsertRequest {
            id: "  ".to_string(),
            data: serde_json::json!("some card text"),
            metadata: CardMetadata::default(),
        };

        let (status, body) = insert_inner(&state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "empty_id");
    }
}
