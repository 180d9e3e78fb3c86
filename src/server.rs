//! HTTP API over the retrieval service.

use std::{net::SocketAddr, sync::Arc, time::Instant};

use axum::{
    Json,
    Router,
    extract::{
        Query,
        State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    error::{Error, Result},
    retrieval::{DEFAULT_LIMIT, SearchResult},
    service::{HealthReport, ServiceContext},
    vector_index::CollectionInfo,
};

type AppState = Arc<ServiceContext>;

/// Default similarity floor for `/query`.
pub const DEFAULT_QUERY_THRESHOLD: f32 = 0.3;

pub fn router(context: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/query", post(query))
        .route("/search", post(search))
        .route("/collection/info", get(collection_info))
        .route("/config", get(config))
        .with_state(context)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(context: AppState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router(context))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}

/// An [`Error`] rendered as `{"detail": ...}` with a matching status code.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(Error::Validation(rejection.body_text()))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::NoResults { .. } => StatusCode::NOT_FOUND,
            // A missing collection is a deployment fault, not an empty match.
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self.0);
        } else {
            tracing::debug!(status = status.as_u16(), "{}", self.0);
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Bienvenido a la API del Sistema RAG - Cambio Climático",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Sistema de Retrieval-Augmented Generation para consultas sobre cambio climático",
        "endpoints": {
            "health": "/health - Estado del sistema",
            "query": "/query - Consulta RAG completa",
            "search": "/search - Solo búsqueda semántica",
            "collection_info": "/collection/info - Estadísticas de la colección",
            "config": "/config - Configuración actual",
        },
    }))
}

async fn health(State(context): State<AppState>) -> Json<HealthReport> {
    Json(context.health().await)
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_use_llm")]
    pub use_llm: bool,
    #[serde(default = "default_query_threshold")]
    pub score_threshold: f32,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_use_llm() -> bool {
    true
}

fn default_query_threshold() -> f32 {
    DEFAULT_QUERY_THRESHOLD
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub question: String,
    pub answer: Option<String>,
    pub search_results: Vec<SearchResult>,
    pub top_result: SearchResult,
    /// Seconds, rounded to two decimals.
    pub processing_time: f64,
    pub total_results: usize,
    pub status: &'static str,
}

async fn query(
    State(context): State<AppState>,
    payload: std::result::Result<Json<QueryRequest>, JsonRejection>,
) -> std::result::Result<Json<QueryResponse>, ApiError> {
    let started = Instant::now();
    let Json(request) = payload?;
    tracing::info!(question = %request.question, "query");

    let retriever = &context.retriever;
    let results = retriever
        .retrieve(&request.question, request.limit, request.score_threshold)
        .await?;

    let answer = retriever
        .answer_if(request.use_llm, &request.question, &results)
        .await
        .into_text();

    let top_result = results[0].clone();
    let total_results = results.len();
    Ok(Json(QueryResponse {
        question: request.question,
        answer,
        search_results: results,
        top_result,
        processing_time: round_seconds(started.elapsed().as_secs_f64()),
        total_results,
        status: "success",
    }))
}

fn round_seconds(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchParams {
    pub question: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub score_threshold: f32,
}

async fn search(
    State(context): State<AppState>,
    params: std::result::Result<Query<SearchParams>, QueryRejection>,
) -> std::result::Result<Json<Vec<SearchResult>>, ApiError> {
    let Query(params) = params?;
    let results = context
        .retriever
        .retrieve(&params.question, params.limit, params.score_threshold)
        .await?;
    Ok(Json(results))
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfoResponse {
    pub collection_name: String,
    #[serde(flatten)]
    pub info: CollectionInfo,
    pub timestamp: String,
}

async fn collection_info(
    State(context): State<AppState>,
) -> std::result::Result<Json<CollectionInfoResponse>, ApiError> {
    let retriever = &context.retriever;
    let index = retriever.index().ok_or(Error::Unavailable("vector index"))?;
    let info = index.collection_info(retriever.collection()).await?;

    Ok(Json(CollectionInfoResponse {
        collection_name: retriever.collection().to_string(),
        info,
        timestamp: chrono::Local::now().to_rfc3339(),
    }))
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigResponse {
    pub qdrant_url: String,
    pub collection_name: String,
    pub embedding_model: String,
    pub generator_available: bool,
    pub generator_model: Option<String>,
}

async fn config(State(context): State<AppState>) -> Json<ConfigResponse> {
    let generator = context.retriever.generator();
    Json(ConfigResponse {
        qdrant_url: context.config.qdrant_url.clone(),
        collection_name: context.retriever.collection().to_string(),
        embedding_model: context.embedding_model().to_string(),
        generator_available: generator.is_some(),
        generator_model: generator.map(|g| g.model().to_string()),
    })
}
