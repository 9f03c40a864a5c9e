//! HTTP request/response boundary.
//!
//! Exposes the engine to the UI layer as a JSON API. The handlers are thin:
//! decode, delegate to the engine modules, encode. All error responses use
//! the same body shape:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "corpus not found: …" } }
//! ```
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Relational + vector store reachability |
//! | `POST`   | `/corpora` | Create corpus |
//! | `GET`    | `/corpora` | List corpora |
//! | `GET`    | `/corpora/{id}` | Get corpus |
//! | `PATCH`  | `/corpora/{id}` | Update corpus |
//! | `DELETE` | `/corpora/{id}` | Delete corpus (cascade) |
//! | `POST`   | `/corpora/{id}/scan` | Discover files |
//! | `GET`    | `/corpora/{id}/files` | List files |
//! | `GET`    | `/corpora/{id}/cost_estimate` | Pre-ingestion cost projection |
//! | `POST`   | `/corpora/{id}/ingest` | Run the ingestion pipeline |
//! | `POST`   | `/corpora/{id}/conversations` | Start a conversation |
//! | `GET`    | `/corpora/{id}/conversations` | List conversations |
//! | `GET`    | `/conversations/{id}` | Get conversation with parts |
//! | `POST`   | `/conversations/{id}/parts` | Continue a conversation |
//! | `DELETE` | `/conversations/{id}` | Delete conversation |
//!
//! Partial ingestion failure is a 200 whose body enumerates per-file
//! outcomes; a conversation turn that found no context is a 201 with
//! `chunks_retrieved = 0`; only provider/store failures become errors.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::conversation::{
    self, ContinueConversation, ConversationResponse, ConversationSummary, StartConversation,
};
use crate::corpus::{self, CreateCorpus, UpdateCorpus};
use crate::cost;
use crate::engine::Engine;
use crate::error::Error;
use crate::ingest;
use crate::models::{format_ts_iso, Corpus, CorpusFile};

#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
}

/// Start the HTTP server. Runs until the process is terminated.
pub async fn run_server(config: &Config, engine: Arc<Engine>) -> anyhow::Result<()> {
    let state = AppState { engine };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/corpora", post(handle_create_corpus).get(handle_list_corpora))
        .route(
            "/corpora/{id}",
            get(handle_get_corpus)
                .patch(handle_update_corpus)
                .delete(handle_delete_corpus),
        )
        .route("/corpora/{id}/scan", post(handle_scan))
        .route("/corpora/{id}/files", get(handle_list_files))
        .route("/corpora/{id}/cost_estimate", get(handle_cost_estimate))
        .route("/corpora/{id}/ingest", post(handle_ingest))
        .route(
            "/corpora/{id}/conversations",
            post(handle_start_conversation).get(handle_list_conversations),
        )
        .route(
            "/conversations/{id}",
            get(handle_get_conversation).delete(handle_delete_conversation),
        )
        .route("/conversations/{id}/parts", post(handle_continue_conversation))
        .layer(cors)
        .with_state(state);

    let bind_addr = config.server.bind.clone();
    info!(bind = %bind_addr, "API server listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
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

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            Error::Busy(_) => (StatusCode::CONFLICT, "conflict"),
            Error::Provider { .. } => (StatusCode::BAD_GATEWAY, "provider_error"),
            Error::Store { .. } => (StatusCode::BAD_GATEWAY, "store_error"),
            Error::Database(_) | Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ Corpus DTOs ============

#[derive(Deserialize)]
struct CreateCorpusRequest {
    name: String,
    description: Option<String>,
    default_prompt: String,
    embedding_model: Option<String>,
    completion_model: Option<String>,
    similarity_threshold: Option<f64>,
    path: String,
    collection_name: Option<String>,
}

#[derive(Deserialize, Default)]
struct UpdateCorpusRequest {
    name: Option<String>,
    description: Option<String>,
    default_prompt: Option<String>,
    embedding_model: Option<String>,
    completion_model: Option<String>,
    similarity_threshold: Option<f64>,
    path: Option<String>,
}

#[derive(Serialize)]
struct CorpusResponse {
    id: String,
    name: String,
    description: Option<String>,
    default_prompt: String,
    embedding_model: String,
    completion_model: String,
    similarity_threshold: f64,
    path: String,
    collection_name: String,
    created_at: String,
    updated_at: String,
}

impl From<Corpus> for CorpusResponse {
    fn from(c: Corpus) -> Self {
        Self {
            id: c.id,
            name: c.name,
            description: c.description,
            default_prompt: c.default_prompt,
            embedding_model: c.embedding_model,
            completion_model: c.completion_model,
            similarity_threshold: c.similarity_threshold,
            path: c.path,
            collection_name: c.collection_name,
            created_at: format_ts_iso(c.created_at),
            updated_at: format_ts_iso(c.updated_at),
        }
    }
}

#[derive(Serialize)]
struct CorpusFileResponse {
    id: String,
    corpus_id: String,
    filename: String,
    is_ingested: bool,
    created_at: String,
    updated_at: String,
}

impl From<CorpusFile> for CorpusFileResponse {
    fn from(f: CorpusFile) -> Self {
        Self {
            id: f.id,
            corpus_id: f.corpus_id,
            filename: f.filename,
            is_ingested: f.is_ingested,
            created_at: format_ts_iso(f.created_at),
            updated_at: format_ts_iso(f.updated_at),
        }
    }
}

// ============ Health ============

#[derive(Serialize)]
struct HealthResponse {
    database: String,
    vector_store: String,
}

async fn handle_health(State(state): State<AppState>) -> Response {
    let database = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(state.engine.pool())
        .await
    {
        Ok(_) => "UP",
        Err(_) => "DOWN",
    };

    let vector_store = match state.engine.vectors().ping().await {
        Ok(_) => "UP",
        Err(_) => "DOWN",
    };

    let all_up = database == "UP" && vector_store == "UP";
    let status = if all_up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            database: database.to_string(),
            vector_store: vector_store.to_string(),
        }),
    )
        .into_response()
}

// ============ Corpus handlers ============

async fn handle_create_corpus(
    State(state): State<AppState>,
    Json(req): Json<CreateCorpusRequest>,
) -> Result<(StatusCode, Json<CorpusResponse>), AppError> {
    let corpus = corpus::create_corpus(
        state.engine.pool(),
        CreateCorpus {
            name: req.name,
            description: req.description,
            default_prompt: req.default_prompt,
            embedding_model: req.embedding_model,
            completion_model: req.completion_model,
            similarity_threshold: req.similarity_threshold,
            path: req.path,
            collection_name: req.collection_name,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(corpus.into())))
}

async fn handle_list_corpora(
    State(state): State<AppState>,
) -> Result<Json<Vec<CorpusResponse>>, AppError> {
    let corpora = corpus::list_corpora(state.engine.pool()).await?;
    Ok(Json(corpora.into_iter().map(Into::into).collect()))
}

async fn handle_get_corpus(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CorpusResponse>, AppError> {
    let corpus = corpus::get_corpus(state.engine.pool(), &id).await?;
    Ok(Json(corpus.into()))
}

async fn handle_update_corpus(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCorpusRequest>,
) -> Result<Json<CorpusResponse>, AppError> {
    let corpus = corpus::update_corpus(
        state.engine.pool(),
        &id,
        UpdateCorpus {
            name: req.name,
            description: req.description,
            default_prompt: req.default_prompt,
            embedding_model: req.embedding_model,
            completion_model: req.completion_model,
            similarity_threshold: req.similarity_threshold,
            path: req.path,
        },
    )
    .await?;
    Ok(Json(corpus.into()))
}

async fn handle_delete_corpus(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    corpus::delete_corpus(&state.engine, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_scan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CorpusFileResponse>>, AppError> {
    let added = corpus::scan_corpus_files(state.engine.pool(), &id).await?;
    Ok(Json(added.into_iter().map(Into::into).collect()))
}

async fn handle_list_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CorpusFileResponse>>, AppError> {
    let files = corpus::list_files(state.engine.pool(), &id).await?;
    Ok(Json(files.into_iter().map(Into::into).collect()))
}

#[derive(Deserialize, Default)]
struct CostEstimateParams {
    #[serde(default)]
    include_ingested: bool,
}

async fn handle_cost_estimate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<CostEstimateParams>,
) -> Result<Json<cost::CorpusCostSummary>, AppError> {
    let summary =
        cost::estimate_corpus_cost(state.engine.pool(), &id, params.include_ingested).await?;
    Ok(Json(summary))
}

async fn handle_ingest(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ingest::IngestReport>, AppError> {
    // Detached from the request future: a client disconnect must not abort
    // the pipeline mid-file.
    let engine = state.engine.clone();
    let report = tokio::spawn(async move { ingest::ingest_corpus(&engine, &id).await })
        .await
        .map_err(|e| AppError::from(Error::store(format!("ingestion task failed: {e}"), false)))??;
    Ok(Json(report))
}

// ============ Conversation handlers ============

#[derive(Deserialize)]
struct StartConversationRequest {
    query: String,
    title: Option<String>,
    limit: Option<u64>,
}

#[derive(Deserialize)]
struct ContinueConversationRequest {
    query: String,
    limit: Option<u64>,
}

async fn handle_start_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<StartConversationRequest>,
) -> Result<(StatusCode, Json<ConversationResponse>), AppError> {
    // Detached so an aborted request still commits or discards the turn
    // consistently.
    let engine = state.engine.clone();
    let response = tokio::spawn(async move {
        conversation::start_conversation(
            &engine,
            &id,
            StartConversation {
                query: req.query,
                title: req.title,
                limit: req.limit,
            },
        )
        .await
    })
    .await
    .map_err(|e| AppError::from(Error::store(format!("turn task failed: {e}"), false)))??;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn handle_continue_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ContinueConversationRequest>,
) -> Result<(StatusCode, Json<ConversationResponse>), AppError> {
    let engine = state.engine.clone();
    let response = tokio::spawn(async move {
        conversation::continue_conversation(
            &engine,
            &id,
            ContinueConversation {
                query: req.query,
                limit: req.limit,
            },
        )
        .await
    })
    .await
    .map_err(|e| AppError::from(Error::store(format!("turn task failed: {e}"), false)))??;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn handle_list_conversations(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ConversationSummary>>, AppError> {
    let summaries = conversation::list_conversations(state.engine.pool(), &id).await?;
    Ok(Json(summaries))
}

async fn handle_get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationResponse>, AppError> {
    let response = conversation::get_conversation(state.engine.pool(), &id).await?;
    Ok(Json(response))
}

async fn handle_delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    conversation::delete_conversation(&state.engine, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
