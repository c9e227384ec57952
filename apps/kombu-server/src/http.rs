//! REST API surface.
//!
//! Resource layout:
//!
//! ```text
//! POST   /v1/libraries                 create (201)
//! GET    /v1/libraries                 list
//! GET    /v1/libraries/{id}            fetch
//! PATCH  /v1/libraries/{id}            update name/description/metadata
//! DELETE /v1/libraries/{id}            cascade-delete
//! POST   /v1/libraries/{id}/index      rebuild the index
//! POST   /v1/libraries/{id}/search     {query_text | query_vector, k, filter?}
//! POST   /v1/libraries/{id}/documents
//! GET    /v1/libraries/{id}/documents
//! GET    /v1/libraries/{id}/documents/{doc}
//! PATCH  /v1/libraries/{id}/documents/{doc}
//! DELETE /v1/libraries/{id}/documents/{doc}
//! POST   /v1/libraries/{id}/documents/{doc}/chunks
//! GET    /v1/libraries/{id}/documents/{doc}/chunks
//! GET    /v1/libraries/{id}/documents/{doc}/chunks/{chunk}
//! DELETE /v1/libraries/{id}/documents/{doc}/chunks/{chunk}
//! POST   /v1/admin/snapshot            write a snapshot to disk
//! GET    /health                       liveness
//! GET    /metrics                      Prometheus text format
//! ```
//!
//! Status mapping: 200/201 success, 404 missing entity or broken parent
//! link, 409 duplicate id, 422 dimension mismatch / invalid parameters,
//! 503 embedding provider failures, 500 internal errors.

use crate::metrics::ApiMetrics;
use axum::extract::{MatchedPath, Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use kombu_hnsw::HnswConfig;
use kombu_lsh::LshConfig;
use kombu_store::{
    Chunk, ChunkSpec, Document, DocumentUpdate, Error, Filter, IndexKind, IndexParams, Library,
    LibrarySpec, LibraryService, LibraryUpdate, Metadata, MetadataValue, SearchQuery,
    SearchResult, SnapshotFormat,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LibraryService>,
    pub metrics: Arc<ApiMetrics>,
    pub snapshot_path: PathBuf,
    pub snapshot_format: SnapshotFormat,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(export_metrics))
        .route("/v1/libraries", post(create_library).get(list_libraries))
        .route(
            "/v1/libraries/:library_id",
            get(get_library).patch(update_library).delete(delete_library),
        )
        .route("/v1/libraries/:library_id/index", post(rebuild_index))
        .route("/v1/libraries/:library_id/search", post(search))
        .route(
            "/v1/libraries/:library_id/documents",
            post(create_document).get(list_documents),
        )
        .route(
            "/v1/libraries/:library_id/documents/:document_id",
            get(get_document).patch(update_document).delete(delete_document),
        )
        .route(
            "/v1/libraries/:library_id/documents/:document_id/chunks",
            post(create_chunk).get(list_chunks),
        )
        .route(
            "/v1/libraries/:library_id/documents/:document_id/chunks/:chunk_id",
            get(get_chunk).delete(delete_chunk),
        )
        .route("/v1/admin/snapshot", post(write_snapshot))
        .layer(middleware::from_fn_with_state(state.clone(), track_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Count every served request by matched route and status.
async fn track_metrics(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;
    state.metrics.record_request(&route, response.status().as_u16());
    response
}

// ---- request/response bodies ----

#[derive(Debug, Deserialize)]
struct CreateLibraryBody {
    name: String,
    description: Option<String>,
    metadata: Option<JsonValue>,
    kind: IndexKind,
    dimension: usize,
    hnsw: Option<HnswConfig>,
    lsh: Option<LshConfig>,
}

#[derive(Debug, Deserialize)]
struct UpdateLibraryBody {
    name: Option<String>,
    description: Option<String>,
    metadata: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct CreateDocumentBody {
    name: String,
    metadata: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct UpdateDocumentBody {
    name: Option<String>,
    metadata: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct CreateChunkBody {
    content: String,
    metadata: Option<JsonValue>,
    embedding: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    query_text: Option<String>,
    query_vector: Option<Vec<f32>>,
    #[serde(default = "default_k")]
    k: usize,
    filter: Option<String>,
}

fn default_k() -> usize {
    10
}

#[derive(Debug, Serialize)]
struct LibraryResponse {
    id: Uuid,
    name: String,
    description: Option<String>,
    metadata: JsonValue,
    kind: IndexKind,
    dimension: usize,
    document_count: usize,
    created_at: u64,
    updated_at: u64,
}

impl From<Library> for LibraryResponse {
    fn from(library: Library) -> Self {
        Self {
            id: library.id,
            name: library.name,
            description: library.description,
            metadata: metadata_to_json(&library.metadata),
            kind: library.kind,
            dimension: library.dimension,
            document_count: library.document_ids.len(),
            created_at: library.created_at,
            updated_at: library.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct DocumentResponse {
    id: Uuid,
    library_id: Uuid,
    name: String,
    metadata: JsonValue,
    chunk_count: usize,
    created_at: u64,
    updated_at: u64,
}

impl From<Document> for DocumentResponse {
    fn from(document: Document) -> Self {
        Self {
            id: document.id,
            library_id: document.library_id,
            name: document.name,
            metadata: metadata_to_json(&document.metadata),
            chunk_count: document.chunk_ids.len(),
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChunkResponse {
    id: Uuid,
    document_id: Uuid,
    content: String,
    metadata: JsonValue,
    embedding: Vec<f32>,
    created_at: u64,
    updated_at: u64,
}

impl From<Chunk> for ChunkResponse {
    fn from(chunk: Chunk) -> Self {
        Self {
            id: chunk.id,
            document_id: chunk.document_id,
            content: chunk.content,
            metadata: metadata_to_json(&chunk.metadata),
            embedding: chunk.embedding,
            created_at: chunk.created_at,
            updated_at: chunk.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchResultResponse {
    chunk_id: Uuid,
    document_id: Uuid,
    content: String,
    metadata: JsonValue,
    score: f32,
}

impl From<SearchResult> for SearchResultResponse {
    fn from(result: SearchResult) -> Self {
        Self {
            chunk_id: result.chunk_id,
            document_id: result.document_id,
            content: result.content,
            metadata: metadata_to_json(&result.metadata),
            score: result.score,
        }
    }
}

// ---- handlers ----

async fn health() -> &'static str {
    "OK"
}

async fn export_metrics(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.export(),
    )
        .into_response()
}

async fn create_library(
    State(state): State<AppState>,
    Json(body): Json<CreateLibraryBody>,
) -> Result<(StatusCode, Json<LibraryResponse>), ApiError> {
    let metadata = json_to_metadata(body.metadata)?;
    let params = explicit_params(body.kind, body.hnsw, body.lsh)?;

    let spec = LibrarySpec {
        name: body.name,
        description: body.description,
        metadata,
        kind: body.kind,
        dimension: body.dimension,
        params,
    };

    let service = state.service.clone();
    let library = blocking(move || service.create_library(spec)).await?;
    Ok((StatusCode::CREATED, Json(library.into())))
}

async fn list_libraries(
    State(state): State<AppState>,
) -> Result<Json<Vec<LibraryResponse>>, ApiError> {
    let service = state.service.clone();
    let libraries = blocking(move || Ok(service.list_libraries())).await?;
    Ok(Json(libraries.into_iter().map(Into::into).collect()))
}

async fn get_library(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
) -> Result<Json<LibraryResponse>, ApiError> {
    let service = state.service.clone();
    let library = blocking(move || service.get_library(library_id)).await?;
    Ok(Json(library.into()))
}

async fn update_library(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
    Json(body): Json<UpdateLibraryBody>,
) -> Result<Json<LibraryResponse>, ApiError> {
    let update = LibraryUpdate {
        name: body.name,
        description: body.description,
        metadata: body.metadata.map(|m| json_to_metadata(Some(m))).transpose()?,
    };

    let service = state.service.clone();
    let library = blocking(move || service.update_library(library_id, update)).await?;
    Ok(Json(library.into()))
}

async fn delete_library(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
) -> Result<Json<JsonValue>, ApiError> {
    let service = state.service.clone();
    blocking(move || service.delete_library(library_id)).await?;
    Ok(Json(json!({ "deleted": library_id })))
}

async fn rebuild_index(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
) -> Result<Json<JsonValue>, ApiError> {
    let service = state.service.clone();
    blocking(move || service.rebuild_index(library_id)).await?;
    Ok(Json(json!({ "rebuilt": library_id })))
}

async fn search(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
    Json(body): Json<SearchBody>,
) -> Result<Json<Vec<SearchResultResponse>>, ApiError> {
    let filter = body
        .filter
        .map(|expr| Filter::parse(&expr))
        .transpose()
        .map_err(|e| ApiError(Error::InvalidParameter(e.to_string())))?;

    let query = SearchQuery {
        text: body.query_text,
        vector: body.query_vector,
        k: body.k,
        filter,
    };

    let service = state.service.clone();
    let start = Instant::now();
    let results = blocking(move || service.search(library_id, query)).await?;
    state.metrics.observe_search(start.elapsed().as_secs_f64());

    Ok(Json(results.into_iter().map(Into::into).collect()))
}

async fn create_document(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
    Json(body): Json<CreateDocumentBody>,
) -> Result<(StatusCode, Json<DocumentResponse>), ApiError> {
    let metadata = json_to_metadata(body.metadata)?;
    let service = state.service.clone();
    let document =
        blocking(move || service.create_document(library_id, body.name, metadata)).await?;
    Ok((StatusCode::CREATED, Json(document.into())))
}

async fn list_documents(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
) -> Result<Json<Vec<DocumentResponse>>, ApiError> {
    let service = state.service.clone();
    let documents = blocking(move || service.list_documents(library_id)).await?;
    Ok(Json(documents.into_iter().map(Into::into).collect()))
}

async fn get_document(
    State(state): State<AppState>,
    Path((library_id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let service = state.service.clone();
    let document = blocking(move || scoped_document(&service, library_id, document_id)).await?;
    Ok(Json(document.into()))
}

async fn update_document(
    State(state): State<AppState>,
    Path((library_id, document_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateDocumentBody>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let update = DocumentUpdate {
        name: body.name,
        metadata: body.metadata.map(|m| json_to_metadata(Some(m))).transpose()?,
    };

    let service = state.service.clone();
    let document = blocking(move || {
        scoped_document(&service, library_id, document_id)?;
        service.update_document(document_id, update)
    })
    .await?;
    Ok(Json(document.into()))
}

async fn delete_document(
    State(state): State<AppState>,
    Path((library_id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<JsonValue>, ApiError> {
    let service = state.service.clone();
    blocking(move || {
        scoped_document(&service, library_id, document_id)?;
        service.delete_document(document_id)
    })
    .await?;
    Ok(Json(json!({ "deleted": document_id })))
}

async fn create_chunk(
    State(state): State<AppState>,
    Path((library_id, document_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<CreateChunkBody>,
) -> Result<(StatusCode, Json<ChunkResponse>), ApiError> {
    let metadata = json_to_metadata(body.metadata)?;
    let spec = ChunkSpec {
        content: body.content,
        metadata,
        embedding: body.embedding,
    };

    let service = state.service.clone();
    let chunk = blocking(move || {
        scoped_document(&service, library_id, document_id)?;
        service.add_chunk(document_id, spec)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(chunk.into())))
}

async fn list_chunks(
    State(state): State<AppState>,
    Path((library_id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<ChunkResponse>>, ApiError> {
    let service = state.service.clone();
    let chunks = blocking(move || {
        scoped_document(&service, library_id, document_id)?;
        service.list_chunks(document_id)
    })
    .await?;
    Ok(Json(chunks.into_iter().map(Into::into).collect()))
}

async fn get_chunk(
    State(state): State<AppState>,
    Path((library_id, document_id, chunk_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Json<ChunkResponse>, ApiError> {
    let service = state.service.clone();
    let chunk = blocking(move || {
        scoped_document(&service, library_id, document_id)?;
        let chunk = service.get_chunk(chunk_id)?;
        if chunk.document_id != document_id {
            return Err(Error::not_found(kombu_store::Entity::Chunk, chunk_id));
        }
        Ok(chunk)
    })
    .await?;
    Ok(Json(chunk.into()))
}

async fn delete_chunk(
    State(state): State<AppState>,
    Path((library_id, document_id, chunk_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Json<JsonValue>, ApiError> {
    let service = state.service.clone();
    blocking(move || {
        scoped_document(&service, library_id, document_id)?;
        let chunk = service.get_chunk(chunk_id)?;
        if chunk.document_id != document_id {
            return Err(Error::not_found(kombu_store::Entity::Chunk, chunk_id));
        }
        service.delete_chunk(chunk_id)
    })
    .await?;
    Ok(Json(json!({ "deleted": chunk_id })))
}

async fn write_snapshot(State(state): State<AppState>) -> Result<Json<JsonValue>, ApiError> {
    let service = state.service.clone();
    let path = state.snapshot_path.clone();
    let format = state.snapshot_format;
    blocking(move || service.save_snapshot(&path, format)).await?;
    Ok(Json(json!({
        "path": state.snapshot_path.display().to_string(),
        "format": state.snapshot_format,
    })))
}

// ---- helpers ----

/// Resolve a document and verify it lives under the library in the path.
fn scoped_document(
    service: &LibraryService,
    library_id: Uuid,
    document_id: Uuid,
) -> Result<Document, Error> {
    let document = service.get_document(document_id)?;
    if document.library_id != library_id {
        return Err(Error::not_found(kombu_store::Entity::Document, document_id));
    }
    Ok(document)
}

/// Explicit per-kind parameters from the request body, if any.
fn explicit_params(
    kind: IndexKind,
    hnsw: Option<HnswConfig>,
    lsh: Option<LshConfig>,
) -> Result<Option<IndexParams>, ApiError> {
    match (kind, hnsw, lsh) {
        (_, Some(_), Some(_)) => Err(ApiError(Error::InvalidParameter(
            "supply at most one of hnsw/lsh parameter blocks".to_string(),
        ))),
        (IndexKind::Hnsw, Some(config), None) => Ok(Some(IndexParams::Hnsw(config))),
        (IndexKind::Lsh, None, Some(config)) => Ok(Some(IndexParams::Lsh(config))),
        (_, None, None) => Ok(None),
        (kind, _, _) => Err(ApiError(Error::InvalidParameter(format!(
            "parameter block does not match index kind {:?}",
            kind
        )))),
    }
}

/// Run a blocking store call on the blocking pool.
async fn blocking<T: Send + 'static>(
    f: impl FnOnce() -> Result<T, Error> + Send + 'static,
) -> Result<T, ApiError> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError(Error::Internal(format!("blocking task failed: {}", e))))?
        .map_err(ApiError)
}

/// Convert a JSON object with scalar values into store metadata.
fn json_to_metadata(value: Option<JsonValue>) -> Result<Metadata, ApiError> {
    let Some(value) = value else {
        return Ok(Metadata::new());
    };

    let JsonValue::Object(map) = value else {
        return Err(ApiError(Error::InvalidParameter(
            "metadata must be a JSON object".to_string(),
        )));
    };

    let mut metadata = Metadata::new();
    for (key, value) in map {
        let converted = match value {
            JsonValue::String(s) => MetadataValue::Str(s),
            JsonValue::Bool(b) => MetadataValue::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    MetadataValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    MetadataValue::Float(f)
                } else {
                    return Err(ApiError(Error::InvalidParameter(format!(
                        "metadata value for '{}' is out of range",
                        key
                    ))));
                }
            }
            other => {
                return Err(ApiError(Error::InvalidParameter(format!(
                    "metadata value for '{}' must be a scalar, got {}",
                    key, other
                ))))
            }
        };
        metadata.insert(key, converted);
    }
    Ok(metadata)
}

/// Convert store metadata back into a plain JSON object.
fn metadata_to_json(metadata: &Metadata) -> JsonValue {
    let map: serde_json::Map<String, JsonValue> = metadata
        .iter()
        .map(|(key, value)| {
            let json = match value {
                MetadataValue::Str(s) => JsonValue::String(s.clone()),
                MetadataValue::Int(i) => json!(i),
                MetadataValue::Float(f) => json!(f),
                MetadataValue::Bool(b) => JsonValue::Bool(*b),
            };
            (key.clone(), json)
        })
        .collect();
    JsonValue::Object(map)
}

// ---- error mapping ----

/// Wraps [`kombu_store::Error`] with the HTTP status mapping.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound { .. }
            | Error::ParentMissing { .. }
            | Error::SnapshotMissing { .. } => StatusCode::NOT_FOUND,
            Error::Duplicate { .. } => StatusCode::CONFLICT,
            Error::DimensionMismatch { .. } | Error::InvalidParameter(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Error::ProviderUnavailable(_) | Error::RateLimited(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Snapshot(_) | Error::Io(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
