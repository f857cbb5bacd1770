//! HTTP surface of the image browser.
//!
//! All routes live under [`ROUTE_PREFIX`]:
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /thumbnail?filepath=<abs>` | Cached preview, or the original file as fallback |
//! | `GET /files?directory=<path>` | One directory level (defaults to the root) |
//! | `POST /metadata` `{path, rating?, tags?}` | Set rating and/or tags |
//! | `DELETE /delete` `{path}` | Remove a file, its preview and its metadata |
//! | `GET /options` | Folder/file options for the loader node's selector |
//!
//! Handlers are thin: they validate input, then run the filesystem and image
//! work on the blocking pool and map the result to a response. Failures come
//! back as `{"error": "<message>"}` with 404 (not found), 400 (bad input) or
//! 500 (anything unexpected, also logged at error level).

use crate::cache::ThumbnailCache;
use crate::config::LoaderConfig;
use crate::metadata::{MetadataError, MetadataStore, coerce_rating, coerce_tags};
use crate::scan::{DirectoryIndexer, DirectoryItem, SelectableEntry, sort_for_display};
use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::File;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Path prefix every route is mounted under.
pub const ROUTE_PREFIX: &str = "/imageloader";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(message) = &self {
            error!(error = %message, "request failed");
        }
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<io::Error> for ApiError {
    fn from(e: io::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<MetadataError> for ApiError {
    fn from(e: MetadataError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("worker task failed: {}", e))
    }
}

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    cache: Arc<ThumbnailCache>,
    metadata: Arc<MetadataStore>,
    indexer: Arc<DirectoryIndexer>,
}

impl AppState {
    /// Wire up the cache, metadata store and indexer from one config.
    ///
    /// Fails only if the cache directory can't be created.
    pub fn new(config: &LoaderConfig) -> io::Result<Self> {
        let metadata = Arc::new(MetadataStore::new(config.metadata_file.clone()));
        Ok(Self {
            cache: Arc::new(ThumbnailCache::new(config)?),
            indexer: Arc::new(DirectoryIndexer::new(config, Arc::clone(&metadata))),
            metadata,
        })
    }
}

/// Build the router with every route nested under [`ROUTE_PREFIX`].
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/thumbnail", get(thumbnail))
        .route("/files", get(list_files))
        .route("/metadata", post(update_metadata))
        .route("/delete", delete(delete_image))
        .route("/options", get(options));

    Router::new().nest(ROUTE_PREFIX, api).with_state(state)
}

/// Bind to `config.server.bind` and serve until Ctrl-C.
pub async fn serve(config: LoaderConfig) -> io::Result<()> {
    let state = AppState::new(&config)?;
    let listener = TcpListener::bind(config.server.bind.as_str()).await?;
    info!(
        address = %listener.local_addr()?,
        root = %state.indexer.root().display(),
        "image browser listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Deserialize)]
struct ThumbnailQuery {
    filepath: Option<String>,
}

async fn thumbnail(
    State(state): State<AppState>,
    Query(query): Query<ThumbnailQuery>,
) -> Result<Response, ApiError> {
    let source = query
        .filepath
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| ApiError::NotFound("File not found".into()))?;

    let served = tokio::task::spawn_blocking(move || {
        if !source.is_file() {
            return None;
        }
        if !state.indexer.is_image(&source) {
            return Some(source);
        }
        let preview = state
            .cache
            .get_or_create(&source, state.cache.max_dimension());
        Some(preview.unwrap_or(source))
    })
    .await?
    .ok_or_else(|| ApiError::NotFound("File not found".into()))?;

    serve_file(&served).await
}

#[derive(Deserialize)]
struct FilesQuery {
    directory: Option<String>,
}

#[derive(Debug, Serialize)]
struct FilesResponse {
    items: Vec<DirectoryItem>,
    current_directory: String,
    parent_directory: Option<String>,
}

async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<FilesQuery>,
) -> Result<Json<FilesResponse>, ApiError> {
    let directory = query
        .directory
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| state.indexer.root().to_path_buf());

    let response = tokio::task::spawn_blocking(move || {
        if !directory.is_dir() {
            return Err(ApiError::BadRequest("Invalid directory".into()));
        }
        let mut items = state.indexer.scan(&directory, false);
        sort_for_display(&mut items);

        let at_root = std::path::absolute(&directory)
            .is_ok_and(|abs| abs == state.indexer.root());
        let parent_directory = if at_root {
            None
        } else {
            directory.parent().map(|p| p.to_string_lossy().into_owned())
        };

        Ok(FilesResponse {
            items,
            current_directory: directory.to_string_lossy().into_owned(),
            parent_directory,
        })
    })
    .await??;

    Ok(Json(response))
}

/// Body of `POST /metadata`. Rating and tags are coerced like hand-edited
/// store entries: `"4"` and `4.0` are ratings, scalar tags are stringified.
#[derive(Deserialize)]
struct MetadataRequest {
    path: Option<String>,
    rating: Option<serde_json::Value>,
    tags: Option<serde_json::Value>,
}

async fn update_metadata(
    State(state): State<AppState>,
    body: Result<Json<MetadataRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let path = request
        .path
        .filter(|p| !p.is_empty() && Path::new(p).exists())
        .ok_or_else(|| ApiError::BadRequest("Invalid path".into()))?;

    let rating = request
        .rating
        .map(|v| coerce_rating(&v).ok_or_else(|| ApiError::BadRequest("Invalid rating".into())))
        .transpose()?;
    let tags = request
        .tags
        .map(|v| coerce_tags(v).ok_or_else(|| ApiError::BadRequest("Invalid tags".into())))
        .transpose()?;

    tokio::task::spawn_blocking(move || state.metadata.update(&path, rating, tags)).await??;

    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Deserialize)]
struct DeleteRequest {
    path: Option<String>,
}

async fn delete_image(
    State(state): State<AppState>,
    body: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let path = request
        .path
        .filter(|p| !p.is_empty() && Path::new(p).exists())
        .ok_or_else(|| ApiError::NotFound("File not found".into()))?;

    tokio::task::spawn_blocking(move || -> Result<(), ApiError> {
        let source = Path::new(&path);
        // The artifact key includes the mtime, so it must go first
        if let Err(e) = state.cache.remove(source) {
            warn!(source = %source.display(), error = %e, "cannot remove thumbnail");
        }
        std::fs::remove_file(source)?;
        state.metadata.remove_entry(&path)?;
        info!(path = %source.display(), "image deleted");
        Ok(())
    })
    .await??;

    Ok(Json(json!({ "status": "ok" })))
}

async fn options(State(state): State<AppState>) -> Result<Json<Vec<SelectableEntry>>, ApiError> {
    let entries = tokio::task::spawn_blocking(move || {
        state
            .indexer
            .list_selectable_entries(state.indexer.root())
    })
    .await?;
    Ok(Json(entries))
}

/// Stream a file with a content type guessed from its extension.
async fn serve_file(path: &Path) -> Result<Response, ApiError> {
    let file = File::open(path).await.map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            ApiError::NotFound("File not found".into())
        } else {
            ApiError::from(e)
        }
    })?;
    let length = file.metadata().await?.len();
    let mime = mime_guess::from_path(path).first_or_octet_stream();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime.as_ref())
        .header(header::CONTENT_LENGTH, length)
        .body(Body::from_stream(tokio_util::io::ReaderStream::new(file)))
        .map_err(|e| ApiError::Internal(format!("cannot build response: {}", e)))
}
