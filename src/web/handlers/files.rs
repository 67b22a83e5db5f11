//! File handlers for Web API.

use axum::{
    extract::{Multipart, Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use std::sync::Arc;

use super::{content_disposition_header, file_body, run_blocking, AppState};
use crate::storage::EntryInfo;
use crate::web::dto::{
    ApiResponse, DirectoryListing, MessageResponse, MkdirRequest, PathQuery, SearchQuery,
    SearchResponse, UsageResponse, ValidatedJson,
};
use crate::web::error::ApiError;

/// GET /api/files - List a directory.
pub async fn list_directory(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> Result<Json<ApiResponse<DirectoryListing>>, ApiError> {
    let storage = state.storage.clone();
    let path = query.path.clone();
    let entries = run_blocking(move || storage.list(&path)).await?;

    let dir = state.storage.resolve(&query.path)?;
    let response = DirectoryListing {
        path: state.storage.root().relative(&dir),
        count: entries.len(),
        entries,
    };

    Ok(Json(ApiResponse::new(response)))
}

/// POST /api/files/upload - Upload one or more files into a directory.
pub async fn upload_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<Vec<EntryInfo>>>), ApiError> {
    // Reject escaping targets before reading the body.
    state.storage.resolve(&query.path)?;

    let max_size = state.storage.max_upload_size();
    let mut saved = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Failed to read multipart field: {}", e);
        ApiError::bad_request("Invalid multipart data")
    })? {
        let Some(filename) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };

        let content = field.bytes().await.map_err(|e| {
            tracing::error!("Failed to read file content: {}", e);
            ApiError::bad_request("Failed to read file")
        })?;

        if content.len() as u64 > max_size {
            return Err(ApiError::payload_too_large(format!(
                "File too large (max {}MB)",
                max_size / 1024 / 1024
            )));
        }

        let storage = state.storage.clone();
        let dir = query.path.clone();
        let entry = run_blocking(move || storage.save(&dir, &filename, &content)).await?;
        tracing::info!(path = %entry.path, size = entry.size, "File uploaded");
        saved.push(entry);
    }

    if saved.is_empty() {
        return Err(ApiError::bad_request("No file provided"));
    }

    Ok((StatusCode::CREATED, Json(ApiResponse::new(saved))))
}

/// GET /api/files/download - Stream a single file.
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> Result<Response, ApiError> {
    let target = state.storage.open(&query.path)?;

    let file = tokio::fs::File::open(target.path.as_path())
        .await
        .map_err(|e| {
            tracing::error!("Failed to open file: {}", e);
            ApiError::internal("Failed to open file")
        })?;

    let content_type = mime_guess::from_path(&target.filename)
        .first_or_octet_stream()
        .to_string();

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(&target.filename),
        )
        .header(header::CONTENT_LENGTH, target.size)
        .body(file_body(file, ()))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })
}

/// DELETE /api/files - Delete a file or directory tree.
pub async fn delete_path(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let storage = state.storage.clone();
    let path = query.path.clone();
    run_blocking(move || storage.delete(&path)).await?;

    Ok(Json(ApiResponse::new(MessageResponse {
        message: format!("Deleted {}", query.path),
    })))
}

/// POST /api/files/mkdir - Create a directory.
pub async fn create_directory(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<MkdirRequest>,
) -> Result<(StatusCode, Json<ApiResponse<EntryInfo>>), ApiError> {
    let storage = state.storage.clone();
    let entry = run_blocking(move || storage.mkdir(&req.path, &req.name)).await?;
    tracing::info!(path = %entry.path, "Directory created");

    Ok((StatusCode::CREATED, Json(ApiResponse::new(entry))))
}

/// GET /api/files/usage - Storage usage totals.
pub async fn storage_usage(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<UsageResponse>>, ApiError> {
    let storage = state.storage.clone();
    let usage = run_blocking(move || storage.usage()).await?;

    Ok(Json(ApiResponse::new(usage.into())))
}

/// GET /api/files/search - Find entries by name.
pub async fn search_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<SearchResponse>>, ApiError> {
    let storage = state.storage.clone();
    let (path, q, limit) = (query.path, query.q.clone(), query.limit);
    let results = run_blocking(move || storage.search(&path, &q, limit)).await?;

    Ok(Json(ApiResponse::new(SearchResponse {
        query: query.q,
        results,
    })))
}
