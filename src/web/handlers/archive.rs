//! Archive job handlers for Web API.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use std::sync::Arc;

use super::{content_disposition_header, file_body, run_blocking, AppState};
use crate::archive::JobId;
use crate::web::dto::{
    ApiResponse, ArchiveJobResponse, StartArchiveRequest, StartArchiveResponse, ValidatedJson,
};
use crate::web::error::ApiError;

/// POST /api/archives - Start archiving a directory.
///
/// Returns 202 with the job ID immediately; the build runs in the
/// background.
pub async fn start_archive(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<StartArchiveRequest>,
) -> Result<(StatusCode, Json<ApiResponse<StartArchiveResponse>>), ApiError> {
    let storage = state.storage.clone();
    let archives = Arc::clone(&state.archives);
    let job_id = run_blocking(move || {
        let source = storage.resolve(&req.path)?;
        archives.start_job(source)
    })
    .await?;

    let response = StartArchiveResponse {
        job_id,
        status_url: format!("/api/archives/{job_id}"),
    };

    Ok((StatusCode::ACCEPTED, Json(ApiResponse::new(response))))
}

/// GET /api/archives - List archive jobs.
pub async fn list_archives(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<ArchiveJobResponse>>> {
    let jobs = state.archives.list().into_iter().map(Into::into).collect();
    Json(ApiResponse::new(jobs))
}

/// GET /api/archives/:id - Poll a job.
pub async fn get_archive(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<JobId>,
) -> Result<Json<ApiResponse<ArchiveJobResponse>>, ApiError> {
    let job = state.archives.status(job_id)?;
    Ok(Json(ApiResponse::new(job.into())))
}

/// GET /api/archives/:id/download - Fetch a finished archive.
///
/// The job is consumed by this call. The archive file is removed once the
/// transfer ends, whether or not the client received all of it.
pub async fn download_archive(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<JobId>,
) -> Result<Response, ApiError> {
    let artifact = state.archives.retrieve(job_id)?;

    let file = tokio::fs::File::open(artifact.path()).await.map_err(|e| {
        tracing::error!(job_id = %job_id, "Failed to open archive: {}", e);
        ApiError::internal("Failed to open archive")
    })?;

    let disposition = content_disposition_header(artifact.display_name());
    let size = artifact.size();

    Response::builder()
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_LENGTH, size)
        .body(file_body(file, artifact))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })
}
