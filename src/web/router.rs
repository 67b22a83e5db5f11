//! Router configuration for Web API.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use super::handlers::{
    create_directory, delete_path, download_archive, download_file, get_archive, list_archives,
    list_directory, search_files, start_archive, storage_usage, upload_files, AppState,
};
use super::middleware::{create_cors_layer, security_headers};

/// Room for multipart framing on top of the file content limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create the main API router.
pub fn create_router(app_state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let body_limit = usize::try_from(app_state.storage.max_upload_size())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let file_routes = Router::new()
        .route("/", get(list_directory).delete(delete_path))
        .route(
            "/upload",
            post(upload_files).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/download", get(download_file))
        .route("/mkdir", post(create_directory))
        .route("/usage", get(storage_usage))
        .route("/search", get(search_files));

    let archive_routes = Router::new()
        .route("/", get(list_archives).post(start_archive))
        .route("/:id", get(get_archive))
        .route("/:id/download", get(download_archive));

    let api_routes = Router::new()
        .nest("/files", file_routes)
        .nest("/archives", archive_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins))
                .layer(middleware::from_fn(security_headers)),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}

/// Create a router serving a built frontend.
///
/// Unknown paths fall back to `index.html`. Returns `None` when the
/// directory doesn't exist.
pub fn create_static_router(static_path: &str) -> Option<Router> {
    let dir = Path::new(static_path);
    if !dir.is_dir() {
        tracing::warn!("Static directory not found: {}", static_path);
        return None;
    }

    let index = dir.join("index.html");
    let serve_dir = ServeDir::new(dir).not_found_service(ServeFile::new(index));
    Some(Router::new().fallback_service(serve_dir))
}
