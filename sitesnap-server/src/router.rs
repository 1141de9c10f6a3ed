use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;

use crate::routes;
use crate::state::AppState;

/// Uploads carry full-resolution photos; the axum default of 2 MB is far
/// too small.
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Build the application router. Shared between the production binary and
/// integration tests.
pub fn build_router(state: AppState) -> Router {
    let photos_dir = state.storage.root().to_path_buf();

    Router::new()
        // Also the connectivity probe target: clients HEAD this route.
        .route("/health", get(health))
        .route("/api/photos/upload", post(routes::upload::upload_photo))
        .route("/api/photos/meta", post(routes::meta::update_meta))
        .route("/api/jobs/{job_id}/photos", get(routes::read::job_photos))
        // Public photo URLs are served straight from the storage root.
        .nest_service("/photos", ServeDir::new(photos_dir))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}
