//! qms-upload library - file upload sidecar
//!
//! Accepts multipart uploads, stores them under sanitized timestamped
//! names in one directory, and serves, describes, lists and deletes them
//! by stored filename.

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod file_types;
pub mod sanitize;
pub mod upload_dir;

pub use error::{ApiError, ApiResult};
pub use upload_dir::{FileDescriptor, UploadDir};

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Where uploads are written and served from
    pub uploads: UploadDir,
    /// Largest accepted file, in bytes
    pub max_file_size: u64,
}

impl AppState {
    /// Create new application state
    pub fn new(uploads: UploadDir, max_file_size: u64) -> Self {
        Self {
            uploads,
            max_file_size,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit =
        usize::try_from(state.max_file_size.saturating_add(MULTIPART_OVERHEAD)).unwrap_or(usize::MAX);

    Router::new()
        .merge(api::upload_routes())
        .merge(api::file_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
