//! qms-records library - record store service
//!
//! Generic table CRUD over every registered module, plus the server side
//! of a module page: keyword/field search with pagination.

use axum::extract::DefaultBodyLimit;
use axum::Router;
use qms_common::store::SharedStore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod pagination;

pub use error::{ApiError, ApiResult};

/// Largest accepted JSON body (whole-store snapshots can be big)
pub const MAX_BODY_SIZE: usize = 32 * 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Backend serving every record operation
    pub store: SharedStore,
}

impl AppState {
    /// Create new application state
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::module_routes())
        .merge(api::record_routes())
        .merge(api::data_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
