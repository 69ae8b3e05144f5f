//! Whole-array and whole-store endpoints
//!
//! These mirror `get_data`/`save_data` on a module and the full blob
//! snapshot, for clients that keep a local copy and write it back in one go.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::get,
    Json, Router,
};
use qms_common::records::{self, DataBlob, Record};
use serde_json::{json, Value};
use tracing::info;

use crate::{ApiError, ApiResult, AppState};

/// GET /api/data/:module
pub async fn get_module_data(
    State(state): State<AppState>,
    Path(module): Path<String>,
) -> ApiResult<Json<Vec<Record>>> {
    Ok(Json(state.store.get_data(&module).await?))
}

/// PUT /api/data/:module
///
/// Replaces the module's array. Last write wins.
pub async fn save_module_data(
    State(state): State<AppState>,
    Path(module): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    let incoming = records::records_from_value(body)?;
    let count = incoming.len();
    state.store.save_data(&module, incoming).await?;
    info!("Saved {} {} records", count, module);
    Ok(Json(json!({ "success": true, "count": count })))
}

/// GET /api/data
pub async fn get_all_data(State(state): State<AppState>) -> ApiResult<Json<DataBlob>> {
    Ok(Json(state.store.load_all().await?))
}

/// PUT /api/data
pub async fn save_all_data(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    let Value::Object(blob) = body else {
        return Err(ApiError::BadRequest(
            "Snapshot must be a JSON object keyed by module".to_string(),
        ));
    };
    let keys = blob.len();
    state.store.save_all(blob).await?;
    info!("Saved whole-store snapshot ({} keys)", keys);
    Ok(Json(json!({ "success": true })))
}

pub fn data_routes() -> Router<AppState> {
    Router::new()
        .route("/api/data", get(get_all_data).put(save_all_data))
        .route(
            "/api/data/:module",
            get(get_module_data).put(save_module_data),
        )
}
