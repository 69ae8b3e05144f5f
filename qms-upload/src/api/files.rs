//! Stored file endpoints: serve, metadata, delete, list

use axum::{
    body::Body,
    extract::{Path, Request, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use super::DataResponse;
use crate::error::ApiResult;
use crate::upload_dir::FileDescriptor;
use crate::AppState;

/// Delete confirmation
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// GET /uploads/:filename
///
/// Raw bytes with a content type from the extension. Range and
/// conditional requests are handled by `ServeFile`.
pub async fn serve_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    let path = state.uploads.existing(&filename).await?;
    let response = match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    Ok(response.map(Body::new).into_response())
}

/// GET /api/files/:filename
pub async fn get_file_info(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Json<DataResponse<FileDescriptor>>> {
    let descriptor = state.uploads.describe(&filename).await?;
    Ok(Json(DataResponse::ok(descriptor)))
}

/// DELETE /api/files/:filename
pub async fn delete_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    state.uploads.delete(&filename).await?;
    Ok(Json(DeleteResponse {
        success: true,
        message: format!("File deleted: {}", filename),
    }))
}

/// GET /api/files
///
/// Every stored file, newest first.
pub async fn list_files(
    State(state): State<AppState>,
) -> ApiResult<Json<DataResponse<Vec<FileDescriptor>>>> {
    Ok(Json(DataResponse::ok(state.uploads.list().await?)))
}

/// Build stored file routes
pub fn file_routes() -> Router<AppState> {
    Router::new()
        .route("/uploads/:filename", get(serve_file))
        .route("/api/files", get(list_files))
        .route("/api/files/:filename", get(get_file_info).delete(delete_file))
}
