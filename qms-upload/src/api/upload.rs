//! Multipart upload endpoint

use axum::{
    extract::{
        multipart::{Field, MultipartRejection},
        Multipart, State,
    },
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use percent_encoding::percent_decode_str;
use qms_common::time;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::DataResponse;
use crate::error::{ApiError, ApiResult};
use crate::file_types::{self, SNIFF_LEN};
use crate::sanitize;
use crate::upload_dir::{public_path, FileDescriptor};
use crate::AppState;

/// Percent-encoded original filename; wins over the multipart filename
pub const ORIGINAL_FILENAME_HEADER: &str = "x-original-filename";

/// Name of the multipart part carrying the file
pub const FILE_FIELD: &str = "file";

/// Decoded `X-Original-Filename`, if present and non-blank
fn header_filename(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(ORIGINAL_FILENAME_HEADER)?.to_str().ok()?;
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    let decoded = decoded.trim();
    (!decoded.is_empty()).then(|| decoded.to_string())
}

/// Stream a part to `temp`, enforcing the size cap
///
/// Returns the byte count and the leading bytes for sniffing.
async fn receive(field: &mut Field<'_>, temp: &Path, max_size: u64) -> ApiResult<(u64, Vec<u8>)> {
    let mut file = tokio::fs::File::create(temp).await?;
    let mut size: u64 = 0;
    let mut head = Vec::with_capacity(SNIFF_LEN);

    while let Some(chunk) = field.chunk().await? {
        size += chunk.len() as u64;
        if size > max_size {
            return Err(ApiError::PayloadTooLarge(format!(
                "File exceeds the maximum upload size of {} bytes",
                max_size
            )));
        }
        if head.len() < SNIFF_LEN {
            let take = (SNIFF_LEN - head.len()).min(chunk.len());
            head.extend_from_slice(&chunk[..take]);
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok((size, head))
}

async fn store_upload(
    state: &AppState,
    field: &mut Field<'_>,
    original: &str,
    temp: &Path,
) -> ApiResult<FileDescriptor> {
    let (size, head) = receive(field, temp, state.max_file_size).await?;
    if size == 0 && original.is_empty() {
        return Err(ApiError::BadRequest("No file uploaded".to_string()));
    }

    let (stem, ext) = sanitize::clean_filename(original);
    let sniffed = file_types::sniff(&head);
    let mime_type =
        file_types::check_upload(ext.as_deref(), sniffed.as_ref()).map_err(ApiError::UnsupportedType)?;
    let ext = ext.or_else(|| sniffed.map(|s| s.extension.to_string()));

    let stored = state.uploads.persist(temp, &stem, ext.as_deref()).await?;

    let name = if original.is_empty() {
        sanitize::original_name(&stored)
    } else {
        original.to_string()
    };

    Ok(FileDescriptor {
        path: public_path(&stored),
        id: stored,
        name,
        size,
        mime_type: mime_type.to_string(),
        upload_time: time::now_rfc3339(),
    })
}

/// POST /api/upload
///
/// Multipart body with a `file` part. The stored name is derived from
/// `X-Original-Filename` when sent, else from the part's filename.
pub async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<DataResponse<FileDescriptor>>> {
    let mut multipart = multipart.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let header_name = header_filename(&headers);

    // The `file` part, or the first part that carries a filename
    let mut field = loop {
        match multipart.next_field().await? {
            Some(field) if field.name() == Some(FILE_FIELD) || field.file_name().is_some() => {
                break field
            }
            Some(_) => continue,
            None => return Err(ApiError::BadRequest("No file uploaded".to_string())),
        }
    };

    let original = header_name
        .or_else(|| field.file_name().map(|n| n.trim().to_string()))
        .unwrap_or_default();

    let temp = state.uploads.temp_path();
    let outcome = store_upload(&state, &mut field, &original, &temp).await;
    if outcome.is_err() {
        // Partial data never stays behind
        if let Err(e) = tokio::fs::remove_file(&temp).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", temp.display(), e);
            }
        }
    }
    let descriptor = outcome?;

    info!(
        "Stored upload {} ({} bytes, {}) from {:?}",
        descriptor.id, descriptor.size, descriptor.mime_type, descriptor.name
    );
    Ok(Json(DataResponse::ok(descriptor)))
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/api/upload", post(upload_file))
}
