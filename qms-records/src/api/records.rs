//! Record CRUD and search
//!
//! `GET /api/records/:module` is the server side of a module page: the
//! search form's keyword and field filters applied to the module's
//! records, then one page of the result.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use qms_common::modules;
use qms_common::records::{self, Record, RecordQuery};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::info;

use crate::pagination::{calculate_pagination, DEFAULT_PAGE_SIZE};
use crate::{ApiError, ApiResult, AppState};

/// Query parameters with a fixed meaning; everything else is a field filter
const RESERVED_PARAMS: &[&str] = &["page", "page_size", "keyword", "sort", "order"];

/// One page of a module table
#[derive(Debug, Serialize)]
pub struct RecordPage {
    pub module: String,
    pub label: String,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub records: Vec<Record>,
}

/// Query parameters for the mention count
#[derive(Debug, Deserialize)]
pub struct MentionsQuery {
    pub name: String,
}

/// Mention count response
#[derive(Debug, Serialize)]
pub struct MentionsResponse {
    pub module: String,
    pub name: String,
    pub count: usize,
}

fn parse_int(params: &HashMap<String, String>, key: &str, default: i64) -> ApiResult<i64> {
    match params.get(key).map(|s| s.trim()).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| ApiError::BadRequest(format!("Invalid {}: {}", key, raw))),
    }
}

/// Build the search query from raw query parameters
fn record_query(params: &HashMap<String, String>) -> ApiResult<RecordQuery> {
    let descending = match params.get("order").map(|s| s.to_lowercase()) {
        None => true,
        Some(order) if order == "desc" => true,
        Some(order) if order == "asc" => false,
        Some(other) => {
            return Err(ApiError::BadRequest(format!(
                "Invalid order: {} (expected asc or desc)",
                other
            )))
        }
    };

    let mut filters: Vec<(String, String)> = params
        .iter()
        .filter(|(k, _)| !RESERVED_PARAMS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    filters.sort();

    Ok(RecordQuery {
        keyword: params.get("keyword").cloned(),
        filters,
        sort: params.get("sort").cloned().filter(|s| !s.is_empty()),
        descending,
    })
}

/// GET /api/records/:module
///
/// Query: `page`, `page_size`, `keyword`, `sort`, `order`, plus any field
/// name as a case-insensitive substring filter.
pub async fn list_records(
    State(state): State<AppState>,
    Path(module): Path<String>,
    params: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> ApiResult<Json<RecordPage>> {
    let Query(params) = params?;
    let info = modules::require(&module)?;
    let query = record_query(&params)?;
    let requested_page = parse_int(&params, "page", 1)?;
    let page_size = parse_int(&params, "page_size", DEFAULT_PAGE_SIZE)?;

    let matched = query.apply(state.store.get_data(&module).await?);
    let total = matched.len() as i64;
    let pagination = calculate_pagination(total, requested_page, page_size);

    Ok(Json(RecordPage {
        module,
        label: info.label.to_string(),
        total,
        page: pagination.page,
        page_size: pagination.page_size,
        total_pages: pagination.total_pages,
        records: pagination.slice(matched),
    }))
}

fn into_record(body: Value) -> ApiResult<Record> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::BadRequest(
            "Request body must be a JSON object".to_string(),
        )),
    }
}

/// POST /api/records/:module
pub async fn create_record(
    State(state): State<AppState>,
    Path(module): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Record>)> {
    let Json(body) = body?;
    let record = state.store.add_item(&module, into_record(body)?).await?;
    info!(
        "Created {} record {}",
        module,
        records::record_id(&record).unwrap_or("?")
    );
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/records/:module/:id
pub async fn get_record(
    State(state): State<AppState>,
    Path((module, id)): Path<(String, String)>,
) -> ApiResult<Json<Record>> {
    Ok(Json(state.store.get_item(&module, &id).await?))
}

/// PUT /api/records/:module/:id
pub async fn update_record(
    State(state): State<AppState>,
    Path((module, id)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Record>> {
    let Json(body) = body?;
    let record = state
        .store
        .update_item(&module, &id, into_record(body)?)
        .await?;
    info!("Updated {} record {}", module, id);
    Ok(Json(record))
}

/// DELETE /api/records/:module/:id
pub async fn delete_record(
    State(state): State<AppState>,
    Path((module, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    state.store.delete_item(&module, &id).await?;
    info!("Deleted {} record {}", module, id);
    Ok(Json(json!({ "success": true, "id": id })))
}

/// GET /api/mentions/:module?name=..
///
/// Counts records in `module` mentioning `name` anywhere, e.g. how many
/// training records list a given person.
pub async fn count_mentions(
    State(state): State<AppState>,
    Path(module): Path<String>,
    query: Result<Query<MentionsQuery>, QueryRejection>,
) -> ApiResult<Json<MentionsResponse>> {
    let Query(query) = query?;
    let records = state.store.get_data(&module).await?;
    let count = records::count_mentions(&records, &query.name);
    Ok(Json(MentionsResponse {
        module,
        name: query.name,
        count,
    }))
}

pub fn record_routes() -> Router<AppState> {
    Router::new()
        .route("/api/records/:module", get(list_records).post(create_record))
        .route(
            "/api/records/:module/:id",
            get(get_record).put(update_record).delete(delete_record),
        )
        .route("/api/mentions/:module", get(count_mentions))
}
