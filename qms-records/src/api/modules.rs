//! Module catalog endpoint

use axum::{extract::State, routing::get, Json, Router};
use qms_common::modules::{self, ModuleInfo};
use serde::Serialize;

use crate::{ApiResult, AppState};

/// Registry entry with the module's current record count
#[derive(Debug, Serialize)]
pub struct ModuleSummary {
    #[serde(flatten)]
    pub info: &'static ModuleInfo,
    pub count: usize,
}

/// GET /api/modules
pub async fn list_modules(State(state): State<AppState>) -> ApiResult<Json<Vec<ModuleSummary>>> {
    let mut out = Vec::with_capacity(modules::all().len());
    for info in modules::all() {
        let count = state.store.get_data(info.key).await?.len();
        out.push(ModuleSummary { info, count });
    }
    Ok(Json(out))
}

pub fn module_routes() -> Router<AppState> {
    Router::new().route("/api/modules", get(list_modules))
}
