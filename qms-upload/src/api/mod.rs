//! HTTP API handlers for qms-upload

pub mod files;
pub mod health;
pub mod upload;

pub use files::file_routes;
pub use health::health_routes;
pub use upload::upload_routes;

use serde::Serialize;

/// Success envelope: `{success: true, data}`
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}
