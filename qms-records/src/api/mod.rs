//! HTTP API handlers for qms-records

pub mod data;
pub mod health;
pub mod modules;
pub mod records;

pub use data::data_routes;
pub use health::health_routes;
pub use modules::module_routes;
pub use records::record_routes;
