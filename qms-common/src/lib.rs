//! # QMS Common Library
//!
//! Shared code for the inspection-station QMS services including:
//! - Error types
//! - Bootstrap configuration loading and root folder resolution
//! - Module registry (storage keys, labels, searchable fields)
//! - Record helpers (ids, timestamps, search)
//! - Record store backends (local blob, SQLite table, remote, fallback)

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod modules;
pub mod records;
pub mod store;
pub mod time;

pub use error::{Error, Result};
pub use records::Record;
pub use store::RecordStore;
