//! SQLite schema and connection setup for the table store

pub mod init;

pub use init::*;
