//! Record store abstraction
//!
//! Every module page reads and writes its records through [`RecordStore`].
//! Backends are interchangeable:
//!
//! - [`LocalStore`]: one JSON blob holding every module array
//! - [`TableStore`]: generic table rows in SQLite
//! - [`RemoteStore`]: HTTP client for the record store service
//! - [`FallbackStore`]: remote first, local when the remote cannot be reached
//!
//! Concurrent edits are last-write-wins; there is no merge.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::modules;
use crate::records::{self, DataBlob, Record};
use crate::{Error, Result};

mod fallback;
mod local;
#[cfg(feature = "remote")]
mod remote;
#[cfg(feature = "sqlx")]
mod table;

pub use fallback::FallbackStore;
pub use local::LocalStore;
#[cfg(feature = "remote")]
pub use remote::RemoteStore;
#[cfg(feature = "sqlx")]
pub use table::TableStore;

/// Shared handle to any backend
pub type SharedStore = Arc<dyn RecordStore>;

/// Storage operations shared by every module page
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// All records of a module, in insertion order
    async fn get_data(&self, module: &str) -> Result<Vec<Record>>;

    /// Replace a module's whole array
    async fn save_data(&self, module: &str, records: Vec<Record>) -> Result<()>;

    /// Append a new record; returns it with id and `createdAt` assigned
    async fn add_item(&self, module: &str, record: Record) -> Result<Record>;

    /// Merge `patch` over the record with `id`; returns the updated record
    async fn update_item(&self, module: &str, id: &str, patch: Record) -> Result<Record>;

    /// Remove the record with `id`, leaving every other record in place
    async fn delete_item(&self, module: &str, id: &str) -> Result<()>;

    /// Whole-store snapshot
    async fn load_all(&self) -> Result<DataBlob>;

    /// Replace the whole store from a snapshot
    async fn save_all(&self, blob: DataBlob) -> Result<()>;

    /// Single record by id
    async fn get_item(&self, module: &str, id: &str) -> Result<Record> {
        self.get_data(module)
            .await?
            .into_iter()
            .find(|r| records::record_id(r) == Some(id))
            .ok_or_else(|| not_found(module, id))
    }
}

pub(crate) fn not_found(module: &str, id: &str) -> Error {
    Error::NotFound(format!("{} record {}", module, id))
}

/// Normalize an incoming module array and reject duplicate ids
pub(crate) fn prepare_array(records: Vec<Record>) -> Result<Vec<Record>> {
    let mut prepared: Vec<Record> = Vec::with_capacity(records.len());
    let mut seen = HashSet::new();
    for record in records {
        let mut record = records::normalize(record);
        let id = match records::record_id(&record) {
            Some(id) => id.to_string(),
            None => {
                let id = records::generate_record_id(&prepared);
                record.insert(records::ID_FIELD.to_string(), id.clone().into());
                id
            }
        };
        if !seen.insert(id.clone()) {
            return Err(Error::InvalidInput(format!("Duplicate record id: {}", id)));
        }
        prepared.push(record);
    }
    Ok(prepared)
}

/// Split a snapshot into validated module arrays and keys no module owns.
///
/// Unknown keys are carried through untouched so a save never drops data
/// written by a newer client.
pub(crate) fn split_blob(blob: DataBlob) -> Result<(Vec<(String, Vec<Record>)>, DataBlob)> {
    let mut known = Vec::new();
    let mut extras = DataBlob::new();
    for (key, value) in blob {
        if modules::find(&key).is_some() {
            let records = prepare_array(records::records_from_value(value)?)?;
            known.push((key, records));
        } else {
            extras.insert(key, value);
        }
    }
    Ok((known, extras))
}

// In-memory array operations shared by array-backed stores

pub(crate) fn add_to(records: &mut Vec<Record>, record: Record) -> Result<Record> {
    let record = records::prepare_new(records, record)?;
    records.push(record.clone());
    Ok(record)
}

pub(crate) fn update_in(
    module: &str,
    records: &mut [Record],
    id: &str,
    patch: Record,
) -> Result<Record> {
    let existing = records
        .iter_mut()
        .find(|r| records::record_id(r) == Some(id))
        .ok_or_else(|| not_found(module, id))?;
    records::apply_update(existing, patch);
    Ok(existing.clone())
}

pub(crate) fn delete_from(module: &str, records: &mut Vec<Record>, id: &str) -> Result<()> {
    let index = records
        .iter()
        .position(|r| records::record_id(r) == Some(id))
        .ok_or_else(|| not_found(module, id))?;
    records.remove(index);
    Ok(())
}
