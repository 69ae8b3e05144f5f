//! Local blob store
//!
//! All module arrays live in one JSON object on disk, keyed by module
//! storage key. Every mutation is a read-modify-write of the whole blob
//! under a process-wide lock, written through a temp file and renamed
//! into place.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{add_to, delete_from, prepare_array, split_blob, update_in, RecordStore};
use crate::modules;
use crate::records::{self, DataBlob, Record};
use crate::{time, Result};

pub struct LocalStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the blob. Missing file reads as empty; an unreadable blob is
    /// moved aside and also reads as empty.
    async fn read_blob(&self) -> Result<DataBlob> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(DataBlob::new()),
            Err(e) => return Err(e.into()),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(DataBlob::new());
        }

        match serde_json::from_slice::<DataBlob>(&bytes) {
            Ok(blob) => Ok(blob),
            Err(e) => {
                let aside = self
                    .path
                    .with_extension(format!("corrupt-{}.json", time::epoch_millis()));
                warn!(
                    "Record blob {} is unreadable ({}), moving it to {} and starting empty",
                    self.path.display(),
                    e,
                    aside.display()
                );
                tokio::fs::rename(&self.path, &aside).await?;
                Ok(DataBlob::new())
            }
        }
    }

    async fn write_blob(&self, blob: &DataBlob) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self
            .path
            .with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        let bytes = serde_json::to_vec(blob)?;
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                warn!("Failed to remove temp blob {}: {}", tmp.display(), cleanup);
            }
            return Err(e.into());
        }
        debug!("Wrote record blob ({} bytes)", bytes.len());
        Ok(())
    }

    /// Records stored under `module`, and whether normalizing them changed
    /// the stored array (an element without an id gets one). A value that is
    /// not a record array is logged and treated as empty.
    fn module_records(blob: &DataBlob, module: &str) -> (Vec<Record>, bool) {
        let Some(value) = blob.get(module) else {
            return (Vec::new(), false);
        };
        match records::records_from_value(value.clone()) {
            Ok(records) => {
                let changed = value.as_array().map_or(true, |raw| {
                    raw.len() != records.len()
                        || raw.iter().zip(&records).any(|(v, r)| v.as_object() != Some(r))
                });
                (records, changed)
            }
            Err(e) => {
                warn!("Ignoring malformed {} array in record blob: {}", module, e);
                (Vec::new(), false)
            }
        }
    }

    /// Apply `f` to one module's array and persist the result
    async fn modify<T>(
        &self,
        module: &str,
        f: impl FnOnce(&mut Vec<Record>) -> Result<T> + Send,
    ) -> Result<T> {
        modules::require(module)?;
        let _guard = self.lock.lock().await;
        let mut blob = self.read_blob().await?;
        let (mut module_records, _) = Self::module_records(&blob, module);
        let out = f(&mut module_records)?;
        blob.insert(module.to_string(), records::records_to_value(module_records));
        self.write_blob(&blob).await?;
        Ok(out)
    }
}

#[async_trait]
impl RecordStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get_data(&self, module: &str) -> Result<Vec<Record>> {
        modules::require(module)?;
        let _guard = self.lock.lock().await;
        let mut blob = self.read_blob().await?;
        let (records, changed) = Self::module_records(&blob, module);
        // Generated ids must survive to the next read, or the caller could
        // never address those records
        if changed {
            blob.insert(module.to_string(), records::records_to_value(records.clone()));
            self.write_blob(&blob).await?;
            debug!("Persisted normalized {} array", module);
        }
        Ok(records)
    }

    async fn save_data(&self, module: &str, records: Vec<Record>) -> Result<()> {
        let records = prepare_array(records)?;
        self.modify(module, move |current| {
            *current = records;
            Ok(())
        })
        .await
    }

    async fn add_item(&self, module: &str, record: Record) -> Result<Record> {
        self.modify(module, move |current| add_to(current, record)).await
    }

    async fn update_item(&self, module: &str, id: &str, patch: Record) -> Result<Record> {
        self.modify(module, move |current| update_in(module, current, id, patch))
            .await
    }

    async fn delete_item(&self, module: &str, id: &str) -> Result<()> {
        self.modify(module, move |current| delete_from(module, current, id))
            .await
    }

    async fn load_all(&self) -> Result<DataBlob> {
        let _guard = self.lock.lock().await;
        self.read_blob().await
    }

    async fn save_all(&self, blob: DataBlob) -> Result<()> {
        let (known, extras) = split_blob(blob)?;
        let mut out = extras;
        for (key, records) in known {
            out.insert(key, records::records_to_value(records));
        }
        let _guard = self.lock.lock().await;
        self.write_blob(&out).await
    }
}
