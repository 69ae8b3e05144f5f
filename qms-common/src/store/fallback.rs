//! Remote-first store with local fallback
//!
//! Each operation goes to the primary store first. If the primary cannot
//! be reached (or fails internally) the operation is logged and served by
//! the fallback store instead. Definite answers from the primary (not
//! found, invalid input, conflict) are returned as-is. There is no retry
//! and no reconciliation between the two stores.

use async_trait::async_trait;
use tracing::warn;

use super::{RecordStore, SharedStore};
use crate::records::{DataBlob, Record};
use crate::{Error, Result};

pub struct FallbackStore {
    primary: SharedStore,
    fallback: SharedStore,
}

impl FallbackStore {
    pub fn new(primary: SharedStore, fallback: SharedStore) -> Self {
        Self { primary, fallback }
    }

    /// Decide whether a primary result should be retried against the fallback
    fn falls_back<T>(&self, op: &str, module: &str, result: Result<T>) -> Option<Result<T>> {
        match result {
            Ok(value) => Some(Ok(value)),
            Err(e) if e.is_answer() => Some(Err(e)),
            Err(e) => {
                warn!(
                    "{} store failed during {} on {} ({}), using {} store",
                    self.primary.name(),
                    op,
                    module,
                    e,
                    self.fallback.name()
                );
                None
            }
        }
    }
}

#[async_trait]
impl RecordStore for FallbackStore {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn get_data(&self, module: &str) -> Result<Vec<Record>> {
        let result = self.primary.get_data(module).await;
        match self.falls_back("get_data", module, result) {
            Some(done) => done,
            None => self.fallback.get_data(module).await,
        }
    }

    async fn get_item(&self, module: &str, id: &str) -> Result<Record> {
        let result = self.primary.get_item(module, id).await;
        match self.falls_back("get_item", module, result) {
            Some(done) => done,
            None => self.fallback.get_item(module, id).await,
        }
    }

    async fn save_data(&self, module: &str, records: Vec<Record>) -> Result<()> {
        let result = self.primary.save_data(module, records.clone()).await;
        match self.falls_back("save_data", module, result) {
            Some(done) => done,
            None => self.fallback.save_data(module, records).await,
        }
    }

    async fn add_item(&self, module: &str, record: Record) -> Result<Record> {
        let result = self.primary.add_item(module, record.clone()).await;
        match self.falls_back("add_item", module, result) {
            Some(done) => done,
            None => self.fallback.add_item(module, record).await,
        }
    }

    async fn update_item(&self, module: &str, id: &str, patch: Record) -> Result<Record> {
        let result = self.primary.update_item(module, id, patch.clone()).await;
        match self.falls_back("update_item", module, result) {
            Some(done) => done,
            None => self.fallback.update_item(module, id, patch).await,
        }
    }

    async fn delete_item(&self, module: &str, id: &str) -> Result<()> {
        let result = self.primary.delete_item(module, id).await;
        match self.falls_back("delete_item", module, result) {
            Some(done) => done,
            None => self.fallback.delete_item(module, id).await,
        }
    }

    async fn load_all(&self) -> Result<DataBlob> {
        let result = self.primary.load_all().await;
        match self.falls_back("load_all", "*", result) {
            Some(done) => done,
            None => self.fallback.load_all().await,
        }
    }

    async fn save_all(&self, blob: DataBlob) -> Result<()> {
        let result = self.primary.save_all(blob.clone()).await;
        match self.falls_back("save_all", "*", result) {
            Some(done) => done,
            None => self.fallback.save_all(blob).await,
        }
    }
}
