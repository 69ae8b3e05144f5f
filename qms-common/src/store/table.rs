//! SQLite table store
//!
//! Generic table CRUD: every record is a row keyed by `(module, id)` with
//! its JSON payload in `data`. Module arrays are read back in `seq` order,
//! which is the order records were added (or the order of the last save).
//!
//! Writes are serialized through `write_lock`. Every write reads before it
//! writes (next `seq`, id uniqueness), and two deferred SQLite transactions
//! doing that concurrently would both hold read locks and fail to upgrade.

use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tokio::sync::Mutex;
use tracing::debug;

use super::{not_found, prepare_array, split_blob, RecordStore};
use crate::modules;
use crate::records::{self, DataBlob, Record};
use crate::{Error, Result};

pub struct TableStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl TableStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn decode(data: &str) -> Result<Record> {
        let record: Record = serde_json::from_str(data)?;
        Ok(record)
    }

    async fn module_records(
        tx: &mut Transaction<'_, Sqlite>,
        module: &str,
    ) -> Result<Vec<Record>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT data FROM records WHERE module = ? ORDER BY seq ASC")
                .bind(module)
                .fetch_all(&mut **tx)
                .await?;
        rows.iter().map(|(data,)| Self::decode(data)).collect()
    }

    async fn replace_module(
        tx: &mut Transaction<'_, Sqlite>,
        module: &str,
        records: &[Record],
    ) -> Result<()> {
        sqlx::query("DELETE FROM records WHERE module = ?")
            .bind(module)
            .execute(&mut **tx)
            .await?;

        for (seq, record) in records.iter().enumerate() {
            let id = records::record_id(record)
                .ok_or_else(|| Error::Internal("prepared record without id".to_string()))?;
            sqlx::query("INSERT INTO records (module, id, seq, data) VALUES (?, ?, ?, ?)")
                .bind(module)
                .bind(id)
                .bind(seq as i64 + 1)
                .bind(serde_json::to_string(record)?)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for TableStore {
    fn name(&self) -> &'static str {
        "table"
    }

    async fn get_data(&self, module: &str) -> Result<Vec<Record>> {
        modules::require(module)?;
        let mut tx = self.pool.begin().await?;
        let records = Self::module_records(&mut tx, module).await?;
        tx.commit().await?;
        Ok(records)
    }

    async fn get_item(&self, module: &str, id: &str) -> Result<Record> {
        modules::require(module)?;
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM records WHERE module = ? AND id = ?")
                .bind(module)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some((data,)) => Self::decode(&data),
            None => Err(not_found(module, id)),
        }
    }

    async fn save_data(&self, module: &str, records: Vec<Record>) -> Result<()> {
        modules::require(module)?;
        let records = prepare_array(records)?;
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        Self::replace_module(&mut tx, module, &records).await?;
        tx.commit().await?;
        debug!("Saved {} {} records", records.len(), module);
        Ok(())
    }

    async fn add_item(&self, module: &str, record: Record) -> Result<Record> {
        modules::require(module)?;
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let existing = Self::module_records(&mut tx, module).await?;
        let record = records::prepare_new(&existing, record)?;
        let id = records::record_id(&record)
            .ok_or_else(|| Error::Internal("prepared record without id".to_string()))?;

        let next_seq: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) + 1 FROM records WHERE module = ?")
                .bind(module)
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query("INSERT INTO records (module, id, seq, data) VALUES (?, ?, ?, ?)")
            .bind(module)
            .bind(id)
            .bind(next_seq)
            .bind(serde_json::to_string(&record)?)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn update_item(&self, module: &str, id: &str, patch: Record) -> Result<Record> {
        modules::require(module)?;
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM records WHERE module = ? AND id = ?")
                .bind(module)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let mut record = match row {
            Some((data,)) => Self::decode(&data)?,
            None => return Err(not_found(module, id)),
        };
        records::apply_update(&mut record, patch);

        sqlx::query(
            "UPDATE records SET data = ?, updated_at = CURRENT_TIMESTAMP WHERE module = ? AND id = ?",
        )
        .bind(serde_json::to_string(&record)?)
        .bind(module)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn delete_item(&self, module: &str, id: &str) -> Result<()> {
        modules::require(module)?;
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM records WHERE module = ? AND id = ?")
            .bind(module)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found(module, id));
        }
        Ok(())
    }

    async fn load_all(&self) -> Result<DataBlob> {
        let mut blob = DataBlob::new();

        let extras: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM blob_extras")
            .fetch_all(&self.pool)
            .await?;
        for (key, value) in extras {
            blob.insert(key, serde_json::from_str(&value)?);
        }

        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT module, data FROM records ORDER BY module ASC, seq ASC")
                .fetch_all(&self.pool)
                .await?;
        let mut grouped: std::collections::BTreeMap<String, Vec<Record>> = Default::default();
        for (module, data) in rows {
            grouped.entry(module).or_default().push(Self::decode(&data)?);
        }
        for (module, records) in grouped {
            blob.insert(module, records::records_to_value(records));
        }
        Ok(blob)
    }

    async fn save_all(&self, blob: DataBlob) -> Result<()> {
        let (known, extras) = split_blob(blob)?;
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM records").execute(&mut *tx).await?;
        for (module, records) in &known {
            Self::replace_module(&mut tx, module, records).await?;
        }

        sqlx::query("DELETE FROM blob_extras").execute(&mut *tx).await?;
        for (key, value) in &extras {
            sqlx::query("INSERT INTO blob_extras (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(serde_json::to_string(value)?)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn rec(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    async fn store() -> (TempDir, TableStore) {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("qms.db")).await.unwrap();
        (dir, TableStore::new(pool))
    }

    #[tokio::test]
    async fn test_add_update_delete_keeps_order() {
        let (_dir, store) = store().await;
        for name in ["A", "B", "C"] {
            store
                .add_item("trainingRecords", rec(json!({"title": name})))
                .await
                .unwrap();
        }

        let all = store.get_data("trainingRecords").await.unwrap();
        let titles: Vec<_> = all.iter().map(|r| r["title"].clone()).collect();
        assert_eq!(titles, vec![json!("A"), json!("B"), json!("C")]);

        let b_id = records::record_id(&all[1]).unwrap().to_string();
        let updated = store
            .update_item("trainingRecords", &b_id, rec(json!({"trainer": "Li"})))
            .await
            .unwrap();
        assert_eq!(updated["title"], "B");
        assert_eq!(updated["trainer"], "Li");

        let a_id = records::record_id(&all[0]).unwrap().to_string();
        store.delete_item("trainingRecords", &a_id).await.unwrap();

        let rest = store.get_data("trainingRecords").await.unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0]["trainer"], "Li");
        assert_eq!(rest[1], all[2]);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (_dir, store) = store().await;
        let res = store.delete_item("complaints", "nope").await;
        assert!(matches!(res, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_id_conflicts() {
        let (_dir, store) = store().await;
        store
            .add_item("complaints", rec(json!({"id": "5"})))
            .await
            .unwrap();
        let res = store.add_item("complaints", rec(json!({"id": "5"}))).await;
        assert!(matches!(res, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_blob_round_trip_with_extras() {
        let (_dir, store) = store().await;
        let blob = rec(json!({
            "complaints": [{"id": "1", "complainant": "A"}, {"id": "2", "complainant": "B"}],
            "deviceLedger": [{"id": "9", "deviceName": "Lift"}],
            "lastBackup": "2024-01-01"
        }));
        store.save_all(blob).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded["lastBackup"], "2024-01-01");
        assert_eq!(loaded["complaints"].as_array().unwrap().len(), 2);
        assert_eq!(loaded["complaints"][1]["complainant"], "B");
        assert_eq!(loaded["deviceLedger"][0]["deviceName"], "Lift");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_all_stored() {
        let (_dir, store) = store().await;
        let store = Arc::new(store);

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .add_item("complaints", rec(json!({"complainant": format!("C{}", i)})))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().expect("concurrent add should succeed");
        }

        let all = store.get_data("complaints").await.unwrap();
        assert_eq!(all.len(), 20);
        let ids: HashSet<_> = all.iter().filter_map(records::record_id).collect();
        assert_eq!(ids.len(), 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_and_saves_do_not_lock_out() {
        let (_dir, store) = store().await;
        let store = Arc::new(store);
        let seed = store
            .add_item("deviceLedger", rec(json!({"deviceName": "Lift"})))
            .await
            .unwrap();
        let id = records::record_id(&seed).unwrap().to_string();

        let mut handles = Vec::new();
        for i in 0..10 {
            let updater = Arc::clone(&store);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                updater
                    .update_item("deviceLedger", &id, rec(json!({"checks": i})))
                    .await
                    .map(|_| ())
            }));
            let saver = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                saver
                    .save_data("complaints", vec![rec(json!({"id": format!("{}", i)}))])
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().expect("concurrent write should succeed");
        }

        assert_eq!(store.get_data("complaints").await.unwrap().len(), 1);
        assert!(store.get_item("deviceLedger", &id).await.unwrap()["checks"].is_number());
    }
}
