//! Record import and snapshot interface used by the admin tooling.

use crate::db::rows::{load_record, write_record};
use crate::db::schema::ensure_schema;
use crate::db::ConnectionPool;
use crate::error::{AppError, Result};
use crate::models::{Record, RecordKind};
use rusqlite::DatabaseName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

/// Outcome of an import batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub by_kind: BTreeMap<RecordKind, usize>,
    /// Row ids in input order
    pub ids: Vec<i64>,
}

/// Writes base records. Index synchronization is left to the FTS triggers.
#[derive(Clone)]
pub struct RecordStore {
    pool: ConnectionPool,
}

impl RecordStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Insert or update `records` in one transaction
    pub async fn import(&self, records: Vec<Record>) -> Result<ImportSummary> {
        let mut conn = self.pool.acquire().await?;
        let summary = conn
            .interact(move |conn| {
                let tx = conn.transaction()?;
                let mut summary = ImportSummary::default();
                for record in &records {
                    summary.ids.push(write_record(&tx, record)?);
                    *summary.by_kind.entry(record.kind()).or_insert(0) += 1;
                }
                tx.commit()?;
                summary.imported = records.len();
                Ok::<_, rusqlite::Error>(summary)
            })
            .await?;

        info!(imported = summary.imported, "Records imported");
        Ok(summary)
    }

    pub async fn upsert(&self, record: Record) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        conn.interact(move |conn| write_record(conn, &record)).await
    }

    /// Delete one record; returns whether it existed
    pub async fn delete(&self, kind: RecordKind, id: i64) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        let deleted = conn
            .interact(move |conn| {
                conn.execute(&format!("DELETE FROM {} WHERE id = ?1", kind.table()), [id])
            })
            .await?;
        Ok(deleted > 0)
    }

    pub async fn get(&self, kind: RecordKind, id: i64) -> Result<Option<Record>> {
        let mut conn = self.pool.acquire().await?;
        conn.interact(move |conn| load_record(conn, kind, id)).await
    }

    /// Base record counts per kind
    pub async fn counts(&self) -> Result<BTreeMap<RecordKind, u64>> {
        let mut conn = self.pool.acquire().await?;
        conn.interact(|conn| {
            let mut counts = BTreeMap::new();
            for kind in RecordKind::all() {
                let count: i64 = conn.query_row(
                    &format!("SELECT count(*) FROM {}", kind.table()),
                    [],
                    |row| row.get(0),
                )?;
                counts.insert(kind, count.max(0) as u64);
            }
            Ok::<_, rusqlite::Error>(counts)
        })
        .await
    }

    /// Copy the whole database into an opaque byte buffer
    pub async fn export_snapshot(&self) -> Result<Vec<u8>> {
        let mut conn = self.pool.acquire().await?;
        let bytes = conn
            .interact(|conn| {
                let dir = tempfile::tempdir()?;
                let path = dir.path().join("snapshot.sqlite3");
                conn.backup(DatabaseName::Main, &path, None)?;
                Ok::<_, AppError>(std::fs::read(&path)?)
            })
            .await?;

        info!(bytes = bytes.len(), "Snapshot exported");
        Ok(bytes)
    }

    /// Replace the database contents with a snapshot produced by
    /// [`export_snapshot`](Self::export_snapshot).
    ///
    /// Every pooled connection opened before the restore is discarded.
    pub async fn import_snapshot(&self, bytes: Vec<u8>) -> Result<()> {
        if bytes.len() < SQLITE_HEADER.len() || &bytes[..SQLITE_HEADER.len()] != SQLITE_HEADER {
            return Err(AppError::Validation(
                "snapshot is not an SQLite database".to_string(),
            ));
        }

        let size = bytes.len();
        {
            let mut conn = self.pool.acquire().await?;
            conn.interact(move |conn| {
                let dir = tempfile::tempdir()?;
                let path = dir.path().join("restore.sqlite3");
                std::fs::write(&path, &bytes)?;
                conn.restore(DatabaseName::Main, &path, None::<fn(rusqlite::backup::Progress)>)?;
                ensure_schema(conn)?;
                Ok::<_, AppError>(())
            })
            .await?;
        }

        self.pool.reset();
        self.pool.warm_up().await?;
        info!(bytes = size, "Snapshot imported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ConnectionManager, PoolConfig};
    use crate::models::{Photo, Staff};
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> RecordStore {
        let manager = ConnectionManager::new(dir.path().join("store.sqlite3"));
        let pool = ConnectionPool::open(manager, PoolConfig::default()).await.unwrap();
        RecordStore::new(pool)
    }

    #[tokio::test]
    async fn test_import_and_count() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let summary = store
            .import(vec![
                Record::Staff(Staff {
                    full_name: "Grace Hopper".into(),
                    ..Default::default()
                }),
                Record::Photo(Photo {
                    title: "Class picnic".into(),
                    ..Default::default()
                }),
            ])
            .await
            .unwrap();
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.by_kind[&RecordKind::Staff], 1);

        let counts = store.counts().await.unwrap();
        assert_eq!(counts[&RecordKind::Staff], 1);
        assert_eq!(counts[&RecordKind::Photo], 1);
        assert_eq!(counts[&RecordKind::Profile], 0);

        assert!(store.delete(RecordKind::Staff, summary.ids[0]).await.unwrap());
        assert!(!store.delete(RecordKind::Staff, summary.ids[0]).await.unwrap());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let id = store
            .upsert(Record::Staff(Staff {
                full_name: "Alan Turing".into(),
                ..Default::default()
            }))
            .await
            .unwrap();

        let snapshot = store.export_snapshot().await.unwrap();
        assert!(snapshot.starts_with(SQLITE_HEADER));

        store.delete(RecordKind::Staff, id).await.unwrap();
        store.import_snapshot(snapshot).await.unwrap();

        let restored = store.get(RecordKind::Staff, id).await.unwrap();
        assert!(restored.is_some());
        assert!(store.pool().metrics().generation >= 1);
    }

    #[tokio::test]
    async fn test_snapshot_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let err = store.import_snapshot(b"not a database".to_vec()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
