//! SQLite warm-start snapshot.
//!
//! Holds the last successful [`FetchResult`] per cache key so a restarted
//! dashboard has something to show before its first poll completes. One row
//! per key; this is not history. Rows never contain secrets.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use cloudmon_core::{FetchResult, ProviderId};
use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::persistence::{ensure_dir, set_restrictive_permissions};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS results (
    provider_id TEXT NOT NULL,
    account_id  TEXT NOT NULL,
    query_kind  TEXT NOT NULL,
    fetched_at  TEXT NOT NULL,
    result_json TEXT NOT NULL,
    PRIMARY KEY (provider_id, account_id, query_kind)
);
";

/// Last-known-value store backed by SQLite.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SnapshotStore {
    /// Opens (or creates) the snapshot database at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the directory or database cannot be created.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent).await?;
        }

        let db_path = path.to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, StoreError> {
            let conn = Connection::open(&db_path)?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;

        set_restrictive_permissions(path).await?;
        debug!(path = %path.display(), "Opened snapshot database");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Fails if SQLite cannot initialize.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Returns the database path, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            op(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Upserts successful results. Failed results are ignored.
    ///
    /// Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Fails on SQLite or serialization errors; nothing is written then.
    pub async fn save(&self, results: Vec<FetchResult>) -> Result<usize, StoreError> {
        let written = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let mut written = 0;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO results (provider_id, account_id, query_kind, fetched_at, result_json)
                         VALUES (?1, ?2, ?3, ?4, ?5)
                         ON CONFLICT (provider_id, account_id, query_kind)
                         DO UPDATE SET fetched_at = excluded.fetched_at, result_json = excluded.result_json",
                    )?;
                    for result in results.iter().filter(|r| r.success) {
                        let json = serde_json::to_string(result)?;
                        stmt.execute(params![
                            result.key.provider_id.as_str(),
                            result.key.account_id,
                            result.key.query_kind.as_str(),
                            result.fetched_at.to_rfc3339(),
                            json,
                        ])?;
                        written += 1;
                    }
                }
                tx.commit()?;
                Ok(written)
            })
            .await?;
        debug!(rows = written, "Saved snapshot");
        Ok(written)
    }

    /// Loads every stored result.
    ///
    /// Rows that no longer decode are skipped.
    ///
    /// # Errors
    ///
    /// Fails on SQLite errors.
    pub async fn load_all(&self) -> Result<Vec<FetchResult>, StoreError> {
        let rows = self
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT result_json FROM results ORDER BY provider_id, account_id, query_kind",
                )?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let results: Vec<FetchResult> = rows
            .iter()
            .filter_map(|json| match serde_json::from_str(json) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable snapshot row");
                    None
                }
            })
            .collect();
        debug!(rows = results.len(), "Loaded snapshot");
        Ok(results)
    }

    /// Deletes every row of an account. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Fails on SQLite errors.
    pub async fn delete_account(
        &self,
        provider_id: &ProviderId,
        account_id: &str,
    ) -> Result<usize, StoreError> {
        let provider = provider_id.as_str().to_string();
        let account = account_id.to_string();
        self.with_conn(move |conn| {
            Ok(conn.execute(
                "DELETE FROM results WHERE provider_id = ?1 AND account_id = ?2",
                params![provider, account],
            )?)
        })
        .await
    }
}
