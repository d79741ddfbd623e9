use super::snapshot::{RecoveryError, RecoveryLog, Snapshot};
use async_trait::async_trait;
use chrono::Utc;
use duckdb::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

impl From<duckdb::Error> for RecoveryError {
    fn from(e: duckdb::Error) -> Self {
        RecoveryError::Database(e.to_string())
    }
}

/// DuckDB-backed recovery log.
///
/// Each committed snapshot is one row keyed by epoch, with the tokens and
/// state image serialized together as a single JSON document. Writing the
/// whole snapshot in one statement is what makes the commit atomic: a crash
/// mid-write leaves the previous row as the latest, never a half-snapshot.
pub struct DuckDbRecoveryLog {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbRecoveryLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RecoveryError> {
        let conn = Connection::open(path.as_ref())?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory log for tests.
    pub fn in_memory() -> Result<Self, RecoveryError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl RecoveryLog for DuckDbRecoveryLog {
    async fn init_schema(&self) -> Result<(), RecoveryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "CREATE TABLE IF NOT EXISTS snapshots (
                    epoch UBIGINT PRIMARY KEY,
                    snapshot_data TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL
                )",
                [],
            )?;
            Ok::<(), RecoveryError>(())
        })
        .await
        .map_err(|e| RecoveryError::Database(format!("Task join error: {e}")))?
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), RecoveryError> {
        let conn = self.conn.clone();
        let snapshot = snapshot.clone();

        tokio::task::spawn_blocking(move || {
            let snapshot_json = serde_json::to_string(&snapshot)
                .map_err(|e| RecoveryError::Serialization(e.to_string()))?;

            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT OR REPLACE INTO snapshots (epoch, snapshot_data, created_at)
                 VALUES (?, ?, to_timestamp(? / 1000000.0))",
                duckdb::params![
                    snapshot.epoch,
                    snapshot_json,
                    Utc::now().timestamp_micros()
                ],
            )?;
            Ok::<(), RecoveryError>(())
        })
        .await
        .map_err(|e| RecoveryError::Database(format!("Task join error: {e}")))?
    }

    async fn load_latest_snapshot(&self) -> Result<Option<Snapshot>, RecoveryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT snapshot_data FROM snapshots ORDER BY epoch DESC LIMIT 1",
            )?;

            let mut rows = stmt.query([])?;

            if let Some(row) = rows.next()? {
                let snapshot_json: String = row.get(0)?;
                let snapshot: Snapshot = serde_json::from_str(&snapshot_json)
                    .map_err(|e| RecoveryError::Serialization(e.to_string()))?;
                Ok(Some(snapshot))
            } else {
                Ok(None)
            }
        })
        .await
        .map_err(|e| RecoveryError::Database(format!("Task join error: {e}")))?
    }

    async fn prune_before(&self, epoch: u64) -> Result<usize, RecoveryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let deleted = conn.execute(
                "DELETE FROM snapshots WHERE epoch < ?",
                duckdb::params![epoch],
            )?;
            Ok::<usize, RecoveryError>(deleted)
        })
        .await
        .map_err(|e| RecoveryError::Database(format!("Task join error: {e}")))?
    }
}
