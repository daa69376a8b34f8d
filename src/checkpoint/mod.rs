//! Append-only per-run snapshot log (C3).
//!
//! Same blocking-bridge shape as [`crate::memo::SqliteMemoStore`]; this
//! store is write-heavy and read-only for post-mortem, so it carries no
//! transactional coupling to the memo store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{Connection, params};

use crate::canonical::to_canonical_json;
use crate::error::CheckpointError;
use crate::state::RunState;

/// One row as returned by [`SqliteCheckpointStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSummary {
    /// The step at which this checkpoint was written.
    pub step: usize,
    /// The node name that produced this checkpoint.
    pub node_name: String,
    /// ISO-8601 UTC creation timestamp.
    pub created_at: String,
}

/// SQLite-backed append-only checkpoint log.
#[derive(Debug, Clone)]
pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointStore {
    /// Open (or create) a database at `path` and initialize the schema.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or the schema cannot
    /// be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let conn = Connection::open(path.as_ref())?;
        Self::from_connection(conn)
    }

    /// Open an ephemeral in-memory database (data lost on drop).
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self, CheckpointError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, CheckpointError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS graph_checkpoints (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id      TEXT    NOT NULL,
                step        INTEGER NOT NULL,
                node_name   TEXT    NOT NULL,
                state_json  TEXT    NOT NULL,
                created_at  TEXT    NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_graph_checkpoints_run_step
            ON graph_checkpoints (run_id, step);",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, CheckpointError>
    where
        F: FnOnce(&Connection) -> Result<T, CheckpointError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| CheckpointError::Task(format!("poisoned lock: {e}")))?;
            f(&guard)
        })
        .await
        .map_err(|e| CheckpointError::Task(e.to_string()))?
    }

    /// Append a snapshot of `state` at `step`/`node_name`.
    ///
    /// # Errors
    /// Returns an error if the state cannot be serialized or the write
    /// fails. Callers on the non-fatal path (§7) should log and continue
    /// rather than propagate.
    pub async fn save(
        &self,
        run_id: &str,
        step: usize,
        node_name: &str,
        state: &RunState,
    ) -> Result<(), CheckpointError> {
        let state_json = to_canonical_json(state).map_err(CheckpointError::Serialize)?;
        let created_at = Utc::now().to_rfc3339();
        let run_id = run_id.to_string();
        let node_name = node_name.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO graph_checkpoints (run_id, step, node_name, state_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![run_id, step as i64, node_name, state_json, created_at],
            )?;
            Ok(())
        })
        .await
    }

    /// Load the latest snapshot for `run_id` (max step, tie-break max id).
    ///
    /// # Errors
    /// Returns an error if the read or deserialization fails.
    pub async fn load_latest(&self, run_id: &str) -> Result<Option<RunState>, CheckpointError> {
        use rusqlite::OptionalExtension;
        let run_id = run_id.to_string();
        self.blocking(move |conn| {
            let row: Option<String> = conn
                .query_row(
                    "SELECT state_json FROM graph_checkpoints
                     WHERE run_id = ?1
                     ORDER BY step DESC, id DESC LIMIT 1",
                    params![run_id],
                    |row| row.get(0),
                )
                .optional()?;
            row.map(|json| serde_json::from_str(&json).map_err(CheckpointError::Serialize))
                .transpose()
        })
        .await
    }

    /// List every checkpoint recorded for `run_id`, in write order.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    pub async fn list(&self, run_id: &str) -> Result<Vec<CheckpointSummary>, CheckpointError> {
        let run_id = run_id.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT step, node_name, created_at FROM graph_checkpoints
                 WHERE run_id = ?1
                 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map(params![run_id], |row| {
                    Ok(CheckpointSummary {
                        step: {
                            let step: i64 = row.get(0)?;
                            step as usize
                        },
                        node_name: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, rusqlite::Error>>()?;
            Ok(rows)
        })
        .await
    }
}
