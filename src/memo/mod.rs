//! Run-scoped and cross-run durable key→value store (C2).
//!
//! [`SqliteMemoStore`] persists memo entries in SQLite, bridged to async via
//! `tokio::task::spawn_blocking` — the same shape as the teacher's
//! `SqliteSession`: a `Mutex<Connection>` behind an `Arc`, one blocking
//! closure per operation, WAL mode for concurrent readers.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use crate::canonical::{hash_json, to_canonical_json};
use crate::error::MemoError;

/// Default namespace for run-scoped memoization.
pub const NAMESPACE_RUN: &str = "run";
/// Namespace used for the cross-run write-cache.
pub const NAMESPACE_CACHE: &str = "cache";
/// The pseudo run id under which cross-run cache entries are stored.
pub const SHARED_RUN_ID: &str = "shared";

/// Outcome of a [`SqliteMemoStore::put`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    /// Always `true`: the store always has a row after `put` returns
    /// (insert or overwrite), mirroring the upsert semantics of §4.2.
    pub inserted: bool,
    /// The run this entry was written under.
    pub run_id: String,
    /// The memo key.
    pub key: String,
    /// The memo namespace.
    pub namespace: String,
    /// Hex SHA-256 of the value's canonical JSON form.
    pub value_hash: String,
}

/// Outcome of a [`SqliteMemoStore::get`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResult {
    /// Whether a matching entry was found.
    pub found: bool,
    /// The stored value, if found.
    pub value: Option<Value>,
    /// The stored value's content hash, if found.
    pub value_hash: Option<String>,
}

/// Outcome of a [`SqliteMemoStore::get_latest`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetLatestResult {
    /// Whether any matching entry was found across all runs.
    pub found: bool,
    /// The run id that produced the most recent entry.
    pub run_id: Option<String>,
    /// The stored value, if found.
    pub value: Option<Value>,
    /// The stored value's content hash, if found.
    pub value_hash: Option<String>,
}

/// One row as returned by [`SqliteMemoStore::list_entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoEntrySummary {
    /// The memo key.
    pub key: String,
    /// Hex SHA-256 of the stored value.
    pub value_hash: String,
    /// The tool that wrote this entry.
    pub source_tool: String,
    /// The step at which this entry was written.
    pub step: i64,
    /// ISO-8601 UTC creation timestamp.
    pub created_at: String,
}

/// SQLite-backed implementation of [`MemoStore`].
///
/// Cloneable via `Arc<Mutex<Connection>>`; every clone shares one database.
#[derive(Debug, Clone)]
pub struct SqliteMemoStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMemoStore {
    /// Open (or create) a database at `path` and initialize the schema.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or the schema cannot
    /// be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoError> {
        let conn = Connection::open(path.as_ref())?;
        Self::from_connection(conn)
    }

    /// Open an ephemeral in-memory database (data lost on drop).
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self, MemoError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, MemoError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS memo_entries (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id       TEXT    NOT NULL,
                namespace    TEXT    NOT NULL,
                key          TEXT    NOT NULL,
                value_json   TEXT    NOT NULL,
                value_hash   TEXT    NOT NULL,
                source_tool  TEXT    NOT NULL,
                step         INTEGER NOT NULL,
                created_at   TEXT    NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS uq_memo_entries_run_key
            ON memo_entries (run_id, namespace, key);",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, MemoError>
    where
        F: FnOnce(&Connection) -> Result<T, MemoError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| MemoError::Task(format!("poisoned lock: {e}")))?;
            f(&guard)
        })
        .await
        .map_err(|e| MemoError::Task(e.to_string()))?
    }

    /// Upsert a memo entry under `(run_id, namespace, key)`.
    ///
    /// # Errors
    /// Returns an error if the value cannot be canonicalized or the write
    /// fails.
    pub async fn put(
        &self,
        run_id: &str,
        key: &str,
        value: Value,
        namespace: &str,
        source_tool: &str,
        step: usize,
    ) -> Result<PutResult, MemoError> {
        let value_json = to_canonical_json(&value).map_err(MemoError::Serialize)?;
        let value_hash = hash_json(&value).map_err(MemoError::Serialize)?;
        let created_at = Utc::now().to_rfc3339();

        let run_id_owned = run_id.to_string();
        let key_owned = key.to_string();
        let namespace_owned = namespace.to_string();
        let source_tool_owned = source_tool.to_string();
        let value_hash_clone = value_hash.clone();

        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO memo_entries
                    (run_id, namespace, key, value_json, value_hash, source_tool, step, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(run_id, namespace, key) DO UPDATE SET
                    value_json = excluded.value_json,
                    value_hash = excluded.value_hash,
                    source_tool = excluded.source_tool,
                    step = excluded.step,
                    created_at = excluded.created_at",
                params![
                    run_id_owned,
                    namespace_owned,
                    key_owned,
                    value_json,
                    value_hash_clone,
                    source_tool_owned,
                    step as i64,
                    created_at
                ],
            )?;
            Ok(())
        })
        .await?;

        Ok(PutResult {
            inserted: true,
            run_id: run_id.to_string(),
            key: key.to_string(),
            namespace: namespace.to_string(),
            value_hash,
        })
    }

    /// Fetch a memo entry by `(run_id, namespace, key)`.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    pub async fn get(&self, run_id: &str, key: &str, namespace: &str) -> Result<GetResult, MemoError> {
        let run_id = run_id.to_string();
        let key = key.to_string();
        let namespace = namespace.to_string();
        self.blocking(move |conn| {
            let row: Option<(String, String)> = conn
                .query_row(
                    "SELECT value_json, value_hash FROM memo_entries
                     WHERE run_id = ?1 AND namespace = ?2 AND key = ?3",
                    params![run_id, namespace, key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            match row {
                Some((value_json, value_hash)) => {
                    let value: Value = serde_json::from_str(&value_json)
                        .map_err(MemoError::Serialize)?;
                    Ok(GetResult {
                        found: true,
                        value: Some(value),
                        value_hash: Some(value_hash),
                    })
                }
                None => Ok(GetResult {
                    found: false,
                    value: None,
                    value_hash: None,
                }),
            }
        })
        .await
    }

    /// Fetch the most recently inserted entry for `key`/`namespace` across
    /// every run — the mechanism behind cross-run cache reuse.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    pub async fn get_latest(&self, key: &str, namespace: &str) -> Result<GetLatestResult, MemoError> {
        let key = key.to_string();
        let namespace = namespace.to_string();
        self.blocking(move |conn| {
            let row: Option<(String, String, String)> = conn
                .query_row(
                    "SELECT run_id, value_json, value_hash FROM memo_entries
                     WHERE namespace = ?1 AND key = ?2
                     ORDER BY id DESC LIMIT 1",
                    params![namespace, key],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;
            match row {
                Some((run_id, value_json, value_hash)) => {
                    let value: Value = serde_json::from_str(&value_json)
                        .map_err(MemoError::Serialize)?;
                    Ok(GetLatestResult {
                        found: true,
                        run_id: Some(run_id),
                        value: Some(value),
                        value_hash: Some(value_hash),
                    })
                }
                None => Ok(GetLatestResult {
                    found: false,
                    run_id: None,
                    value: None,
                    value_hash: None,
                }),
            }
        })
        .await
    }

    /// List every entry for `run_id`/`namespace`, ordered by `(step, id)`.
    ///
    /// # Errors
    /// Returns an error if the read fails.
    pub async fn list_entries(
        &self,
        run_id: &str,
        namespace: &str,
    ) -> Result<Vec<MemoEntrySummary>, MemoError> {
        let run_id = run_id.to_string();
        let namespace = namespace.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key, value_hash, source_tool, step, created_at FROM memo_entries
                 WHERE run_id = ?1 AND namespace = ?2
                 ORDER BY step ASC, id ASC",
            )?;
            let rows = stmt
                .query_map(params![run_id, namespace], |row| {
                    Ok(MemoEntrySummary {
                        key: row.get(0)?,
                        value_hash: row.get(1)?,
                        source_tool: row.get(2)?,
                        step: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, rusqlite::Error>>()?;
            Ok(rows)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = SqliteMemoStore::in_memory().expect("opens");
        let put = store
            .put("run-1", "k", json!({"a": 1}), NAMESPACE_RUN, "memoize", 1)
            .await
            .expect("puts");
        assert!(put.inserted);

        let got = store.get("run-1", "k", NAMESPACE_RUN).await.expect("gets");
        assert!(got.found);
        assert_eq!(got.value, Some(json!({"a": 1})));
        assert_eq!(got.value_hash, Some(put.value_hash));
    }

    #[tokio::test]
    async fn put_upserts_on_conflict() {
        let store = SqliteMemoStore::in_memory().expect("opens");
        store
            .put("run-1", "k", json!(1), NAMESPACE_RUN, "memoize", 1)
            .await
            .expect("puts");
        store
            .put("run-1", "k", json!(2), NAMESPACE_RUN, "memoize", 2)
            .await
            .expect("puts");

        let entries = store
            .list_entries("run-1", NAMESPACE_RUN)
            .await
            .expect("lists");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].step, 2);
    }

    #[tokio::test]
    async fn get_latest_crosses_runs() {
        let store = SqliteMemoStore::in_memory().expect("opens");
        store
            .put("run-1", "shared-key", json!("old"), NAMESPACE_CACHE, "write_file", 1)
            .await
            .expect("puts");
        store
            .put("run-2", "shared-key", json!("new"), NAMESPACE_CACHE, "write_file", 1)
            .await
            .expect("puts");

        let latest = store
            .get_latest("shared-key", NAMESPACE_CACHE)
            .await
            .expect("gets");
        assert!(latest.found);
        assert_eq!(latest.run_id.as_deref(), Some("run-2"));
        assert_eq!(latest.value, Some(json!("new")));
    }

    #[tokio::test]
    async fn missing_key_is_a_clean_miss() {
        let store = SqliteMemoStore::in_memory().expect("opens");
        let got = store.get("run-1", "absent", NAMESPACE_RUN).await.expect("gets");
        assert!(!got.found);
        assert!(got.value.is_none());
    }

    #[tokio::test]
    async fn list_entries_orders_by_step_then_insertion() {
        let store = SqliteMemoStore::in_memory().expect("opens");
        store
            .put("run-1", "b", json!(1), NAMESPACE_RUN, "t", 2)
            .await
            .expect("puts");
        store
            .put("run-1", "a", json!(1), NAMESPACE_RUN, "t", 1)
            .await
            .expect("puts");
        let entries = store.list_entries("run-1", NAMESPACE_RUN).await.expect("lists");
        assert_eq!(entries[0].key, "a");
        assert_eq!(entries[1].key, "b");
    }
}
