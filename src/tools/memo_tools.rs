//! `memoize` / `retrieve_memo`: thin adapters over [`crate::memo::SqliteMemoStore`],
//! distinguished by name at the driver level (§4.6) but implemented here as
//! ordinary tools so the registry stays uniform.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::memo::{SqliteMemoStore, NAMESPACE_RUN};
use crate::tool::Tool;

/// `memoize{run_id, key, value, namespace?, source_tool?, step?} -> {result, key, namespace, value_hash, run_id}`.
#[derive(Clone)]
pub struct MemoizeTool {
    store: Arc<SqliteMemoStore>,
}

impl MemoizeTool {
    /// Build a memoize tool backed by `store`.
    #[must_use]
    pub fn new(store: Arc<SqliteMemoStore>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for MemoizeTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoizeTool").finish()
    }
}

#[async_trait]
impl Tool for MemoizeTool {
    fn name(&self) -> &str {
        "memoize"
    }

    fn description(&self) -> &str {
        "memoize{run_id, key, value, namespace?, source_tool?, step?} -> {result, key, namespace, value_hash, run_id}"
    }

    async fn call(&self, args: &Value) -> Value {
        let run_id = match args.get("run_id").and_then(Value::as_str) {
            Some(s) => s.to_string(),
            None => return json!({ "error": "memoize requires 'run_id'" }),
        };
        let key = match args.get("key").and_then(Value::as_str) {
            Some(s) => s.to_string(),
            None => return json!({ "error": "memoize requires 'key'" }),
        };
        let Some(value) = args.get("value").cloned() else {
            return json!({ "error": "memoize requires 'value'" });
        };
        let namespace = args
            .get("namespace")
            .and_then(Value::as_str)
            .unwrap_or(NAMESPACE_RUN)
            .to_string();
        let source_tool = args
            .get("source_tool")
            .and_then(Value::as_str)
            .unwrap_or("memoize")
            .to_string();
        let step = args.get("step").and_then(Value::as_u64).unwrap_or(0) as usize;

        match self
            .store
            .put(&run_id, &key, value, &namespace, &source_tool, step)
            .await
        {
            Ok(put) => json!({
                "result": "memoized",
                "key": put.key,
                "namespace": put.namespace,
                "value_hash": put.value_hash,
                "run_id": put.run_id,
            }),
            Err(e) => json!({ "error": format!("memo store error: {e}") }),
        }
    }
}

/// `retrieve_memo{run_id, key, namespace?} -> {found, key, namespace, [value, value_hash, run_id]}`.
#[derive(Clone)]
pub struct RetrieveMemoTool {
    store: Arc<SqliteMemoStore>,
}

impl RetrieveMemoTool {
    /// Build a retrieve_memo tool backed by `store`.
    #[must_use]
    pub fn new(store: Arc<SqliteMemoStore>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for RetrieveMemoTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrieveMemoTool").finish()
    }
}

#[async_trait]
impl Tool for RetrieveMemoTool {
    fn name(&self) -> &str {
        "retrieve_memo"
    }

    fn description(&self) -> &str {
        "retrieve_memo{run_id, key, namespace?} -> {found, key, namespace, [value, value_hash, run_id]}"
    }

    async fn call(&self, args: &Value) -> Value {
        let run_id = match args.get("run_id").and_then(Value::as_str) {
            Some(s) => s.to_string(),
            None => return json!({ "error": "retrieve_memo requires 'run_id'" }),
        };
        let key = match args.get("key").and_then(Value::as_str) {
            Some(s) => s.to_string(),
            None => return json!({ "error": "retrieve_memo requires 'key'" }),
        };
        let namespace = args
            .get("namespace")
            .and_then(Value::as_str)
            .unwrap_or(NAMESPACE_RUN)
            .to_string();

        match self.store.get(&run_id, &key, &namespace).await {
            Ok(result) if result.found => json!({
                "found": true,
                "key": key,
                "namespace": namespace,
                "value": result.value,
                "value_hash": result.value_hash,
                "run_id": run_id,
            }),
            Ok(_) => json!({ "found": false, "key": key, "namespace": namespace }),
            Err(e) => json!({ "error": format!("memo store error: {e}") }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memo::SqliteMemoStore;

    #[tokio::test]
    async fn memoize_then_retrieve_round_trips() {
        let store = Arc::new(SqliteMemoStore::in_memory().expect("opens"));
        let memoize = MemoizeTool::new(Arc::clone(&store));
        let retrieve = RetrieveMemoTool::new(Arc::clone(&store));

        let put = memoize
            .call(&json!({"run_id": "run-1", "key": "write_file:fib.txt", "value": {"path": "fib.txt"}}))
            .await;
        assert_eq!(put["result"], json!("memoized"));

        let got = retrieve
            .call(&json!({"run_id": "run-1", "key": "write_file:fib.txt"}))
            .await;
        assert_eq!(got["found"], json!(true));
        assert_eq!(got["value"]["path"], json!("fib.txt"));
    }

    #[tokio::test]
    async fn retrieve_miss_reports_found_false() {
        let store = Arc::new(SqliteMemoStore::in_memory().expect("opens"));
        let retrieve = RetrieveMemoTool::new(store);
        let got = retrieve
            .call(&json!({"run_id": "run-1", "key": "nope"}))
            .await;
        assert_eq!(got["found"], json!(false));
    }

    #[tokio::test]
    async fn memoize_missing_run_id_is_an_error() {
        let store = Arc::new(SqliteMemoStore::in_memory().expect("opens"));
        let memoize = MemoizeTool::new(store);
        let out = memoize.call(&json!({"key": "k", "value": 1})).await;
        assert!(out.get("error").is_some());
    }
}
