//! `write_file`: writes text content under a sandboxed output root.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tool::Tool;

#[derive(Debug, Deserialize)]
struct Args {
    path: String,
    content: String,
}

/// `write_file{path, content} -> {result: "wrote <n> bytes to <path>", path}`.
///
/// Every path is resolved under `output_root`; `..` components and absolute
/// paths are rejected rather than silently stripped, so a planner cannot
/// walk the sandbox out from under it.
#[derive(Debug, Clone)]
pub struct WriteFileTool {
    output_root: PathBuf,
}

impl WriteFileTool {
    /// Build a tool that confines every write beneath `output_root`.
    #[must_use]
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    fn resolve(&self, requested: &str) -> Result<PathBuf, String> {
        let requested = Path::new(requested);
        if requested
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(format!("path '{}' escapes the sandboxed output root", requested.display()));
        }
        Ok(self.output_root.join(requested))
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "write_file{path, content} -> {result: \"wrote <n> bytes to <path>\", path}"
    }

    async fn call(&self, args: &Value) -> Value {
        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
        };
        let resolved = match self.resolve(&args.path) {
            Ok(p) => p,
            Err(e) => return json!({ "error": e }),
        };
        if let Some(parent) = resolved.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return json!({ "error": format!("failed to create directory: {e}") });
            }
        }
        match tokio::fs::write(&resolved, args.content.as_bytes()).await {
            Ok(()) => json!({
                "result": format!("wrote {} bytes to {}", args.content.len(), args.path),
                "path": args.path,
            }),
            Err(e) => json!({ "error": format!("failed to write file: {e}") }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_content_under_root() {
        let dir = tempfile_dir();
        let tool = WriteFileTool::new(&dir);
        let out = tool.call(&json!({"path": "out.txt", "content": "hi"})).await;
        assert!(out["result"].as_str().unwrap().contains("wrote 2 bytes"));
        let written = std::fs::read_to_string(dir.join("out.txt")).expect("file exists");
        assert_eq!(written, "hi");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn rejects_parent_dir_escape() {
        let dir = tempfile_dir();
        let tool = WriteFileTool::new(&dir);
        let out = tool
            .call(&json!({"path": "../escape.txt", "content": "hi"}))
            .await;
        assert!(out.get("error").is_some());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn rewriting_identical_content_is_idempotent() {
        let dir = tempfile_dir();
        let tool = WriteFileTool::new(&dir);
        let first = tool.call(&json!({"path": "fib.txt", "content": "0,1"})).await;
        let second = tool.call(&json!({"path": "fib.txt", "content": "0,1"})).await;
        assert_eq!(first["result"], second["result"]);
        std::fs::remove_dir_all(&dir).ok();
    }

    fn tempfile_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "taskloom-write-file-test-{:?}",
            std::thread::current().id()
        ));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }
}
