//! End-to-end orchestrator runs against a scripted planner, covering the
//! concrete execution scenarios the guardrail design was built against:
//! hard planner timeout, the fibonacci write happy path (with its
//! auto-lookup and memoize dance), content-validation retry, duplicate-call
//! auto-finish, cross-run cache reuse, and memoization policy exhaustion.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use taskloom::checkpoint::SqliteCheckpointStore;
use taskloom::driver::fallback::fibonacci_csv;
use taskloom::memo::SqliteMemoStore;
use taskloom::tools::register_reference_tools;
use taskloom::{Config, MockPlanner, Orchestrator, OrchestratorError};

fn tool_json(tool_name: &str, args: serde_json::Value) -> String {
    serde_json::json!({"action": "tool", "tool_name": tool_name, "args": args}).to_string()
}

fn finish_json(answer: &str) -> String {
    serde_json::json!({"action": "finish", "answer": answer}).to_string()
}

fn temp_root(label: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "taskloom-scenario-{label}-{:?}",
        std::thread::current().id()
    ));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

#[tokio::test]
async fn planner_hard_timeout_fails_closed() {
    let root = temp_root("s1");
    let memo_store = Arc::new(SqliteMemoStore::in_memory().unwrap());
    let checkpoint_store = Arc::new(SqliteCheckpointStore::in_memory().unwrap());
    let tools = register_reference_tools(&root, Arc::clone(&memo_store));
    let planner = Arc::new(
        MockPlanner::cycling(vec![finish_json("never seen")]).with_delay(Duration::from_millis(200)),
    );
    let config = Config::new()
        .with_output_root(&root)
        .with_plan_call_timeout(Duration::from_millis(10))
        .with_max_steps(10);

    let orchestrator = Orchestrator::new(planner, tools, memo_store, checkpoint_store, config);
    let report = orchestrator
        .run("Task 1: perform unknown operation now", None)
        .await
        .expect("fails closed, not an Err");

    assert!(report.answer.to_lowercase().contains("provider timeout retries"));
    assert_eq!(report.state.retry_counts.provider_timeout, 2);
    assert!(report.tools_used.is_empty());

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn fibonacci_write_happy_path_auto_lookups_then_memoizes() {
    let root = temp_root("s2");
    let memo_store = Arc::new(SqliteMemoStore::in_memory().unwrap());
    let checkpoint_store = Arc::new(SqliteCheckpointStore::in_memory().unwrap());
    let tools = register_reference_tools(&root, Arc::clone(&memo_store));
    let path = "sub/fib.txt";
    let content = fibonacci_csv(100);

    let planner = Arc::new(MockPlanner::new(vec![
        tool_json("write_file", serde_json::json!({"path": path, "content": content})),
        tool_json(
            "memoize",
            serde_json::json!({
                "key": format!("write_file:{path}"),
                "value": {"path": path, "source": "test"},
                "source_tool": "write_file",
            }),
        ),
        finish_json("done"),
    ]));
    let config = Config::new().with_output_root(&root).with_max_steps(20);

    let orchestrator = Orchestrator::new(planner, tools, memo_store, checkpoint_store, config);
    let report = orchestrator
        .run(
            "Task 1: Use write_file tool to write the fibonacci sequence until the 100th number to sub/fib.txt",
            None,
        )
        .await
        .expect("completes");

    let executed: Vec<&str> = report.tools_used.iter().map(|e| e.tool.as_str()).collect();
    assert_eq!(executed, ["retrieve_memo", "retrieve_memo", "write_file", "memoize"]);
    assert_eq!(report.answer, "done");
    assert_eq!(report.derived_snapshot.memo_entry_count, 1);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn content_validation_rejects_then_accepts_a_corrected_write() {
    let root = temp_root("s3");
    let memo_store = Arc::new(SqliteMemoStore::in_memory().unwrap());
    let checkpoint_store = Arc::new(SqliteCheckpointStore::in_memory().unwrap());
    let tools = register_reference_tools(&root, Arc::clone(&memo_store));
    let path = "sub/fib.txt";
    let bad_content = "0, 1, 1, 2, 3, 5, 110, 114, 118";
    let good_content = fibonacci_csv(100);

    let planner = Arc::new(MockPlanner::new(vec![
        tool_json("write_file", serde_json::json!({"path": path, "content": bad_content})),
        tool_json("write_file", serde_json::json!({"path": path, "content": good_content})),
        tool_json(
            "memoize",
            serde_json::json!({
                "key": format!("write_file:{path}"),
                "value": {"path": path, "source": "test"},
                "source_tool": "write_file",
            }),
        ),
        finish_json("done"),
    ]));
    let config = Config::new().with_output_root(&root).with_max_steps(20);

    let orchestrator = Orchestrator::new(planner, tools, memo_store, checkpoint_store, config);
    let report = orchestrator
        .run(
            "Task 1: Use write_file tool to write the fibonacci sequence until the 100th number to sub/fib.txt",
            None,
        )
        .await
        .expect("completes");

    let executed: Vec<&str> = report.tools_used.iter().map(|e| e.tool.as_str()).collect();
    assert_eq!(
        executed,
        ["retrieve_memo", "retrieve_memo", "write_file", "write_file", "memoize"]
    );
    assert!(report.tools_used[2].result.get("error").is_some());
    assert_eq!(report.state.retry_counts.content_validation, 1);
    assert_eq!(report.answer, "done");

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn duplicate_tool_call_after_completion_auto_finishes() {
    let root = temp_root("s4");
    let memo_store = Arc::new(SqliteMemoStore::in_memory().unwrap());
    let checkpoint_store = Arc::new(SqliteCheckpointStore::in_memory().unwrap());
    let tools = register_reference_tools(&root, Arc::clone(&memo_store));

    let planner = Arc::new(MockPlanner::new(vec![
        tool_json("repeat_message", serde_json::json!({"message": "ok"})),
        tool_json("repeat_message", serde_json::json!({"message": "ok"})),
    ]));
    let config = Config::new().with_output_root(&root).with_max_steps(20);

    let orchestrator = Orchestrator::new(planner, tools, memo_store, checkpoint_store, config);
    let report = orchestrator.run("Task 1: repeat", None).await.expect("completes");

    let executed: Vec<&str> = report.tools_used.iter().map(|e| e.tool.as_str()).collect();
    assert_eq!(executed, ["repeat_message"]);
    assert!(report.answer.contains("All tasks completed."));

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn cross_run_cache_reuse_skips_the_planner_entirely() {
    let root = temp_root("s5");
    let memo_store = Arc::new(SqliteMemoStore::in_memory().unwrap());
    let checkpoint_store = Arc::new(SqliteCheckpointStore::in_memory().unwrap());
    let path = "sub/fib.txt";
    let mission = format!(
        "Task 1: Use write_file tool to write the fibonacci sequence until the 100th number to {path}"
    );

    let seed_tools = register_reference_tools(&root, Arc::clone(&memo_store));
    let seed_planner = Arc::new(MockPlanner::new(vec![
        tool_json("write_file", serde_json::json!({"path": path, "content": fibonacci_csv(100)})),
        tool_json(
            "memoize",
            serde_json::json!({
                "key": format!("write_file:{path}"),
                "value": {"path": path, "source": "seed"},
                "source_tool": "write_file",
            }),
        ),
        finish_json("seed complete"),
    ]));
    let seed_config = Config::new().with_output_root(&root).with_max_steps(20);
    let seed_orchestrator = Orchestrator::new(
        seed_planner,
        seed_tools,
        Arc::clone(&memo_store),
        Arc::clone(&checkpoint_store),
        seed_config,
    );
    seed_orchestrator.run(&mission, None).await.expect("seed run completes");

    let tools = register_reference_tools(&root, Arc::clone(&memo_store));
    let planner = Arc::new(MockPlanner::new(vec![finish_json("should not be needed")]));
    let config = Config::new().with_output_root(&root).with_max_steps(20);
    let orchestrator = Orchestrator::new(planner, tools, memo_store, checkpoint_store, config);
    let report = orchestrator.run(&mission, None).await.expect("reuse run completes");

    let executed: Vec<&str> = report.tools_used.iter().map(|e| e.tool.as_str()).collect();
    assert_eq!(executed, ["write_file"]);
    assert_eq!(report.derived_snapshot.cache_reuse_hits, 1);
    assert!(report.answer.contains("All tasks completed."));

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn memoization_policy_violation_escapes_as_an_error() {
    let root = temp_root("s6");
    let memo_store = Arc::new(SqliteMemoStore::in_memory().unwrap());
    let checkpoint_store = Arc::new(SqliteCheckpointStore::in_memory().unwrap());
    let tools = register_reference_tools(&root, Arc::clone(&memo_store));

    let heavy_content: String = (0..30).map(|i| i.to_string()).collect::<Vec<_>>().join(",");
    let planner = Arc::new(MockPlanner::new(vec![
        tool_json("write_file", serde_json::json!({"path": "heavy.txt", "content": heavy_content})),
        tool_json("sort_array", serde_json::json!({"items": [3, 1, 2], "order": "asc"})),
        tool_json("sort_array", serde_json::json!({"items": [3, 1, 2], "order": "asc"})),
    ]));
    let mut config = Config::new().with_output_root(&root).with_max_steps(30);
    config.memo_max_policy_retries = 1;

    let orchestrator = Orchestrator::new(planner, tools, memo_store, checkpoint_store, config);
    let err = orchestrator
        .run("Task 1: write heavy data to heavy.txt\nTask 2: sort 3, 1, 2", None)
        .await
        .expect_err("policy violation must escape as Err");

    match err {
        OrchestratorError::MemoizationPolicyViolation { tool_name, .. } => {
            assert_eq!(tool_name, "sort_array");
        }
        other => panic!("expected MemoizationPolicyViolation, got {other:?}"),
    }

    std::fs::remove_dir_all(&root).ok();
}
