//! Deterministic fallback generator (§4.8.1): a planner substitute for
//! once the provider has timed out too many times to keep trusting it.
//! Recognizes a fixed set of mission shapes by keyword and regex match and
//! proposes the matching tool call directly, with no model in the loop.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::driver::tracker::next_incomplete_mission;
use crate::state::{Action, RunState};

/// Render the first `n` Fibonacci numbers (seeded `0, 1`) as CSV.
#[must_use]
pub fn fibonacci_csv(n: usize) -> String {
    let n = n.max(2);
    let mut seq = vec![0i64, 1];
    while seq.len() < n {
        let next = seq[seq.len() - 1] + seq[seq.len() - 2];
        seq.push(next);
    }
    seq.truncate(n);
    seq.iter().map(i64::to_string).collect::<Vec<_>>().join(",")
}

/// A short deterministic wrap-up string, reused by the fallback's own
/// all-complete case and by the plan node's all-complete check (§4.8).
#[must_use]
pub fn auto_summary(state: &RunState) -> String {
    format!(
        "All tasks completed. {} of {} missions finished.",
        state.completed_tasks.len(),
        state.missions.len()
    )
}

fn quoted_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"["']([^"']+)["']"#).expect("valid regex"))
}

fn ints_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+").expect("valid regex"))
}

fn path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\w./-]+\.\w+").expect("valid regex"))
}

fn count_patterns() -> &'static Vec<Regex> {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        vec![
            Regex::new(r"(\d+)(?:st|nd|rd|th)\s+number").expect("valid regex"),
            Regex::new(r"first\s+(\d+)\s+(?:terms|numbers)").expect("valid regex"),
            Regex::new(r"(\d+)\s+(?:terms|numbers)").expect("valid regex"),
        ]
    })
}

fn extract_quoted(text: &str) -> Option<String> {
    quoted_regex().captures(text).map(|c| c[1].to_string())
}

fn extract_ints(text: &str) -> Vec<i64> {
    ints_regex()
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

/// Extract the first filename-like token (`[\w./-]+\.\w+`) from `text`.
///
/// Shared with [`crate::driver::Orchestrator`]'s cross-run cache-reuse
/// shortcut, which needs the same "what file is this mission about" guess
/// the fallback generator uses for `write_file` missions.
#[must_use]
pub fn extract_path(text: &str) -> Option<String> {
    path_regex().find(text).map(|m| m.as_str().to_string())
}

fn extract_fib_count(text: &str) -> Option<usize> {
    for pattern in count_patterns() {
        if let Some(caps) = pattern.captures(text) {
            if let Ok(n) = caps[1].parse::<usize>() {
                return Some(n);
            }
        }
    }
    None
}

/// Propose a deterministic next [`Action`] from `state`'s active mission,
/// or `None` if this mission's shape isn't one the fallback recognizes.
///
/// A pending memoization requirement always takes priority: the fallback
/// cannot invent a heavy tool result, but it can always satisfy the policy
/// engine with the last tool result already on hand.
#[must_use]
pub fn deterministic_fallback(state: &RunState) -> Option<Action> {
    if state.policy_flags.memo_required {
        if let Some(key) = state.policy_flags.memo_required_key.clone() {
            let value = state
                .policy_flags
                .last_tool_result
                .clone()
                .unwrap_or_else(|| json!({"status": "memoized_by_fallback"}));
            let source_tool = state.policy_flags.last_tool_name.clone().unwrap_or_default();
            return Some(Action::Tool {
                tool_name: "memoize".to_string(),
                args: json!({
                    "run_id": state.run_id,
                    "key": key,
                    "value": value,
                    "source_tool": source_tool,
                }),
            });
        }
    }

    let idx = next_incomplete_mission(state)?;
    let mission = state.missions.get(idx)?.to_lowercase();

    if mission.contains("repeat") {
        if let Some(text) = extract_quoted(&mission) {
            return Some(Action::Tool {
                tool_name: "repeat_message".to_string(),
                args: json!({"message": text}),
            });
        }
    }

    if mission.contains("sort") {
        let ints = extract_ints(&mission);
        if !ints.is_empty() {
            let order = if mission.contains("desc") { "desc" } else { "asc" };
            return Some(Action::Tool {
                tool_name: "sort_array".to_string(),
                args: json!({"items": ints, "order": order}),
            });
        }
    }

    for operation in ["uppercase", "lowercase", "reverse"] {
        if mission.contains(operation) {
            if let Some(text) = extract_quoted(&mission) {
                return Some(Action::Tool {
                    tool_name: "string_ops".to_string(),
                    args: json!({"text": text, "operation": operation}),
                });
            }
        }
    }

    if mission.contains("fibonacci") && mission.contains("write") {
        let path = extract_path(&mission).unwrap_or_else(|| "fib.txt".to_string());
        let count = extract_fib_count(&mission).unwrap_or(100).max(2);
        let content = fibonacci_csv(count);
        return Some(Action::Tool {
            tool_name: "write_file".to_string(),
            args: json!({"path": path, "content": content}),
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{new_run_state, MissionReport};

    fn state_with_mission(mission: &str) -> RunState {
        let mut state = new_run_state("sys", "in", None);
        state.missions = vec![mission.to_string()];
        state.mission_reports = vec![MissionReport {
            mission_id: 0,
            mission: mission.to_string(),
            ..Default::default()
        }];
        state
    }

    #[test]
    fn fibonacci_csv_starts_zero_one_and_has_correct_length() {
        let csv = fibonacci_csv(10);
        let nums: Vec<i64> = csv.split(',').map(|s| s.parse().unwrap()).collect();
        assert_eq!(nums.len(), 10);
        assert_eq!(&nums[..4], &[0, 1, 1, 2]);
    }

    #[test]
    fn recognizes_a_quoted_repeat_mission() {
        let state = state_with_mission(r#"Task 1: repeat "hello there""#);
        let action = deterministic_fallback(&state).expect("recognized");
        match action {
            Action::Tool { tool_name, args } => {
                assert_eq!(tool_name, "repeat_message");
                assert_eq!(args["message"], json!("hello there"));
            }
            Action::Finish { .. } => panic!("expected tool action"),
        }
    }

    #[test]
    fn recognizes_a_sort_mission() {
        let state = state_with_mission("Task 1: sort 3, 1, 2 descending");
        let action = deterministic_fallback(&state).expect("recognized");
        match action {
            Action::Tool { tool_name, args } => {
                assert_eq!(tool_name, "sort_array");
                assert_eq!(args["order"], json!("desc"));
            }
            Action::Finish { .. } => panic!("expected tool action"),
        }
    }

    #[test]
    fn recognizes_a_fibonacci_write_mission() {
        let state = state_with_mission("Task 1: write the fibonacci sequence to fib.txt");
        let action = deterministic_fallback(&state).expect("recognized");
        match action {
            Action::Tool { tool_name, args } => {
                assert_eq!(tool_name, "write_file");
                assert_eq!(args["path"], json!("fib.txt"));
                assert!(args["content"].as_str().unwrap().starts_with("0,1,1,2"));
            }
            Action::Finish { .. } => panic!("expected tool action"),
        }
    }

    #[test]
    fn unrecognized_mission_shape_yields_none() {
        let state = state_with_mission("Task 1: perform unknown operation now");
        assert!(deterministic_fallback(&state).is_none());
    }

    #[test]
    fn pending_memoization_takes_priority() {
        let mut state = state_with_mission("Task 1: write the fibonacci sequence to fib.txt");
        state.policy_flags.memo_required = true;
        state.policy_flags.memo_required_key = Some("write_file:fib.txt".to_string());
        let action = deterministic_fallback(&state).expect("recognized");
        assert!(matches!(action, Action::Tool { tool_name, .. } if tool_name == "memoize"));
    }
}
