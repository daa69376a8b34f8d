//! Memoization policy: deterministic rules deciding when a tool result must
//! be memoized before the run may progress, and stable key derivation (C4).

use serde_json::Value;

use crate::canonical::hash_json;

/// Deterministic rules for deciding when memoization must occur.
#[derive(Debug, Clone, Copy)]
pub struct MemoizationPolicy {
    /// How many reminder retries the execute node tolerates before raising
    /// `MemoizationPolicyViolation`.
    pub max_policy_retries: u32,
}

impl Default for MemoizationPolicy {
    fn default() -> Self {
        Self {
            max_policy_retries: 2,
        }
    }
}

impl MemoizationPolicy {
    /// Create a policy with a custom retry budget.
    #[must_use]
    pub const fn new(max_policy_retries: u32) -> Self {
        Self { max_policy_retries }
    }

    /// Return `true` iff `tool_name`/`args`/`result` must be memoized
    /// before the run may progress.
    ///
    /// Only `write_file` results are ever heavy enough to require it: a
    /// `"fib"` substring in the path, a long or comma-dense content body,
    /// or (when content itself isn't available) a result message that
    /// confirms a substantial write occurred.
    #[must_use]
    pub fn requires_memoization(&self, tool_name: &str, args: &Value, result: &Value) -> bool {
        if tool_name != "write_file" {
            return false;
        }

        let path = args.get("path").and_then(Value::as_str).unwrap_or("");
        let content = args.get("content").and_then(Value::as_str).unwrap_or("");

        if path.to_lowercase().contains("fib") {
            return true;
        }
        if content.len() >= 400 {
            return true;
        }
        if content.chars().filter(|&c| c == ',').count() > 20 {
            return true;
        }

        let result_message = result
            .get("result")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        if result_message.contains("wrote") {
            return content.len() >= 200;
        }

        false
    }

    /// Derive a stable memoization key for `tool_name`/`args`/`result`.
    ///
    /// For `write_file` with a non-empty path, the key is path-addressed so
    /// a later run can look it up by path alone. Otherwise it is content
    /// addressed off the first 12 hex characters of the args/result hash.
    #[must_use]
    pub fn suggested_memo_key(&self, tool_name: &str, args: &Value, result: &Value) -> String {
        if tool_name == "write_file" {
            let path = args.get("path").and_then(Value::as_str).unwrap_or("").trim();
            if !path.is_empty() {
                return format!("write_file:{path}");
            }
        }
        let digest = hash_json(&serde_json::json!({ "args": args, "result": result }))
            .unwrap_or_default();
        let prefix: String = digest.chars().take(12).collect();
        format!("{tool_name}:{prefix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_write_file_tools_never_require_memoization() {
        let policy = MemoizationPolicy::default();
        assert!(!policy.requires_memoization("sort_array", &json!({}), &json!({})));
    }

    #[test]
    fn fib_path_requires_memoization() {
        let policy = MemoizationPolicy::default();
        let args = json!({"path": "Fib.txt", "content": "0,1"});
        assert!(policy.requires_memoization("write_file", &args, &json!({})));
    }

    #[test]
    fn long_content_requires_memoization() {
        let policy = MemoizationPolicy::default();
        let content = "1".repeat(400);
        let args = json!({"path": "out.txt", "content": content});
        assert!(policy.requires_memoization("write_file", &args, &json!({})));
    }

    #[test]
    fn comma_dense_content_requires_memoization() {
        let policy = MemoizationPolicy::default();
        let content = (0..25).map(|i| i.to_string()).collect::<Vec<_>>().join(",");
        let args = json!({"path": "out.txt", "content": content});
        assert!(policy.requires_memoization("write_file", &args, &json!({})));
    }

    #[test]
    fn result_message_signal_needs_long_enough_content() {
        let policy = MemoizationPolicy::default();
        let content = "x".repeat(200);
        let args = json!({"path": "out.txt", "content": content});
        let result = json!({"result": "wrote 200 bytes"});
        assert!(policy.requires_memoization("write_file", &args, &result));

        let short_args = json!({"path": "out.txt", "content": "short"});
        assert!(!policy.requires_memoization("write_file", &short_args, &result));
    }

    #[test]
    fn ordinary_write_does_not_require_memoization() {
        let policy = MemoizationPolicy::default();
        let args = json!({"path": "out.txt", "content": "hello"});
        assert!(!policy.requires_memoization("write_file", &args, &json!({})));
    }

    #[test]
    fn suggested_key_is_path_addressed_for_write_file() {
        let policy = MemoizationPolicy::default();
        let args = json!({"path": "fib.txt"});
        assert_eq!(
            policy.suggested_memo_key("write_file", &args, &json!({})),
            "write_file:fib.txt"
        );
    }

    #[test]
    fn suggested_key_is_content_addressed_otherwise() {
        let policy = MemoizationPolicy::default();
        let key = policy.suggested_memo_key("sort_array", &json!({"items": [1, 2]}), &json!({}));
        assert!(key.starts_with("sort_array:"));
        assert_eq!(key.len(), "sort_array:".len() + 12);
    }
}
