//! Fixed tool registry plus the planner action schema: strict validation,
//! alias repair, lenient JSON extraction, and per-tool argument
//! normalization (C6).

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ActionParseError;
use crate::state::Action;

/// A deterministic, total tool executor.
///
/// Implementations must be total over well-formed arguments: malformed or
/// missing fields are reported as `{"error": "..."}` in the returned value
/// rather than panicking, mirroring the teacher's `Tool::call` contract.
/// Side-effecting tools must be idempotent for identical arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The name this tool is registered under.
    fn name(&self) -> &str;
    /// A one-line human-readable description, used to build the system prompt.
    fn description(&self) -> &str;
    /// Execute against `args`, returning a success map or `{"error": ...}`.
    async fn call(&self, args: &Value) -> Value;
}

/// A boxed, type-erased [`Tool`].
pub type BoxedTool = Box<dyn Tool>;

/// Fixed `name -> Tool` mapping the driver is agnostic to the contents of.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, BoxedTool>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tool`, replacing any existing tool of the same name.
    pub fn register(&mut self, tool: BoxedTool) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BoxedTool> {
        self.tools.get(name)
    }

    /// True iff `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted for stable system-prompt rendering.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// `name: description` lines, sorted by name, for the system prompt.
    #[must_use]
    pub fn describe(&self) -> Vec<String> {
        let mut entries: Vec<(&str, &str)> = self
            .tools
            .values()
            .map(|t| (t.name(), t.description()))
            .collect();
        entries.sort_unstable_by_key(|(name, _)| *name);
        entries
            .into_iter()
            .map(|(name, desc)| format!("{name}: {desc}"))
            .collect()
    }
}

/// Scan `text` for the first balanced top-level `{...}` object, tracking
/// string literals and escapes so braces inside strings don't confuse the
/// scan. Returns the matched slice, unparsed.
#[must_use]
pub fn extract_first_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        let ch = byte as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Repair well-known aliases before schema validation (§4.6):
/// - `tool_name` absent but `action` names a known tool → treat as a tool
///   action with that name.
/// - `action:"tool"` with no `tool_name` but a `name` field → promote
///   `name` into `tool_name`.
fn repair_action_aliases(obj: &mut Map<String, Value>, known_tools: &[String]) {
    let action = obj.get("action").and_then(Value::as_str).map(str::to_lowercase);

    if let Some(action) = &action {
        if action != "tool" && action != "finish" && known_tools.iter().any(|t| t == action) {
            let args = obj.remove("args").unwrap_or_else(|| Value::Object(Map::new()));
            obj.clear();
            obj.insert("action".to_string(), Value::String("tool".to_string()));
            obj.insert("tool_name".to_string(), Value::String(action.clone()));
            obj.insert("args".to_string(), args);
            return;
        }
    }

    if action.as_deref() == Some("tool") && !obj.contains_key("tool_name") {
        if let Some(name) = obj.remove("name") {
            obj.insert("tool_name".to_string(), name);
        }
    }
}

/// Rewrite `args` aliases into their canonical field name for `tool_name`,
/// in place (§4.6). Unknown tools are left untouched.
pub fn normalize_args(tool_name: &str, args: &mut Map<String, Value>) {
    let mut rename = |from: &str, to: &str| {
        if !args.contains_key(to) {
            if let Some(value) = args.remove(from) {
                args.insert(to.to_string(), value);
            }
        }
    };

    match tool_name {
        "sort_array" => {
            rename("array", "items");
            rename("values", "items");
        }
        "repeat_message" => {
            rename("text", "message");
        }
        "string_ops" | "text_analysis" | "data_analysis" | "regex_matcher" => {
            rename("op", "operation");
            rename("regex", "pattern");
            rename("data", "numbers");
            rename("values", "numbers");
        }
        "write_file" => {
            rename("file_path", "path");
            rename("filename", "path");
            rename("text", "content");
            rename("data", "content");
        }
        "memoize" => {
            rename("data", "value");
        }
        _ => {}
    }
}

/// Parse a raw planner response into an [`Action`], applying lenient JSON
/// extraction, alias repair, and per-tool argument normalization.
///
/// # Errors
/// Returns [`ActionParseError`] if no JSON object can be extracted, the
/// object is malformed JSON, `action` is unrecognized, or a required field
/// is missing.
pub fn parse_action(raw: &str, known_tools: &[String]) -> Result<Action, ActionParseError> {
    let candidate = extract_first_json_object(raw).ok_or(ActionParseError::NoJsonObject)?;
    let value: Value = serde_json::from_str(candidate)?;
    let mut obj = match value {
        Value::Object(obj) => obj,
        _ => return Err(ActionParseError::NoJsonObject),
    };

    repair_action_aliases(&mut obj, known_tools);

    let action = obj
        .get("action")
        .and_then(Value::as_str)
        .map(str::to_lowercase)
        .ok_or_else(|| ActionParseError::UnknownAction(String::new()))?;

    match action.as_str() {
        "tool" => {
            if let Some(extra) = obj.keys().find(|k| !["action", "tool_name", "args"].contains(&k.as_str())) {
                return Err(ActionParseError::UnexpectedField(extra.clone()));
            }
            let tool_name = obj
                .get("tool_name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or(ActionParseError::MissingToolName)?;
            let mut args = match obj.remove("args") {
                Some(Value::Object(m)) => m,
                Some(Value::Null) | None => Map::new(),
                Some(other) => {
                    let mut m = Map::new();
                    m.insert("value".to_string(), other);
                    m
                }
            };
            normalize_args(&tool_name, &mut args);
            Ok(Action::Tool {
                tool_name,
                args: Value::Object(args),
            })
        }
        "finish" => {
            if let Some(extra) = obj.keys().find(|k| !["action", "answer"].contains(&k.as_str())) {
                return Err(ActionParseError::UnexpectedField(extra.clone()));
            }
            let answer = obj
                .get("answer")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or(ActionParseError::MissingAnswer)?;
            Ok(Action::Finish { answer })
        }
        other => Err(ActionParseError::UnknownAction(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes args back"
        }
        async fn call(&self, args: &Value) -> Value {
            args.clone()
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Echo));
        assert!(registry.contains("echo"));
        assert_eq!(registry.names(), vec!["echo"]);
    }

    #[test]
    fn extracts_balanced_object_ignoring_braces_in_strings() {
        let text = r#"here is my answer: {"action":"finish","answer":"the value is {x}"} thanks"#;
        let extracted = extract_first_json_object(text).expect("found");
        let value: Value = serde_json::from_str(extracted).expect("valid json");
        assert_eq!(value["answer"], json!("the value is {x}"));
    }

    #[test]
    fn no_object_in_text_is_an_error() {
        let err = parse_action("no json here", &[]).unwrap_err();
        assert!(matches!(err, ActionParseError::NoJsonObject));
    }

    #[test]
    fn tool_action_parses_and_normalizes_args() {
        let raw = r#"{"action":"tool","tool_name":"sort_array","args":{"array":[3,1,2]}}"#;
        let action = parse_action(raw, &[]).expect("parses");
        match action {
            Action::Tool { tool_name, args } => {
                assert_eq!(tool_name, "sort_array");
                assert_eq!(args["items"], json!([3, 1, 2]));
            }
            Action::Finish { .. } => panic!("expected tool action"),
        }
    }

    #[test]
    fn bare_tool_name_as_action_is_repaired() {
        let known = vec!["repeat_message".to_string()];
        let raw = r#"{"action":"repeat_message","args":{"text":"hi"}}"#;
        let action = parse_action(raw, &known).expect("parses");
        match action {
            Action::Tool { tool_name, args } => {
                assert_eq!(tool_name, "repeat_message");
                assert_eq!(args["message"], json!("hi"));
            }
            Action::Finish { .. } => panic!("expected tool action"),
        }
    }

    #[test]
    fn name_field_promoted_to_tool_name() {
        let raw = r#"{"action":"tool","name":"repeat_message","args":{"message":"hi"}}"#;
        let action = parse_action(raw, &[]).expect("parses");
        assert!(matches!(action, Action::Tool { tool_name, .. } if tool_name == "repeat_message"));
    }

    #[test]
    fn finish_action_requires_answer() {
        let raw = r#"{"action":"finish"}"#;
        let err = parse_action(raw, &[]).unwrap_err();
        assert!(matches!(err, ActionParseError::MissingAnswer));
    }

    #[test]
    fn unknown_action_is_rejected() {
        let raw = r#"{"action":"dance"}"#;
        let err = parse_action(raw, &[]).unwrap_err();
        assert!(matches!(err, ActionParseError::UnknownAction(_)));
    }

    #[test]
    fn finish_action_rejects_extra_top_level_fields() {
        let raw = r#"{"action":"finish","answer":"x","foo":1}"#;
        let err = parse_action(raw, &[]).unwrap_err();
        assert!(matches!(err, ActionParseError::UnexpectedField(f) if f == "foo"));
    }

    #[test]
    fn tool_action_rejects_extra_top_level_fields() {
        let raw = r#"{"action":"tool","tool_name":"echo","args":{},"foo":1}"#;
        let err = parse_action(raw, &[]).unwrap_err();
        assert!(matches!(err, ActionParseError::UnexpectedField(f) if f == "foo"));
    }
}
