//! `json_parser`: parses a JSON text blob into a value.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tool::Tool;

#[derive(Debug, Deserialize)]
struct Args {
    text: String,
}

/// `json_parser{text} -> {value: <parsed JSON>}`.
#[derive(Debug, Default)]
pub struct JsonParserTool;

#[async_trait]
impl Tool for JsonParserTool {
    fn name(&self) -> &str {
        "json_parser"
    }

    fn description(&self) -> &str {
        "json_parser{text} -> {value: <parsed JSON>}"
    }

    async fn call(&self, args: &Value) -> Value {
        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
        };
        match serde_json::from_str::<Value>(&args.text) {
            Ok(value) => json!({ "value": value }),
            Err(e) => json!({ "error": format!("invalid JSON: {e}") }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_valid_json() {
        let out = JsonParserTool.call(&json!({"text": r#"{"a":1}"#})).await;
        assert_eq!(out["value"], json!({"a": 1}));
    }

    #[tokio::test]
    async fn invalid_json_is_an_error() {
        let out = JsonParserTool.call(&json!({"text": "{not json"})).await;
        assert!(out.get("error").is_some());
    }
}
