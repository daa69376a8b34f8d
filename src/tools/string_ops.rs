//! `string_ops`: case conversion, reversal, and trimming.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tool::Tool;

#[derive(Debug, Deserialize)]
struct Args {
    text: String,
    operation: String,
}

/// `string_ops{text, operation: uppercase|lowercase|reverse|trim} -> {result}`.
#[derive(Debug, Default)]
pub struct StringOpsTool;

#[async_trait]
impl Tool for StringOpsTool {
    fn name(&self) -> &str {
        "string_ops"
    }

    fn description(&self) -> &str {
        "string_ops{text, operation: uppercase|lowercase|reverse|trim} -> {result}"
    }

    async fn call(&self, args: &Value) -> Value {
        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
        };
        let result = match args.operation.to_lowercase().as_str() {
            "uppercase" => args.text.to_uppercase(),
            "lowercase" => args.text.to_lowercase(),
            "reverse" => args.text.chars().rev().collect(),
            "trim" => args.text.trim().to_string(),
            other => return json!({ "error": format!("unknown operation '{other}'") }),
        };
        json!({ "result": result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uppercases() {
        let out = StringOpsTool
            .call(&json!({"text": "abc", "operation": "uppercase"}))
            .await;
        assert_eq!(out["result"], json!("ABC"));
    }

    #[tokio::test]
    async fn reverses() {
        let out = StringOpsTool
            .call(&json!({"text": "abc", "operation": "reverse"}))
            .await;
        assert_eq!(out["result"], json!("cba"));
    }

    #[tokio::test]
    async fn unknown_operation_is_an_error() {
        let out = StringOpsTool
            .call(&json!({"text": "abc", "operation": "shuffle"}))
            .await;
        assert!(out.get("error").is_some());
    }
}
