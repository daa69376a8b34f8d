//! `regex_matcher`: lists every match of a regular expression in text.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tool::Tool;

#[derive(Debug, Deserialize)]
struct Args {
    pattern: String,
    text: String,
}

/// `regex_matcher{pattern, text} -> {matches: [string]}`.
#[derive(Debug, Default)]
pub struct RegexMatcherTool;

#[async_trait]
impl Tool for RegexMatcherTool {
    fn name(&self) -> &str {
        "regex_matcher"
    }

    fn description(&self) -> &str {
        "regex_matcher{pattern, text} -> {matches: [string]}"
    }

    async fn call(&self, args: &Value) -> Value {
        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
        };
        let re = match Regex::new(&args.pattern) {
            Ok(re) => re,
            Err(e) => return json!({ "error": format!("invalid pattern: {e}") }),
        };
        let matches: Vec<&str> = re.find_iter(&args.text).map(|m| m.as_str()).collect();
        json!({ "matches": matches })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finds_every_match() {
        let out = RegexMatcherTool
            .call(&json!({"pattern": r"\d+", "text": "a1 b22 c333"}))
            .await;
        assert_eq!(out["matches"], json!(["1", "22", "333"]));
    }

    #[tokio::test]
    async fn invalid_pattern_is_an_error() {
        let out = RegexMatcherTool
            .call(&json!({"pattern": "(", "text": "abc"}))
            .await;
        assert!(out.get("error").is_some());
    }
}
