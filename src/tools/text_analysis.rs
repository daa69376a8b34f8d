//! `text_analysis`: basic word/char/line counts.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tool::Tool;

#[derive(Debug, Deserialize)]
struct Args {
    text: String,
}

/// `text_analysis{text} -> {word_count, char_count, line_count}`.
#[derive(Debug, Default)]
pub struct TextAnalysisTool;

#[async_trait]
impl Tool for TextAnalysisTool {
    fn name(&self) -> &str {
        "text_analysis"
    }

    fn description(&self) -> &str {
        "text_analysis{text} -> {word_count, char_count, line_count}"
    }

    async fn call(&self, args: &Value) -> Value {
        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
        };
        let word_count = args.text.split_whitespace().count();
        let char_count = args.text.chars().count();
        let line_count = if args.text.is_empty() {
            0
        } else {
            args.text.lines().count()
        };
        json!({
            "word_count": word_count,
            "char_count": char_count,
            "line_count": line_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_words_chars_and_lines() {
        let out = TextAnalysisTool
            .call(&json!({"text": "hello world\nsecond line"}))
            .await;
        assert_eq!(out["word_count"], json!(4));
        assert_eq!(out["line_count"], json!(2));
    }

    #[tokio::test]
    async fn empty_text_has_zero_lines() {
        let out = TextAnalysisTool.call(&json!({"text": ""})).await;
        assert_eq!(out["line_count"], json!(0));
    }
}
