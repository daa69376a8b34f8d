//! `math_stats`: summary statistics over a list of numbers.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tool::Tool;

#[derive(Debug, Deserialize)]
struct Args {
    numbers: Vec<f64>,
}

/// `math_stats{numbers} -> {mean, min, max, sum, count}`.
#[derive(Debug, Default)]
pub struct MathStatsTool;

#[async_trait]
impl Tool for MathStatsTool {
    fn name(&self) -> &str {
        "math_stats"
    }

    fn description(&self) -> &str {
        "math_stats{numbers} -> {mean, min, max, sum, count}"
    }

    async fn call(&self, args: &Value) -> Value {
        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
        };
        if args.numbers.is_empty() {
            return json!({ "error": "numbers must be non-empty" });
        }
        let count = args.numbers.len();
        let sum: f64 = args.numbers.iter().sum();
        let mean = sum / count as f64;
        let min = args.numbers.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = args
            .numbers
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        json!({ "mean": mean, "min": min, "max": max, "sum": sum, "count": count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn computes_summary_stats() {
        let out = MathStatsTool
            .call(&json!({"numbers": [1.0, 2.0, 3.0, 4.0]}))
            .await;
        assert_eq!(out["mean"], json!(2.5));
        assert_eq!(out["min"], json!(1.0));
        assert_eq!(out["max"], json!(4.0));
        assert_eq!(out["sum"], json!(10.0));
        assert_eq!(out["count"], json!(4));
    }

    #[tokio::test]
    async fn empty_input_is_an_error() {
        let out = MathStatsTool.call(&json!({"numbers": []})).await;
        assert!(out.get("error").is_some());
    }
}
