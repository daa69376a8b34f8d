//! `data_analysis`: mean/median/standard-deviation over a list of numbers.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tool::Tool;

#[derive(Debug, Deserialize)]
struct Args {
    numbers: Vec<f64>,
}

/// `data_analysis{numbers} -> {mean, median, stddev, count}`.
#[derive(Debug, Default)]
pub struct DataAnalysisTool;

#[async_trait]
impl Tool for DataAnalysisTool {
    fn name(&self) -> &str {
        "data_analysis"
    }

    fn description(&self) -> &str {
        "data_analysis{numbers} -> {mean, median, stddev, count}"
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
        let mean = args.numbers.iter().sum::<f64>() / count as f64;

        let mut sorted = args.numbers.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite input"));
        let median = if count % 2 == 0 {
            (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
        } else {
            sorted[count / 2]
        };

        let variance =
            args.numbers.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / count as f64;
        let stddev = variance.sqrt();

        json!({ "mean": mean, "median": median, "stddev": stddev, "count": count })
    }
}
