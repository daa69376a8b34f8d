//! `sort_array`: sorts a list of integers ascending or descending.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tool::Tool;

fn default_order() -> String {
    "asc".to_string()
}

#[derive(Debug, Deserialize)]
struct Args {
    items: Vec<i64>,
    #[serde(default = "default_order")]
    order: String,
}

/// `sort_array{items, order="asc"|"desc"} -> {result: sorted items}`.
#[derive(Debug, Default)]
pub struct SortArrayTool;

#[async_trait]
impl Tool for SortArrayTool {
    fn name(&self) -> &str {
        "sort_array"
    }

    fn description(&self) -> &str {
        "sort_array{items, order=asc|desc} -> {result: sorted items}"
    }

    async fn call(&self, args: &Value) -> Value {
        let args: Args = match serde_json::from_value(args.clone()) {
            Ok(a) => a,
            Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
        };
        let mut items = args.items;
        items.sort_unstable();
        if args.order.eq_ignore_ascii_case("desc") {
            items.reverse();
        }
        json!({ "result": items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sorts_ascending_by_default() {
        let out = SortArrayTool.call(&json!({"items": [3, 1, 2]})).await;
        assert_eq!(out["result"], json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn sorts_descending_when_requested() {
        let out = SortArrayTool
            .call(&json!({"items": [3, 1, 2], "order": "desc"}))
            .await;
        assert_eq!(out["result"], json!([3, 2, 1]));
    }

    #[tokio::test]
    async fn non_array_items_is_an_error() {
        let out = SortArrayTool.call(&json!({"items": "not an array"})).await;
        assert!(out.get("error").is_some());
    }
}
