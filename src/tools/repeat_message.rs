//! `repeat_message`: echoes its input back verbatim.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tool::Tool;

#[derive(Debug, Deserialize)]
struct Args {
    message: String,
}

/// `repeat_message{message} -> {result: message}`.
#[derive(Debug, Default)]
pub struct RepeatMessageTool;

#[async_trait]
impl Tool for RepeatMessageTool {
    fn name(&self) -> &str {
        "repeat_message"
    }

    fn description(&self) -> &str {
        "repeat_message{message} -> {result: message}"
    }

    async fn call(&self, args: &Value) -> Value {
        match serde_json::from_value::<Args>(args.clone()) {
            Ok(a) => json!({ "result": a.message }),
            Err(e) => json!({ "error": format!("invalid arguments: {e}") }),
        }
    }
}
