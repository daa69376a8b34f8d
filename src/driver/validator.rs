//! Mission content validator (§4.8.2): a purely deterministic check that a
//! `write_file` tool call aimed at a Fibonacci mission actually wrote a
//! correct sequence.

use serde_json::Value;

/// Validate `(tool_name, args, result)` against `mission_text`. Returns
/// `None` on pass, `Some(reason)` on failure. Only ever rejects a
/// successful `write_file` whose mission mentions "fibonacci".
#[must_use]
pub fn validate_mission_content(
    tool_name: &str,
    args: &Value,
    result: &Value,
    mission_text: &str,
) -> Option<String> {
    if tool_name != "write_file" {
        return None;
    }
    if result.get("error").is_some() {
        return None;
    }
    if !mission_text.to_lowercase().contains("fibonacci") {
        return None;
    }

    let content = args.get("content").and_then(Value::as_str).unwrap_or("");
    let tokens: Vec<&str> = if content.trim().is_empty() {
        Vec::new()
    } else {
        content.split(',').map(str::trim).collect()
    };

    let mut numbers = Vec::with_capacity(tokens.len());
    for token in &tokens {
        match token.parse::<i64>() {
            Ok(n) => numbers.push(n),
            Err(_) => return Some(format!("content is not a comma-separated integer list near '{token}'")),
        }
    }

    if numbers.len() != 100 {
        return Some(format!("expected 100 integers, found {}", numbers.len()));
    }
    if numbers[0] != 0 || numbers[1] != 1 {
        return Some("sequence must begin 0,1".to_string());
    }
    for i in 2..numbers.len() {
        let expected = numbers[i - 1] + numbers[i - 2];
        if numbers[i] != expected {
            return Some(format!(
                "index {i}: expected {expected} (x[{}]+x[{}]), found {}",
                i - 1,
                i - 2,
                numbers[i]
            ));
        }
    }
    None
}
