//! Structured extraction of top-level tasks and sub-tasks from free text
//! (C5): numbered/bulleted top-level steps, nested sub-tasks, multi-line
//! description continuation, keyword-driven tool suggestion, and
//! sibling-order dependency wiring, guarded by a wall-clock timeout with a
//! legacy-regex and single-mission fallback.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::MissionParseError;

/// How a [`StructuredPlan`] was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsingMethod {
    /// Numbered or bulleted top-level steps were found and fully parsed.
    Structured,
    /// Only the legacy regex extractor (or the single-mission fallback)
    /// produced anything.
    RegexFallback,
}

/// One parsed task or sub-task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Step id, e.g. `"1"`, `"1a"`, `"1.2"`.
    pub id: String,
    /// The step's description text.
    pub description: String,
    /// The parent step id, for sub-tasks.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Tool names suggested by keyword match against the description.
    #[serde(default)]
    pub suggested_tools: Vec<String>,
    /// Ids of steps that must complete before this one.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Always `"pending"` at parse time.
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "pending".to_string()
}

/// The mission parser's complete output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredPlan {
    /// Every parsed step, top-level and nested, in document order.
    pub steps: Vec<Step>,
    /// Backward-compatible ordered list of top-level mission strings.
    pub flat_missions: Vec<String>,
    /// Which parsing layer ultimately produced `steps`.
    pub parsing_method: ParsingMethod,
}

const KEYWORD_TOOLS: &[(&str, &[&str])] = &[
    ("fibonacci", &["write_file", "math_stats"]),
    ("sort", &["sort_array"]),
    ("json", &["json_parser"]),
    ("regex", &["regex_matcher"]),
    ("repeat", &["repeat_message"]),
    ("uppercase", &["string_ops"]),
    ("lowercase", &["string_ops"]),
    ("reverse", &["string_ops"]),
    ("statistic", &["math_stats"]),
    ("average", &["math_stats"]),
    ("analy", &["text_analysis"]),
    ("data", &["data_analysis"]),
    ("memo", &["memoize"]),
    ("retrieve", &["retrieve_memo"]),
    ("lookup", &["retrieve_memo"]),
    ("write", &["write_file"]),
];

/// Assign tool suggestions to `description` via fixed substring match,
/// order-preserving and de-duplicated.
fn suggest_tools(description: &str) -> Vec<String> {
    let lowered = description.to_lowercase();
    let mut out = Vec::new();
    for (keyword, tools) in KEYWORD_TOOLS {
        if lowered.contains(keyword) {
            for tool in *tools {
                if !out.iter().any(|t: &String| t == tool) {
                    out.push((*tool).to_string());
                }
            }
        }
    }
    out
}

/// Wire sibling dependencies: within each group of steps sharing the same
/// `parent_id`, step *i* depends on step *i-1*; the first child of a parent
/// additionally depends on the parent.
fn wire_dependencies(steps: &mut [Step]) {
    use std::collections::HashMap;
    let mut groups: HashMap<Option<String>, Vec<usize>> = HashMap::new();
    for (idx, step) in steps.iter().enumerate() {
        groups.entry(step.parent_id.clone()).or_default().push(idx);
    }
    for (parent, indices) in groups {
        for (pos, &idx) in indices.iter().enumerate() {
            if pos > 0 {
                let prev_id = steps[indices[pos - 1]].id.clone();
                steps[idx].dependencies.push(prev_id);
            } else if let Some(parent_id) = &parent {
                steps[idx].dependencies.push(parent_id.clone());
            }
        }
    }
}

fn leading_indent(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

struct NumberedMatch {
    id: String,
    description: String,
}

fn match_numbered_top_level(trimmed: &str) -> Option<NumberedMatch> {
    static PATTERNS: std::sync::OnceLock<Vec<Regex>> = std::sync::OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"(?i)^Task\s+(\d+)\s*:\s*(.*)$").expect("valid regex"),
            Regex::new(r"^(\d+)\.\s*(.*)$").expect("valid regex"),
            Regex::new(r"^(\d+)\)\s*(.*)$").expect("valid regex"),
            Regex::new(r"^(\d+)-\s*(.*)$").expect("valid regex"),
            Regex::new(r"^(\d+):\s*(.*)$").expect("valid regex"),
        ]
    });
    for pattern in patterns {
        if let Some(caps) = pattern.captures(trimmed) {
            return Some(NumberedMatch {
                id: caps[1].to_string(),
                description: caps[2].trim().to_string(),
            });
        }
    }
    None
}

fn match_bullet_top_level(trimmed: &str) -> Option<String> {
    for prefix in ['-', '*', '+'] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return Some(rest.trim().to_string());
        }
    }
    None
}

struct SubtaskMatch {
    parent_id: String,
    id: String,
    description: String,
}

fn match_subtask(trimmed: &str) -> Option<SubtaskMatch> {
    static PATTERNS: std::sync::OnceLock<Vec<Regex>> = std::sync::OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"^(\d+)([a-z])\.\s*(.*)$").expect("valid regex"),
            Regex::new(r"^(\d+)([a-z])\)\s*(.*)$").expect("valid regex"),
            Regex::new(r"^(\d+)\.(\d+)\.?\s*(.*)$").expect("valid regex"),
        ]
    });
    for pattern in patterns {
        if let Some(caps) = pattern.captures(trimmed) {
            let parent_id = caps[1].to_string();
            let suffix = &caps[2];
            let description = caps[3].trim().to_string();
            return Some(SubtaskMatch {
                id: format!("{parent_id}{suffix}"),
                parent_id,
                description,
            });
        }
    }
    None
}

/// Try the numbered/bulleted layers plus nested sub-tasks and multi-line
/// continuation. Returns `None` if neither numbered nor bulleted top-level
/// steps were found anywhere in `text`.
fn parse_structured(text: &str) -> Option<Vec<Step>> {
    let lines: Vec<&str> = text.lines().collect();

    let any_numbered = lines
        .iter()
        .any(|l| leading_indent(l) == 0 && match_numbered_top_level(l.trim()).is_some());

    let mut steps: Vec<Step> = Vec::new();
    let mut id_to_idx: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    if any_numbered {
        for line in &lines {
            let indent = leading_indent(line);
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if indent == 0 {
                if let Some(m) = match_numbered_top_level(trimmed) {
                    let step = Step {
                        id: m.id.clone(),
                        description: m.description,
                        parent_id: None,
                        suggested_tools: Vec::new(),
                        dependencies: Vec::new(),
                        status: default_status(),
                    };
                    id_to_idx.insert(m.id, steps.len());
                    steps.push(step);
                    continue;
                }
            } else if let Some(m) = match_subtask(trimmed) {
                let step = Step {
                    id: m.id.clone(),
                    description: m.description,
                    parent_id: Some(m.parent_id),
                    suggested_tools: Vec::new(),
                    dependencies: Vec::new(),
                    status: default_status(),
                };
                id_to_idx.insert(m.id, steps.len());
                steps.push(step);
                continue;
            }
            // Layer 4: multi-line continuation onto the most recent step.
            if let Some(last) = steps.last_mut() {
                if !last.description.is_empty() {
                    last.description.push(' ');
                }
                last.description.push_str(trimmed);
            }
        }
        if !steps.is_empty() {
            for step in &mut steps {
                step.suggested_tools = suggest_tools(&step.description);
            }
            wire_dependencies(&mut steps);
            return Some(steps);
        }
    }

    // Layer 2: bullet lists, only consulted when layer 1 found nothing.
    let mut next_id = 1usize;
    for line in &lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(description) = match_bullet_top_level(trimmed) {
            steps.push(Step {
                id: next_id.to_string(),
                description,
                parent_id: None,
                suggested_tools: Vec::new(),
                dependencies: Vec::new(),
                status: default_status(),
            });
            next_id += 1;
            continue;
        }
        if let Some(last) = steps.last_mut() {
            if leading_indent(line) > 0 {
                if !last.description.is_empty() {
                    last.description.push(' ');
                }
                last.description.push_str(trimmed);
            }
        }
    }
    if steps.is_empty() {
        return None;
    }
    for step in &mut steps {
        step.suggested_tools = suggest_tools(&step.description);
    }
    wire_dependencies(&mut steps);
    Some(steps)
}

/// Legacy regex extractor, consulted only when §4.5 layers 1 and 2 both
/// produce nothing.
fn parse_regex_fallback(text: &str) -> Vec<Step> {
    let task_pattern = Regex::new(r"(?i)^task\s*\d+\s*:\s*(.*)$").expect("valid regex");
    let numbered_pattern = Regex::new(r"^\d+[)\.:\-\s]\s*(.*)$").expect("valid regex");

    let mut steps = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let description = task_pattern
            .captures(trimmed)
            .or_else(|| numbered_pattern.captures(trimmed))
            .map(|caps| caps[1].trim().to_string());
        if let Some(description) = description {
            let id = (steps.len() + 1).to_string();
            steps.push(Step {
                id,
                description,
                parent_id: None,
                suggested_tools: Vec::new(),
                dependencies: Vec::new(),
                status: default_status(),
            });
        }
    }
    for step in &mut steps {
        step.suggested_tools = suggest_tools(&step.description);
    }
    wire_dependencies(&mut steps);
    steps
}

fn flatten_missions(steps: &[Step]) -> Vec<String> {
    steps
        .iter()
        .filter(|s| s.parent_id.is_none())
        .map(|s| format!("Task {}: {}", s.id, s.description))
        .collect()
}

fn parse_sync(text: &str) -> StructuredPlan {
    if let Some(steps) = parse_structured(text) {
        let flat_missions = flatten_missions(&steps);
        return StructuredPlan {
            steps,
            flat_missions,
            parsing_method: ParsingMethod::Structured,
        };
    }

    let steps = parse_regex_fallback(text);
    if !steps.is_empty() {
        let flat_missions = flatten_missions(&steps);
        return StructuredPlan {
            steps,
            flat_missions,
            parsing_method: ParsingMethod::RegexFallback,
        };
    }

    let steps = vec![Step {
        id: "1".to_string(),
        description: "Primary mission".to_string(),
        parent_id: None,
        suggested_tools: Vec::new(),
        dependencies: Vec::new(),
        status: default_status(),
    }];
    let flat_missions = flatten_missions(&steps);
    StructuredPlan {
        steps,
        flat_missions,
        parsing_method: ParsingMethod::RegexFallback,
    }
}

fn fallback_plan() -> StructuredPlan {
    let steps = vec![Step {
        id: "1".to_string(),
        description: "Primary mission".to_string(),
        parent_id: None,
        suggested_tools: Vec::new(),
        dependencies: Vec::new(),
        status: default_status(),
    }];
    StructuredPlan {
        flat_missions: flatten_missions(&steps),
        steps,
        parsing_method: ParsingMethod::RegexFallback,
    }
}

/// Parse `text` into a [`StructuredPlan`], guarded by `timeout`.
///
/// Parsing runs on a dedicated thread so a pathological input (e.g.
/// catastrophic regex backtracking) cannot hang the caller: on timeout the
/// thread is abandoned and the single-mission fallback plan is returned,
/// the same "leaked background worker" posture the planner-call wrapper
/// uses for provider timeouts (§5).
///
/// # Errors
/// Never returns `Err` today — [`MissionParseError::Timeout`] is reserved
/// for callers that want to distinguish a timeout from a structured parse
/// and is surfaced only via [`parse_missions_checked`].
#[must_use]
pub fn parse_missions(text: &str, timeout: Duration) -> StructuredPlan {
    parse_missions_checked(text, timeout).unwrap_or_else(|_| fallback_plan())
}

/// Like [`parse_missions`] but reports the timeout explicitly instead of
/// silently substituting the fallback plan.
///
/// # Errors
/// Returns [`MissionParseError::Timeout`] if parsing does not complete
/// within `timeout`.
pub fn parse_missions_checked(
    text: &str,
    timeout: Duration,
) -> Result<StructuredPlan, MissionParseError> {
    let (tx, rx) = mpsc::channel();
    let owned = text.to_string();
    std::thread::spawn(move || {
        let result = std::panic::catch_unwind(|| parse_sync(&owned));
        let _ = tx.send(result.unwrap_or_else(|_| fallback_plan()));
    });

    let deadline = Instant::now() + timeout;
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(plan) => Ok(plan),
        Err(_) => Err(MissionParseError::Timeout(timeout)),
    }
}
