//! Canonical run-state shape and the defaulting function that repairs
//! partial or deserialized snapshots before every node runs (C1).
//!
//! Every field carries `#[serde(default)]` so a checkpoint loaded back from
//! disk — or a state value a caller hand-constructs — never needs a full
//! literal to round-trip. [`ensure_state_defaults`] additionally makes sure
//! every nested `HashMap` entry a node might index with `[]` already exists,
//! the same "treat incoming state as an untrusted partial mapping" posture
//! the teacher applies in `Agent::try_build`/`ensure_state_defaults`-style
//! repair passes.

pub mod message;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use message::{ChatMessage, MessageRole};

use crate::mission::StructuredPlan;

/// The planner's next proposed action, or a terminal finish.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    /// Invoke a tool by name with JSON arguments.
    Tool {
        /// Registry name of the tool to invoke.
        tool_name: String,
        /// Arguments, already alias-normalized.
        #[serde(default)]
        args: Value,
    },
    /// Terminate the run with a final answer.
    Finish {
        /// The answer text returned to the caller.
        answer: String,
    },
}

impl Action {
    /// True if this is a [`Action::Finish`].
    #[must_use]
    pub const fn is_finish(&self) -> bool {
        matches!(self, Self::Finish { .. })
    }
}

/// One entry of the append-only tool call ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolHistoryEntry {
    /// 1-based, dense call index.
    pub call_no: usize,
    /// Tool name.
    pub tool: String,
    /// Arguments passed to the tool.
    pub args: Value,
    /// The tool's result (success map, or a map containing `"error"`).
    pub result: Value,
}

/// One row of the mission-by-mission execution record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MissionReport {
    /// Index of the mission within `missions`.
    pub mission_id: usize,
    /// The mission text.
    pub mission: String,
    /// Tool names invoked on behalf of this mission, in order.
    pub used_tools: Vec<String>,
    /// Tool results recorded against this mission, in order.
    pub tool_results: Vec<Value>,
    /// The result value bound to this mission's completion, if any.
    pub result: Option<Value>,
}

/// A single memoization audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoEvent {
    /// Memo key.
    pub key: String,
    /// Memo namespace (`"run"` or `"cache"`).
    pub namespace: String,
    /// The tool (or pseudo-tool, e.g. `cache_reuse_hit`) that produced this event.
    pub source_tool: String,
    /// Step at which this event was recorded.
    pub step: usize,
    /// Content hash of the stored value, if applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_hash: Option<String>,
    /// ISO-8601 UTC timestamp.
    pub created_at: String,
}

/// Monotone counters for each retryable failure class.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryCounts {
    /// Malformed/invalid planner JSON.
    #[serde(default)]
    pub invalid_json: u32,
    /// Memoization policy reminders issued.
    #[serde(default)]
    pub memo_policy: u32,
    /// Duplicate tool calls suppressed.
    #[serde(default)]
    pub duplicate_tool: u32,
    /// Planner wall-clock timeouts.
    #[serde(default)]
    pub provider_timeout: u32,
    /// Content validation failures.
    #[serde(default)]
    pub content_validation: u32,
}

/// Cross-node guardrail flags and the last-executed-tool mirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyFlags {
    /// Whether the next tool call must be `memoize`.
    #[serde(default)]
    pub memo_required: bool,
    /// The key the policy engine suggested for the pending memoization.
    #[serde(default)]
    pub memo_required_key: Option<String>,
    /// Human-readable reason memoization is required.
    #[serde(default)]
    pub memo_required_reason: Option<String>,
    /// Count of successful `retrieve_memo` hits.
    #[serde(default)]
    pub memo_retrieve_hits: u32,
    /// Count of `retrieve_memo` misses.
    #[serde(default)]
    pub memo_retrieve_misses: u32,
    /// Count of cross-run cache-reuse hits.
    #[serde(default)]
    pub cache_reuse_hits: u32,
    /// Count of cross-run cache-reuse misses.
    #[serde(default)]
    pub cache_reuse_misses: u32,
    /// Whether the driver has fallen back to the deterministic generator
    /// because the planner timed out.
    #[serde(default)]
    pub planner_timeout_mode: bool,
    /// Name of the last tool executed.
    #[serde(default)]
    pub last_tool_name: Option<String>,
    /// Arguments of the last tool executed.
    #[serde(default)]
    pub last_tool_args: Option<Value>,
    /// Result of the last tool executed.
    #[serde(default)]
    pub last_tool_result: Option<Value>,
}

/// The single mutable object threaded through every node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Opaque identifier, stable across retries.
    pub run_id: String,
    /// Monotone counter over plan-node entries.
    #[serde(default)]
    pub step: usize,
    /// Ordered planner conversation.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Ordered top-level mission strings.
    #[serde(default)]
    pub missions: Vec<String>,
    /// Per-mission execution record, same length/order as `missions`.
    #[serde(default)]
    pub mission_reports: Vec<MissionReport>,
    /// Index of the mission currently in progress, or `-1`.
    #[serde(default = "default_active_mission_index")]
    pub active_mission_index: i64,
    /// Mission strings already satisfied, in completion order.
    #[serde(default)]
    pub completed_tasks: Vec<String>,
    /// Append-only, dense, 1-based tool call ledger.
    #[serde(default)]
    pub tool_history: Vec<ToolHistoryEntry>,
    /// Canonical `tool:args-json` signatures already executed this run.
    #[serde(default)]
    pub seen_tool_signatures: HashSet<String>,
    /// Per-tool invocation counts.
    #[serde(default)]
    pub tool_call_counts: HashMap<String, u64>,
    /// Memoization audit trail.
    #[serde(default)]
    pub memo_events: Vec<MemoEvent>,
    /// Retryable failure counters.
    #[serde(default)]
    pub retry_counts: RetryCounts,
    /// Guardrail flags.
    #[serde(default)]
    pub policy_flags: PolicyFlags,
    /// Serialized mission-parser output.
    #[serde(default)]
    pub structured_plan: Option<StructuredPlan>,
    /// The planner's next proposed action, or `None`.
    #[serde(default)]
    pub pending_action: Option<Action>,
    /// Terminal summary string; non-empty once the run has finalized.
    #[serde(default)]
    pub final_answer: String,
}

const fn default_active_mission_index() -> i64 {
    -1
}

/// Build a fresh [`RunState`] for a new run.
///
/// Mirrors the teacher's `TaskStep`/`SystemPromptStep` seeding: the system
/// prompt and the user's task list are pushed onto `messages` before any
/// node runs.
#[must_use]
pub fn new_run_state(system_prompt: &str, user_input: &str, run_id: Option<String>) -> RunState {
    let run_id = run_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    RunState {
        run_id,
        step: 0,
        messages: vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_input),
        ],
        missions: Vec::new(),
        mission_reports: Vec::new(),
        active_mission_index: -1,
        completed_tasks: Vec::new(),
        tool_history: Vec::new(),
        seen_tool_signatures: HashSet::new(),
        tool_call_counts: HashMap::new(),
        memo_events: Vec::new(),
        retry_counts: RetryCounts::default(),
        policy_flags: PolicyFlags::default(),
        structured_plan: None,
        pending_action: None,
        final_answer: String::new(),
    }
}

/// Repair a possibly partial/deserialized state so every node can rely on
/// every collection and counter being present. Idempotent.
pub fn ensure_state_defaults(state: &mut RunState) {
    if state.run_id.trim().is_empty() {
        state.run_id = uuid::Uuid::new_v4().to_string();
    }
    if state.mission_reports.len() < state.missions.len() {
        state.mission_reports.resize_with(state.missions.len(), || {
            MissionReport::default()
        });
        for (i, report) in state.mission_reports.iter_mut().enumerate() {
            if report.mission.is_empty() {
                report.mission_id = i;
                report.mission = state.missions.get(i).cloned().unwrap_or_default();
            }
        }
    }
    if state.active_mission_index < -1 {
        state.active_mission_index = -1;
    }
}
