//! Mission tracker (§4.8.3): the driver's notion of "next incomplete
//! mission" plus the helpers that bind a tool event to a mission report.
//!
//! Modeled as free functions rather than a back-reference from the state
//! to the driver, resolving the driver/tracker cyclic-dependency design
//! note by keeping the tracker ignorant of the orchestrator entirely.

use serde_json::Value;

use crate::state::RunState;

/// Index of the first mission whose report has no result yet, or `None`
/// if every mission is complete.
#[must_use]
pub fn next_incomplete_mission(state: &RunState) -> Option<usize> {
    state.mission_reports.iter().position(|r| r.result.is_none())
}

/// True iff `tool_name`'s successful `result` should mark the active
/// mission complete, per the helper-tool carve-out in §4.8.3.
#[must_use]
pub fn tool_completes_mission(
    tool_name: &str,
    result: &Value,
    mission_text: &str,
    memo_required: bool,
) -> bool {
    if result.get("error").is_some() {
        return false;
    }
    let lowered = mission_text.to_lowercase();
    match tool_name {
        "memoize" => memo_required || lowered.contains("memo"),
        "retrieve_memo" => {
            lowered.contains("retrieve") || lowered.contains("lookup") || lowered.contains("memo")
        }
        _ => true,
    }
}

/// Bind `tool`'s `result` to mission `idx`, mark it complete, and append
/// its text to `completed_tasks`. A no-op if `idx` is out of range.
pub fn mark_mission_complete(state: &mut RunState, idx: usize, tool: &str, result: Value) {
    if let Some(report) = state.mission_reports.get_mut(idx) {
        report.used_tools.push(tool.to_string());
        report.tool_results.push(result.clone());
        report.result = Some(result);
    }
    if let Some(mission) = state.missions.get(idx).cloned() {
        state.completed_tasks.push(mission);
    }
    state.active_mission_index = idx as i64;
}

/// Record `tool`'s `result` against mission `idx` without completing it
/// (the helper-tool "doesn't by itself finish the mission" case).
pub fn record_mission_tool_event(state: &mut RunState, idx: usize, tool: &str, result: Value) {
    if let Some(report) = state.mission_reports.get_mut(idx) {
        report.used_tools.push(tool.to_string());
        report.tool_results.push(result);
    }
}
