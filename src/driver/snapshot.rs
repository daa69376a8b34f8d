//! Derived snapshot (§4.8.6): a local-only summary computed after the
//! graph terminates, without any further planner or store calls.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::state::RunState;

/// Summary object returned alongside a [`crate::driver::RunReport`].
#[derive(Debug, Clone, Serialize)]
pub struct DerivedSnapshot {
    /// The run this snapshot describes.
    pub run_id: String,
    /// The plan-node step counter at termination.
    pub step: usize,
    /// Total tool invocations recorded in `tool_history`.
    pub tools_used_count: usize,
    /// Per-tool invocation counts.
    pub tool_call_counts: HashMap<String, u64>,
    /// Distinct keys ever written via `memoize` this run.
    pub memo_entry_count: usize,
    /// Those keys, in first-write order.
    pub memo_keys: Vec<String>,
    /// Number of top-level missions.
    pub mission_count: usize,
    /// Duplicate tool calls suppressed.
    pub duplicate_tool_retries: u32,
    /// Memoization-policy reminder retries issued.
    pub memo_policy_retries: u32,
    /// Planner wall-clock timeouts encountered.
    pub provider_timeout_retries: u32,
    /// Content validation failures encountered.
    pub content_validation_retries: u32,
    /// Successful `retrieve_memo` calls.
    pub memo_retrieve_hits: u32,
    /// Missed `retrieve_memo` calls.
    pub memo_retrieve_misses: u32,
    /// Cross-run cache-reuse hits.
    pub cache_reuse_hits: u32,
    /// Cross-run cache-reuse misses.
    pub cache_reuse_misses: u32,
}

/// Compute the [`DerivedSnapshot`] for `state`.
///
/// `memo_entry_count`/`memo_keys` are derived from `memo_events` rather
/// than a fresh store read: only `memoize` ever writes into the run-scoped
/// namespace, and the store's upsert semantics mean the distinct key set
/// recorded here equals the row count a `ListEntries(run_id)` call would
/// return.
#[must_use]
pub fn compute_derived_snapshot(state: &RunState) -> DerivedSnapshot {
    let mut seen = HashSet::new();
    let memo_keys: Vec<String> = state
        .memo_events
        .iter()
        .filter(|e| e.source_tool == "memoize")
        .filter(|e| seen.insert(e.key.clone()))
        .map(|e| e.key.clone())
        .collect();

    DerivedSnapshot {
        run_id: state.run_id.clone(),
        step: state.step,
        tools_used_count: state.tool_history.len(),
        tool_call_counts: state.tool_call_counts.clone(),
        memo_entry_count: memo_keys.len(),
        memo_keys,
        mission_count: state.missions.len(),
        duplicate_tool_retries: state.retry_counts.duplicate_tool,
        memo_policy_retries: state.retry_counts.memo_policy,
        provider_timeout_retries: state.retry_counts.provider_timeout,
        content_validation_retries: state.retry_counts.content_validation,
        memo_retrieve_hits: state.policy_flags.memo_retrieve_hits,
        memo_retrieve_misses: state.policy_flags.memo_retrieve_misses,
        cache_reuse_hits: state.policy_flags.cache_reuse_hits,
        cache_reuse_misses: state.policy_flags.cache_reuse_misses,
    }
}
