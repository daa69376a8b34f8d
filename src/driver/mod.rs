//! Orchestrator graph driver (C8): the plan → execute → policy cycle that
//! coordinates a non-deterministic planner with deterministic tool
//! execution, enforcing every guardrail in §4.8 and persisting a
//! checkpoint after each node.
//!
//! Grounded on the teacher's graph-runner shape: a single mutable state
//! object threaded through named node functions, with every transition
//! appended to a durable log before the next node runs.

pub mod fallback;
pub mod shared_plan;
pub mod snapshot;
pub mod tracker;
pub mod validator;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::canonical::to_canonical_json;
use crate::checkpoint::{CheckpointSummary, SqliteCheckpointStore};
use crate::config::Config;
use crate::error::{OrchestratorError, PlannerError};
use crate::memo::{MemoEntrySummary, SqliteMemoStore, NAMESPACE_CACHE, NAMESPACE_RUN};
use crate::mission::parse_missions;
use crate::planner::{generate_with_timeout, is_unrecoverable, Planner};
use crate::policy::MemoizationPolicy;
use crate::state::{
    ensure_state_defaults, new_run_state, Action, ChatMessage, MemoEvent, MissionReport,
    RunState, ToolHistoryEntry,
};
use crate::tool::{parse_action, ToolRegistry};

use fallback::{auto_summary, deterministic_fallback};
use shared_plan::write_shared_plan;
use snapshot::{compute_derived_snapshot, DerivedSnapshot};
use tracker::{mark_mission_complete, next_incomplete_mission, record_mission_tool_event, tool_completes_mission};
use validator::validate_mission_content;

/// Everything a caller needs back from a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// The terminal answer text.
    pub answer: String,
    /// Every tool invocation, in call order.
    pub tools_used: Vec<ToolHistoryEntry>,
    /// Per-mission execution record.
    pub mission_report: Vec<MissionReport>,
    /// The run id this report describes.
    pub run_id: String,
    /// The in-memory memoization audit trail.
    pub memo_events: Vec<MemoEvent>,
    /// The memo store's run-scoped entries, read back after termination.
    pub memo_store_entries: Vec<MemoEntrySummary>,
    /// Local-state-only summary (§4.8.6).
    pub derived_snapshot: DerivedSnapshot,
    /// Every checkpoint written during this run, in write order.
    pub checkpoints: Vec<CheckpointSummary>,
    /// The final state, for callers that need more than the report exposes.
    pub state: RunState,
}

fn build_system_prompt(tools: &ToolRegistry) -> String {
    let tool_lines = tools.describe().join("\n");
    format!(
        "You are a deterministic task-executing planner. Available tools:\n{tool_lines}\n\n\
         Respond with exactly one JSON object and nothing else, no prose, no markdown fences:\n\
         - To call a tool: {{\"action\": \"tool\", \"tool_name\": \"<name>\", \"args\": {{...}}}}\n\
         - To finish: {{\"action\": \"finish\", \"answer\": \"<text>\"}}\n\n\
         Complete every task in order. If a tool result must be memoized before you may \
         continue, the next system message will name the exact key to use."
    )
}

fn progress_hint(state: &RunState) -> String {
    let completed = state.completed_tasks.len();
    let total = state.missions.len();
    match next_incomplete_mission(state) {
        Some(idx) => format!(
            "Progress: {completed}/{total} missions complete. Next task: {}",
            state.missions[idx]
        ),
        None => format!("Progress: {completed}/{total} missions complete. Respond with a finish action."),
    }
}

/// Coordinates a [`Planner`], a [`ToolRegistry`], and the durable memo and
/// checkpoint stores through the plan/execute/policy cycle.
pub struct Orchestrator {
    planner: Arc<dyn Planner>,
    tools: ToolRegistry,
    memo_store: Arc<SqliteMemoStore>,
    checkpoint_store: Arc<SqliteCheckpointStore>,
    policy: MemoizationPolicy,
    config: Config,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("tools", &self.tools)
            .field("config", &self.config)
            .finish()
    }
}

impl Orchestrator {
    /// Build a new orchestrator from its four collaborators and a [`Config`].
    #[must_use]
    pub fn new(
        planner: Arc<dyn Planner>,
        tools: ToolRegistry,
        memo_store: Arc<SqliteMemoStore>,
        checkpoint_store: Arc<SqliteCheckpointStore>,
        config: Config,
    ) -> Self {
        let policy = MemoizationPolicy::new(config.memo_max_policy_retries);
        Self {
            planner,
            tools,
            memo_store,
            checkpoint_store,
            policy,
            config,
        }
    }

    async fn checkpoint(&self, state: &RunState, node_name: &str) {
        if let Err(e) = self
            .checkpoint_store
            .save(&state.run_id, state.step, node_name, state)
            .await
        {
            warn!(error = %e, node = node_name, run_id = %state.run_id, "checkpoint write failed");
        }
    }

    fn record_tool_call(&self, state: &mut RunState, tool: &str, args: Value, result: Value) {
        let call_no = state.tool_history.len() + 1;
        state.tool_history.push(ToolHistoryEntry {
            call_no,
            tool: tool.to_string(),
            args,
            result,
        });
        *state.tool_call_counts.entry(tool.to_string()).or_insert(0) += 1;
    }

    /// Run the graph to completion for `user_input`, returning a
    /// [`RunReport`]. Only a guardrail breach (memoization policy exhausted,
    /// recursion limit exceeded) or a store failure escape as `Err`; every
    /// other failure mode resolves to a non-empty `final_answer` instead.
    ///
    /// # Errors
    /// See [`OrchestratorError`].
    #[instrument(skip(self, user_input), fields(run_id))]
    pub async fn run(
        &self,
        user_input: &str,
        run_id: Option<String>,
    ) -> Result<RunReport, OrchestratorError> {
        let system_prompt = build_system_prompt(&self.tools);
        let mut state = new_run_state(&system_prompt, user_input, run_id);
        tracing::Span::current().record("run_id", state.run_id.as_str());

        let plan = parse_missions(user_input, self.config.mission_parse_timeout);
        state.missions = plan.flat_missions.clone();
        state.mission_reports = state
            .missions
            .iter()
            .enumerate()
            .map(|(i, m)| MissionReport {
                mission_id: i,
                mission: m.clone(),
                ..Default::default()
            })
            .collect();
        state.structured_plan = Some(plan);
        debug!(missions = state.missions.len(), "mission parse complete");
        self.checkpoint(&state, "init").await;

        let mut cycles: usize = 0;
        loop {
            if cycles > self.config.max_steps {
                return Err(OrchestratorError::RecursionLimitExceeded(cycles));
            }

            self.plan_node(&mut state).await?;
            cycles += 1;
            if matches!(state.pending_action, Some(Action::Finish { .. })) {
                break;
            }

            self.execute_node(&mut state).await?;
            self.policy_node(&mut state).await;
        }

        self.finalize_node(&mut state).await;

        let derived_snapshot = compute_derived_snapshot(&state);
        let memo_store_entries = self
            .memo_store
            .list_entries(&state.run_id, NAMESPACE_RUN)
            .await
            .unwrap_or_default();
        let checkpoints = self
            .checkpoint_store
            .list(&state.run_id)
            .await
            .unwrap_or_default();

        Ok(RunReport {
            answer: state.final_answer.clone(),
            tools_used: state.tool_history.clone(),
            mission_report: state.mission_reports.clone(),
            run_id: state.run_id.clone(),
            memo_events: state.memo_events.clone(),
            memo_store_entries,
            derived_snapshot,
            checkpoints,
            state,
        })
    }

    /// Cross-run cache-reuse shortcut (§4.8 step 3): if the active mission
    /// is a `write_file` whose target path was already memoized by a prior
    /// run, replay it here instead of spending a planner call.
    async fn try_cache_reuse(&self, state: &mut RunState) -> bool {
        let Some(idx) = next_incomplete_mission(state) else {
            return false;
        };
        let mission_text = state.missions[idx].clone();
        if !mission_text.to_lowercase().contains("write") {
            return false;
        }
        let Some(path) = fallback::extract_path(&mission_text.to_lowercase()) else {
            return false;
        };
        let basename = Path::new(&path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or(&path)
            .to_string();
        let key = format!("write_file_input:{basename}");

        let Ok(lookup) = self.memo_store.get_latest(&key, NAMESPACE_CACHE).await else {
            state.policy_flags.cache_reuse_misses += 1;
            return false;
        };
        if !lookup.found {
            state.policy_flags.cache_reuse_misses += 1;
            return false;
        }
        let Some(value) = &lookup.value else {
            state.policy_flags.cache_reuse_misses += 1;
            return false;
        };
        let content = value.get("content").and_then(Value::as_str).unwrap_or("").to_string();
        if content.is_empty() {
            state.policy_flags.cache_reuse_misses += 1;
            return false;
        }
        let stored_path = value.get("path").and_then(Value::as_str).unwrap_or(&path).to_string();
        let args = json!({"path": stored_path, "content": content});
        let Some(tool) = self.tools.get("write_file") else {
            state.policy_flags.cache_reuse_misses += 1;
            return false;
        };
        let result = tool.call(&args).await;
        if validate_mission_content("write_file", &args, &result, &mission_text).is_some() {
            state.policy_flags.cache_reuse_misses += 1;
            return false;
        }

        state.policy_flags.cache_reuse_hits += 1;
        self.record_tool_call(state, "write_file", args.clone(), result.clone());
        mark_mission_complete(state, idx, "write_file", result);
        state.memo_events.push(MemoEvent {
            key,
            namespace: NAMESPACE_CACHE.to_string(),
            source_tool: "cache_reuse_hit".to_string(),
            step: state.step,
            value_hash: lookup.value_hash.clone(),
            created_at: Utc::now().to_rfc3339(),
        });
        // A reused write needed no planner turn to produce; if it was the
        // last outstanding mission, finish here too rather than spending a
        // planner call just to be told the run is done.
        if next_incomplete_mission(state).is_none() {
            state.pending_action = Some(Action::Finish {
                answer: auto_summary(state),
            });
        }
        true
    }

    #[instrument(skip(self, state), fields(run_id = %state.run_id, step = state.step))]
    async fn plan_node(&self, state: &mut RunState) -> Result<(), OrchestratorError> {
        ensure_state_defaults(state);

        if matches!(state.pending_action, Some(Action::Finish { .. })) {
            return Ok(());
        }

        state.step += 1;

        if self.try_cache_reuse(state).await {
            self.checkpoint(state, "plan_cache_reuse").await;
            return Ok(());
        }

        // Once the planner has proven unreliable enough to engage the
        // deterministic fallback, it is never consulted again to confirm
        // "are we done" — that is the one case where finishing without a
        // model turn is correct, since there is no healthy planner left to
        // ask. A healthy planner always gets the final word on finishing,
        // even once every mission is nominally complete, so its own
        // "finish" answer text is preserved.
        if state.policy_flags.planner_timeout_mode {
            if next_incomplete_mission(state).is_none() && !state.policy_flags.memo_required {
                state.pending_action = Some(Action::Finish {
                    answer: auto_summary(state),
                });
                self.checkpoint(state, "plan_all_complete").await;
                return Ok(());
            }
            if let Some(action) = deterministic_fallback(state) {
                state.pending_action = Some(action);
                self.checkpoint(state, "plan_timeout_fallback").await;
                return Ok(());
            }
        }

        state.messages.push(ChatMessage::system(progress_hint(state)));

        let messages = state.messages.clone();
        let outcome =
            generate_with_timeout(Arc::clone(&self.planner), messages, self.config.plan_call_timeout)
                .await;

        match outcome {
            Ok(text) => {
                state.messages.push(ChatMessage::assistant(text.clone()));
                state.policy_flags.planner_timeout_mode = false;
                let known_tools: Vec<String> = self.tools.names().into_iter().map(str::to_string).collect();
                match parse_action(&text, &known_tools) {
                    Ok(Action::Finish { answer }) if next_incomplete_mission(state).is_some() => {
                        let idx = next_incomplete_mission(state).expect("checked Some above");
                        state.messages.push(ChatMessage::system(format!(
                            "You cannot finish yet; the next incomplete task is: {}",
                            state.missions[idx]
                        )));
                        state.pending_action = None;
                        self.checkpoint(state, "plan_finish_rejected").await;
                    }
                    Ok(action) => {
                        state.pending_action = Some(action);
                        self.checkpoint(state, "plan").await;
                    }
                    Err(e) => {
                        state.retry_counts.invalid_json += 1;
                        if state.retry_counts.invalid_json > self.config.max_invalid_plan_retries {
                            state.pending_action = Some(Action::Finish {
                                answer: format!(
                                    "Run failed: planner output could not be parsed after {} retries ({e})",
                                    state.retry_counts.invalid_json
                                ),
                            });
                        } else {
                            state.messages.push(ChatMessage::system(format!(
                                "Invalid response ({e}). Respond with exactly one JSON object as instructed."
                            )));
                            state.pending_action = None;
                        }
                        self.checkpoint(state, "plan_invalid_output").await;
                    }
                }
            }
            Err(PlannerError::Timeout(_)) => {
                state.retry_counts.provider_timeout += 1;
                if let Some(action) = deterministic_fallback(state) {
                    state.policy_flags.planner_timeout_mode = true;
                    state.messages.push(ChatMessage::system(
                        "The planner timed out; continuing with a deterministic fallback.".to_string(),
                    ));
                    state.pending_action = Some(action);
                } else if state.retry_counts.provider_timeout >= self.config.max_provider_timeout_retries {
                    state.pending_action = Some(Action::Finish {
                        answer: format!(
                            "Run failed: exhausted provider timeout retries ({})",
                            state.retry_counts.provider_timeout
                        ),
                    });
                } else {
                    state.messages.push(ChatMessage::system(
                        "The planner timed out; respond with exactly one JSON object.".to_string(),
                    ));
                    state.pending_action = None;
                }
                self.checkpoint(state, "plan_provider_timeout").await;
            }
            Err(e) => {
                let message = e.to_string();
                if is_unrecoverable(&message, &self.config.unrecoverable_markers) {
                    state.pending_action = Some(Action::Finish {
                        answer: format!("Run failed: unrecoverable provider error ({message})"),
                    });
                    self.checkpoint(state, "plan_unrecoverable").await;
                } else {
                    state.retry_counts.invalid_json += 1;
                    if state.retry_counts.invalid_json > self.config.max_invalid_plan_retries {
                        state.pending_action = Some(Action::Finish {
                            answer: format!("Run failed: planner errored repeatedly ({message})"),
                        });
                    } else {
                        state.messages.push(ChatMessage::system(format!(
                            "Provider error ({message}); please retry with exactly one JSON object."
                        )));
                        state.pending_action = None;
                    }
                    self.checkpoint(state, "plan_recoverable_error").await;
                }
            }
        }

        Ok(())
    }

    #[instrument(skip(self, state), fields(run_id = %state.run_id, step = state.step))]
    async fn execute_node(&self, state: &mut RunState) -> Result<(), OrchestratorError> {
        ensure_state_defaults(state);

        let Some(action) = state.pending_action.clone() else {
            return Ok(());
        };
        let (tool_name, args) = match action {
            Action::Finish { answer } => {
                state.final_answer = answer;
                self.checkpoint(state, "execute_finish").await;
                return Ok(());
            }
            Action::Tool { tool_name, args } => (tool_name, args),
        };
        let mut args_obj = args.as_object().cloned().unwrap_or_default();

        if tool_name == "write_file" {
            if let Some(path) = args_obj.get("path").and_then(Value::as_str).map(str::to_string) {
                let basename = Path::new(&path)
                    .file_name()
                    .and_then(|f| f.to_str())
                    .unwrap_or(&path)
                    .to_string();
                // Only probe before the first attempt at this path in this
                // run; a validation-rejected retry shouldn't re-probe. Both
                // candidates are always tried on that first attempt, even
                // when the path has no directory component and they
                // coincide, so a bare filename still gets two lookups.
                let already_attempted = state.tool_history.iter().any(|h| {
                    h.tool == "write_file" && h.args.get("path").and_then(Value::as_str) == Some(path.as_str())
                });
                let keys = if already_attempted {
                    Vec::new()
                } else {
                    vec![format!("write_file:{path}"), format!("write_file:{basename}")]
                };
                for key in keys {
                    let lookup_args = json!({"run_id": state.run_id, "key": key});
                    let Some(lookup_tool) = self.tools.get("retrieve_memo") else {
                        break;
                    };
                    let lookup_result = lookup_tool.call(&lookup_args).await;
                    let found = lookup_result.get("found").and_then(Value::as_bool).unwrap_or(false);
                    self.record_tool_call(state, "retrieve_memo", lookup_args.clone(), lookup_result.clone());
                    state.memo_events.push(MemoEvent {
                        key: key.clone(),
                        namespace: NAMESPACE_RUN.to_string(),
                        source_tool: if found { "retrieve_memo_hit" } else { "retrieve_memo_miss" }.to_string(),
                        step: state.step,
                        value_hash: lookup_result.get("value_hash").and_then(Value::as_str).map(str::to_string),
                        created_at: Utc::now().to_rfc3339(),
                    });
                    if found {
                        state.policy_flags.memo_retrieve_hits += 1;
                        if let Some(idx) = next_incomplete_mission(state) {
                            let value = lookup_result.get("value").cloned().unwrap_or(Value::Null);
                            mark_mission_complete(state, idx, "retrieve_memo", value);
                        }
                        state.messages.push(ChatMessage::system(
                            "The requested write was already memoized; continue with the next task.".to_string(),
                        ));
                        state.pending_action = None;
                        self.checkpoint(state, "execute_retrieve_hit_skip").await;
                        return Ok(());
                    }
                    state.policy_flags.memo_retrieve_misses += 1;
                }
            }
        }

        if state.policy_flags.memo_required && tool_name != "memoize" {
            state.retry_counts.memo_policy += 1;
            if state.retry_counts.memo_policy > self.policy.max_policy_retries {
                return Err(OrchestratorError::MemoizationPolicyViolation {
                    tool_name,
                    key: state.policy_flags.memo_required_key.clone().unwrap_or_default(),
                    retries: state.retry_counts.memo_policy,
                });
            }
            state.messages.push(ChatMessage::system(format!(
                "Memoization is required before any other tool may run. Call memoize with key '{}' first.",
                state.policy_flags.memo_required_key.clone().unwrap_or_default()
            )));
            state.pending_action = None;
            self.checkpoint(state, "execute_memo_policy_retry").await;
            return Ok(());
        }

        if !self.tools.contains(&tool_name) {
            state.messages.push(ChatMessage::system(format!(
                "Unknown tool '{tool_name}'. Valid tools: {}",
                self.tools.names().join(", ")
            )));
            state.pending_action = None;
            self.checkpoint(state, "execute_unknown_tool").await;
            return Ok(());
        }

        if tool_name == "memoize" || tool_name == "retrieve_memo" {
            args_obj
                .entry("run_id".to_string())
                .or_insert_with(|| Value::String(state.run_id.clone()));
            if tool_name == "memoize" {
                args_obj
                    .entry("step".to_string())
                    .or_insert_with(|| Value::Number(state.step.into()));
            }
        }
        let normalized_args = Value::Object(args_obj);

        let signature = format!(
            "{tool_name}:{}",
            to_canonical_json(&normalized_args).unwrap_or_default()
        );
        if state.seen_tool_signatures.contains(&signature) {
            state.retry_counts.duplicate_tool += 1;
            if let Some(idx) = next_incomplete_mission(state) {
                state.messages.push(ChatMessage::system(format!(
                    "Do not repeat a tool call with identical arguments. Next task: {}",
                    state.missions[idx]
                )));
                state.pending_action = None;
            } else {
                state.pending_action = Some(Action::Finish {
                    answer: auto_summary(state),
                });
            }
            self.checkpoint(state, "execute_duplicate_tool").await;
            return Ok(());
        }
        state.seen_tool_signatures.insert(signature);

        let tool = self.tools.get(&tool_name).expect("checked contains above");
        let mut result = tool.call(&normalized_args).await;

        if let Some(idx) = next_incomplete_mission(state) {
            let mission_text = state.missions[idx].clone();
            if let Some(reason) = validate_mission_content(&tool_name, &normalized_args, &result, &mission_text) {
                result = json!({"error": "content_validation_failed", "details": reason});
                state.retry_counts.content_validation += 1;
                self.record_tool_call(state, &tool_name, normalized_args.clone(), result.clone());
                if state.retry_counts.content_validation > self.config.max_content_validation_retries {
                    state.pending_action = Some(Action::Finish {
                        answer: format!(
                            "Run failed: content validation failed after {} retries ({reason})",
                            state.retry_counts.content_validation
                        ),
                    });
                } else {
                    state.messages.push(ChatMessage::system(format!(
                        "Content validation failed ({reason}). Retry this task with corrected output."
                    )));
                    state.pending_action = None;
                }
                self.checkpoint(state, "execute_content_validation_failed").await;
                return Ok(());
            }
        }

        self.record_tool_call(state, &tool_name, normalized_args.clone(), result.clone());

        // A result that is about to trigger the memoization policy can't
        // complete its mission yet: the durable record of it doesn't exist
        // until the follow-up `memoize` call lands, so completion is
        // deferred to that call (tracker's memo-helper carve-out).
        let about_to_require_memo = tool_name != "memoize"
            && tool_name != "retrieve_memo"
            && self.policy.requires_memoization(&tool_name, &normalized_args, &result);
        if let Some(idx) = next_incomplete_mission(state) {
            let mission_text = state.missions[idx].clone();
            if !about_to_require_memo
                && tool_completes_mission(&tool_name, &result, &mission_text, state.policy_flags.memo_required)
            {
                mark_mission_complete(state, idx, &tool_name, result.clone());
            } else {
                record_mission_tool_event(state, idx, &tool_name, result.clone());
            }
        }

        let call_no = state.tool_history.last().map_or(0, |h| h.call_no);
        state
            .messages
            .push(ChatMessage::tool(format!("TOOL_RESULT #{call_no} ({tool_name}): {result}")));
        state.messages.push(ChatMessage::system(progress_hint(state)));

        if tool_name == "write_file" && result.get("error").is_none() {
            if let Some(path) = normalized_args.get("path").and_then(Value::as_str) {
                let basename = Path::new(path)
                    .file_name()
                    .and_then(|f| f.to_str())
                    .unwrap_or(path)
                    .to_string();
                let content = normalized_args.get("content").cloned().unwrap_or(Value::Null);
                let cache_value = json!({"path": path, "content": content});
                let key = format!("write_file_input:{basename}");
                match self
                    .memo_store
                    .put(crate::memo::SHARED_RUN_ID, &key, cache_value, NAMESPACE_CACHE, "write_file", state.step)
                    .await
                {
                    Ok(put) => state.memo_events.push(MemoEvent {
                        key,
                        namespace: NAMESPACE_CACHE.to_string(),
                        source_tool: "write_file_cache".to_string(),
                        step: state.step,
                        value_hash: Some(put.value_hash),
                        created_at: Utc::now().to_rfc3339(),
                    }),
                    Err(e) => warn!(error = %e, "failed to store write_file cache entry"),
                }
            }
        }

        if tool_name == "memoize" {
            if let Some(value_hash) = result.get("value_hash").and_then(Value::as_str) {
                state.memo_events.push(MemoEvent {
                    key: normalized_args.get("key").and_then(Value::as_str).unwrap_or_default().to_string(),
                    namespace: normalized_args
                        .get("namespace")
                        .and_then(Value::as_str)
                        .unwrap_or(NAMESPACE_RUN)
                        .to_string(),
                    source_tool: "memoize".to_string(),
                    step: state.step,
                    value_hash: Some(value_hash.to_string()),
                    created_at: Utc::now().to_rfc3339(),
                });
                state.policy_flags.memo_required = false;
                state.policy_flags.memo_required_key = None;
                state.policy_flags.memo_required_reason = None;
                state.retry_counts.memo_policy = 0;
            }
        }

        state.policy_flags.last_tool_name = Some(tool_name);
        state.policy_flags.last_tool_args = Some(normalized_args);
        state.policy_flags.last_tool_result = Some(result);
        state.pending_action = None;
        self.checkpoint(state, "execute").await;
        Ok(())
    }

    #[instrument(skip(self, state), fields(run_id = %state.run_id, step = state.step))]
    async fn policy_node(&self, state: &mut RunState) {
        ensure_state_defaults(state);

        let (Some(tool_name), Some(args), Some(result)) = (
            state.policy_flags.last_tool_name.clone(),
            state.policy_flags.last_tool_args.clone(),
            state.policy_flags.last_tool_result.clone(),
        ) else {
            return;
        };
        if tool_name == "memoize" || tool_name == "retrieve_memo" {
            return;
        }
        if self.policy.requires_memoization(&tool_name, &args, &result) {
            let key = self.policy.suggested_memo_key(&tool_name, &args, &result);
            debug!(tool = %tool_name, key = %key, "memoization now required");
            state.policy_flags.memo_required = true;
            state.policy_flags.memo_required_key = Some(key.clone());
            state.policy_flags.memo_required_reason =
                Some(format!("heavy deterministic result from {tool_name}"));
            state.messages.push(ChatMessage::system(format!(
                "Call memoize next with key '{key}' and run_id '{}' to persist this result.",
                state.run_id
            )));
        }
        self.checkpoint(state, "policy").await;
    }

    #[instrument(skip(self, state), fields(run_id = %state.run_id, step = state.step))]
    async fn finalize_node(&self, state: &mut RunState) {
        ensure_state_defaults(state);

        if let Some(Action::Finish { answer }) = state.pending_action.take() {
            state.final_answer = answer;
        }
        if state.final_answer.trim().is_empty() {
            state.final_answer = "Run completed with no explicit finish answer.".to_string();
        }

        if let Err(e) = write_shared_plan(&self.config.output_root, state) {
            warn!(error = %e, "failed to write Shared Plan artifact");
        }

        self.checkpoint(state, "finalize").await;
    }
}
