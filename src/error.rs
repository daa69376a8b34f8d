//! Error types for the orchestrator.
//!
//! Component-local errors (`MemoError`, `CheckpointError`, `PlannerError`,
//! `MissionParseError`) wrap the lower-level failure (mostly `rusqlite`) and
//! are converted into the crate-boundary [`OrchestratorError`] with `#[from]`.

use thiserror::Error;

/// A type alias for `Result<T, OrchestratorError>`.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors raised by the memo store.
#[derive(Debug, Error)]
pub enum MemoError {
    /// Underlying SQLite failure.
    #[error("memo store sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Value could not be serialized to canonical JSON.
    #[error("memo value serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The blocking task bridging to the connection panicked or was cancelled.
    #[error("memo store task join error: {0}")]
    Task(String),
}

/// Errors raised by the checkpoint store.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Underlying SQLite failure.
    #[error("checkpoint store sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// State could not be serialized to JSON.
    #[error("checkpoint state serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The blocking task bridging to the connection panicked or was cancelled.
    #[error("checkpoint store task join error: {0}")]
    Task(String),
}

/// Errors raised by a [`crate::planner::Planner`] adapter.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// The planner did not respond within the configured wall-clock timeout.
    #[error("provider timeout after {0:?}")]
    Timeout(std::time::Duration),
    /// The provider returned an error that is not retryable.
    #[error("unrecoverable provider error: {0}")]
    Unrecoverable(String),
    /// The provider returned an error that may succeed on retry.
    #[error("provider error: {0}")]
    Recoverable(String),
}

/// Errors raised while parsing a mission list.
#[derive(Debug, Error)]
pub enum MissionParseError {
    /// The parser exceeded its wall-clock budget.
    #[error("mission parse timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Errors raised while validating a raw planner response against the
/// action schema (§4.6). All are retryable by the plan node; none escape
/// [`crate::driver::Orchestrator::run`].
#[derive(Debug, Error)]
pub enum ActionParseError {
    /// No balanced top-level JSON object could be extracted from the text.
    #[error("no JSON object found in planner output")]
    NoJsonObject,
    /// The extracted object is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// `action` is neither `"tool"`, `"finish"`, nor a known tool name.
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    /// `{action:"tool", ...}` carries no usable `tool_name`.
    #[error("tool action missing 'tool_name'")]
    MissingToolName,
    /// `{action:"finish", ...}` carries no `answer`.
    #[error("finish action missing 'answer'")]
    MissingAnswer,
    /// The object carries a top-level field outside the allowed set for its action.
    #[error("unexpected top-level field '{0}'")]
    UnexpectedField(String),
}

/// The crate-boundary error type returned by [`crate::driver::Orchestrator::run`].
///
/// Per the fail-closed policy, almost every failure class resolves to a
/// non-empty `final_answer` inside the finalize node rather than surfacing
/// here. Only a guardrail breach or an unexpected host error propagates.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The memoization policy was violated and the retry budget was exhausted.
    #[error(
        "memoization policy violated: tool '{tool_name}' required memoization of key '{key}' \
         after {retries} retries"
    )]
    MemoizationPolicyViolation {
        /// Name of the tool whose result required memoization.
        tool_name: String,
        /// The key the policy engine suggested.
        key: String,
        /// Number of reminder retries already issued.
        retries: u32,
    },

    /// The hard recursion limit on plan/execute/policy cycles was exceeded.
    #[error("recursion limit exceeded: {0} cycles")]
    RecursionLimitExceeded(usize),

    /// Memo store failure.
    #[error(transparent)]
    Memo(#[from] MemoError),

    /// Checkpoint store failure.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}
