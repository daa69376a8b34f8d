//! Tunable configuration for an [`crate::driver::Orchestrator`] (C10).

use std::path::PathBuf;
use std::time::Duration;

/// Every tunable named across §4 and §6, collected in one place and
/// constructed with documented defaults, mirroring the teacher's
/// `AgentConfig` builder shape.
#[derive(Debug, Clone)]
pub struct Config {
    /// Hard recursion limit on plan/execute/policy cycles (default 40).
    pub max_steps: usize,
    /// Consecutive invalid-planner-output retries tolerated (default 8).
    pub max_invalid_plan_retries: u32,
    /// Planner wall-clock timeouts tolerated before failing closed (default 2).
    pub max_provider_timeout_retries: u32,
    /// Content-validation failures tolerated before failing closed (default 2).
    pub max_content_validation_retries: u32,
    /// Hard wall-clock budget per planner call. `Duration::ZERO` disables it.
    pub plan_call_timeout: Duration,
    /// Memoization-policy reminder retries tolerated (default 2).
    pub memo_max_policy_retries: u32,
    /// Wall-clock budget for the mission parser (default 5s).
    pub mission_parse_timeout: Duration,
    /// Root directory `write_file` is sandboxed under.
    pub output_root: PathBuf,
    /// Additional case-insensitive substrings that classify a provider
    /// error as unrecoverable, beyond the fixed built-in set.
    pub unrecoverable_markers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_steps: 40,
            max_invalid_plan_retries: 8,
            max_provider_timeout_retries: 2,
            max_content_validation_retries: 2,
            plan_call_timeout: Duration::from_secs(45),
            memo_max_policy_retries: 2,
            mission_parse_timeout: Duration::from_secs(5),
            output_root: PathBuf::from("."),
            unrecoverable_markers: Vec::new(),
        }
    }
}

impl Config {
    /// Start from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sandbox root `write_file` writes under.
    #[must_use]
    pub fn with_output_root(mut self, output_root: impl Into<PathBuf>) -> Self {
        self.output_root = output_root.into();
        self
    }

    /// Set the hard wall-clock budget per planner call.
    #[must_use]
    pub fn with_plan_call_timeout(mut self, timeout: Duration) -> Self {
        self.plan_call_timeout = timeout;
        self
    }

    /// Set the recursion limit on plan/execute/policy cycles.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Add extra unrecoverable-provider-error substrings.
    #[must_use]
    pub fn with_unrecoverable_markers(mut self, markers: Vec<String>) -> Self {
        self.unrecoverable_markers = markers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.max_steps, 40);
        assert_eq!(config.max_invalid_plan_retries, 8);
        assert_eq!(config.max_provider_timeout_retries, 2);
        assert_eq!(config.max_content_validation_retries, 2);
        assert_eq!(config.plan_call_timeout, Duration::from_secs(45));
        assert_eq!(config.memo_max_policy_retries, 2);
        assert_eq!(config.mission_parse_timeout, Duration::from_secs(5));
    }

    #[test]
    fn builder_methods_override_defaults() {
        let config = Config::new()
            .with_output_root("/tmp/out")
            .with_plan_call_timeout(Duration::from_millis(50))
            .with_max_steps(5);
        assert_eq!(config.output_root, PathBuf::from("/tmp/out"));
        assert_eq!(config.plan_call_timeout, Duration::from_millis(50));
        assert_eq!(config.max_steps, 5);
    }
}
