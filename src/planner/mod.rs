//! Planner adapter contract, hard wall-clock timeout wrapper, unrecoverable-
//! error classification, and a scripted in-process test double (C7).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::PlannerError;
use crate::state::ChatMessage;

/// Uniform `generate(messages) -> text` contract over heterogeneous
/// planner providers. Implementations may block indefinitely; the driver
/// is responsible for the wall-clock timeout via [`generate_with_timeout`].
#[async_trait]
pub trait Planner: Send + Sync {
    /// Produce the next raw response for `messages`.
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, PlannerError>;
}

const DEFAULT_UNRECOVERABLE_MARKERS: &[&str] = &[
    "invalid api key",
    "authentication",
    "permission",
    "insufficient_quota",
    "rate limit exceeded",
];

/// True if `message` names an unrecoverable provider condition: one of the
/// fixed substrings, the `"model"` + `"not found"` pair, or one of
/// `extra_markers` (case-insensitive in all cases).
#[must_use]
pub fn is_unrecoverable(message: &str, extra_markers: &[String]) -> bool {
    let lowered = message.to_lowercase();
    if DEFAULT_UNRECOVERABLE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        return true;
    }
    if lowered.contains("model") && lowered.contains("not found") {
        return true;
    }
    extra_markers
        .iter()
        .any(|marker| lowered.contains(marker.to_lowercase().as_str()))
}

/// Call `planner.generate(messages)` under a hard wall-clock `timeout`.
///
/// The call runs on a dedicated background task; if the task has not
/// delivered a result by `timeout`, this returns `PlannerError::Timeout`
/// immediately and the background task is abandoned rather than cancelled
/// — its eventual result, success or failure, is simply discarded. Passing
/// `Duration::ZERO` disables the timeout and awaits the call directly.
pub async fn generate_with_timeout(
    planner: Arc<dyn Planner>,
    messages: Vec<ChatMessage>,
    timeout: Duration,
) -> Result<String, PlannerError> {
    if timeout.is_zero() {
        return planner.generate(&messages).await;
    }

    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let result = planner.generate(&messages).await;
        let _ = tx.send(result);
    });

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(PlannerError::Recoverable(
            "planner worker dropped its result channel".to_string(),
        )),
        Err(_) => Err(PlannerError::Timeout(timeout)),
    }
}

/// A scripted or cycling planner test double, grounded on the teacher's
/// `MockModel`: responses are consumed in order, and optionally replayed
/// from the start once exhausted.
pub struct MockPlanner {
    responses: Mutex<VecDeque<String>>,
    cycle: bool,
    delay: Option<Duration>,
}

impl MockPlanner {
    /// A planner that returns each of `responses` once, in order, then
    /// fails as exhausted.
    #[must_use]
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            cycle: false,
            delay: None,
        }
    }

    /// A planner that replays `responses` indefinitely once exhausted.
    #[must_use]
    pub fn cycling(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            cycle: true,
            delay: None,
        }
    }

    /// Sleep `delay` before every response — used to exercise the hard
    /// timeout wrapper deterministically.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Planner for MockPlanner {
    async fn generate(&self, _messages: &[ChatMessage]) -> Result<String, PlannerError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut queue = self.responses.lock().expect("mock planner lock poisoned");
        match queue.pop_front() {
            Some(response) => {
                if self.cycle {
                    queue.push_back(response.clone());
                }
                Ok(response)
            }
            None => Err(PlannerError::Unrecoverable(
                "MockPlanner exhausted its scripted responses".to_string(),
            )),
        }
    }
}
