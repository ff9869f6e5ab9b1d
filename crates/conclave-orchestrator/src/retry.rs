use crate::types::Task;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happened to a task after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryDecision {
    /// Put back in the queue for another attempt.
    Requeued,
    /// Priority qualified but the retry budget is spent.
    Exhausted,
    /// Priority at or below the threshold; the failure is final.
    BelowThreshold,
}

impl std::fmt::Display for RetryDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryDecision::Requeued => write!(f, "requeued"),
            RetryDecision::Exhausted => write!(f, "exhausted"),
            RetryDecision::BelowThreshold => write!(f, "below_threshold"),
        }
    }
}

/// Cooldown and requeue rules applied after a worker fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// How long a failed worker stays in `Error` before going back to idle.
    pub cooldown: Duration,
    /// Tasks with a priority strictly above this are retried.
    pub priority_threshold: i32,
    /// Cap on re-queues per task. `None` retries without limit.
    pub max_retries: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(5),
            priority_threshold: 5,
            max_retries: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_priority_threshold(mut self, threshold: i32) -> Self {
        self.priority_threshold = threshold;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn decide(&self, task: &Task) -> RetryDecision {
        if task.priority <= self.priority_threshold {
            return RetryDecision::BelowThreshold;
        }
        match self.max_retries {
            Some(max) if task.attempts >= max => RetryDecision::Exhausted,
            _ => RetryDecision::Requeued,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::TaskKind;

    fn task(priority: i32, attempts: u32) -> Task {
        let mut task = Task::new(TaskKind::Code, "work").with_priority(priority);
        task.attempts = attempts;
        task
    }

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.cooldown, Duration::from_secs(5));
        assert_eq!(policy.priority_threshold, 5);
        assert!(policy.max_retries.is_none());
    }

    #[test]
    fn test_threshold_is_strict() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(&task(5, 0)), RetryDecision::BelowThreshold);
        assert_eq!(policy.decide(&task(6, 0)), RetryDecision::Requeued);
        assert_eq!(policy.decide(&task(-1, 0)), RetryDecision::BelowThreshold);
    }

    #[test]
    fn test_unbounded_by_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(&task(9, 1_000)), RetryDecision::Requeued);
    }

    #[test]
    fn test_max_retries_exhausts() {
        let policy = RetryPolicy::default().with_max_retries(2);
        assert_eq!(policy.decide(&task(9, 1)), RetryDecision::Requeued);
        assert_eq!(policy.decide(&task(9, 2)), RetryDecision::Exhausted);
        assert_eq!(RetryDecision::Exhausted.to_string(), "exhausted");
    }
}
