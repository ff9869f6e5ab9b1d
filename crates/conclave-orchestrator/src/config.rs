use crate::retry::RetryPolicy;
use conclave_core::{ConclaveError, ConclaveResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Tunables of the orchestration engine. Loaded from the `[engine]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Back-off between dispatch attempts when nothing could be started.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Rotations after which a task is reported as stuck. `0` disables.
    #[serde(default = "default_stuck_after_deferrals")]
    pub stuck_after_deferrals: u32,
    /// Per-execution timeout. `0` waits for the worker indefinitely.
    #[serde(default)]
    pub execution_timeout_ms: u64,
    /// Number of concurrent dispatch loops.
    #[serde(default = "default_dispatchers")]
    pub dispatchers: usize,
    /// Where `run_for` writes the final snapshot.
    #[serde(default)]
    pub export_path: Option<PathBuf>,
    /// Superseded attempts the ledger keeps. Older ones are dropped.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Failure handling settings, the `[engine.retry]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_priority_threshold")]
    pub priority_threshold: i32,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_stuck_after_deferrals() -> u32 {
    1000
}

fn default_dispatchers() -> usize {
    1
}

fn default_history_limit() -> usize {
    1000
}

fn default_cooldown_ms() -> u64 {
    5000
}

fn default_priority_threshold() -> i32 {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stuck_after_deferrals: default_stuck_after_deferrals(),
            execution_timeout_ms: 0,
            dispatchers: default_dispatchers(),
            export_path: None,
            history_limit: default_history_limit(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            priority_threshold: default_priority_threshold(),
            max_retries: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> ConclaveResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(ConclaveError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.dispatchers == 0 {
            return Err(ConclaveError::Config(
                "dispatchers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn execution_timeout(&self) -> Option<Duration> {
        (self.execution_timeout_ms > 0).then(|| Duration::from_millis(self.execution_timeout_ms))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            cooldown: Duration::from_millis(self.retry.cooldown_ms),
            priority_threshold: self.retry.priority_threshold,
            max_retries: self.retry.max_retries,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.stuck_after_deferrals, 1000);
        assert!(config.execution_timeout().is_none());
        assert_eq!(config.dispatchers, 1);
        assert_eq!(config.history_limit, 1000);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_retry_section() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"execution_timeout_ms": 250, "retry": {"max_retries": 3}}"#,
        )
        .unwrap();
        assert_eq!(config.execution_timeout(), Some(Duration::from_millis(250)));
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, Some(3));
        assert_eq!(policy.priority_threshold, 5);
        assert_eq!(policy.cooldown, Duration::from_secs(5));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = EngineConfig {
            poll_interval_ms: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConclaveError::Config(_))));

        let config = EngineConfig {
            dispatchers: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConclaveError::Config(_))));
    }
}
