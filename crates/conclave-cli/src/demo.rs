//! In-process workers for trying out a configuration.

use async_trait::async_trait;
use conclave_core::{ConclaveError, ConclaveResult};
use conclave_orchestrator::{Task, TaskOutput, Worker};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// How a demo worker responds to tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behaviour {
    /// Succeeds, echoing the task description back as the summary.
    #[default]
    Echo,
    /// Fails every other call, starting with the first.
    Flaky,
    /// Always fails.
    Failing,
}

pub struct DemoWorker {
    behaviour: Behaviour,
    delay: Duration,
    calls: AtomicU64,
}

impl DemoWorker {
    pub fn new(behaviour: Behaviour, delay: Duration) -> Self {
        Self {
            behaviour,
            delay,
            calls: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Worker for DemoWorker {
    async fn execute(&self, task: &Task) -> ConclaveResult<TaskOutput> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let fail = match self.behaviour {
            Behaviour::Echo => false,
            Behaviour::Flaky => call % 2 == 0,
            Behaviour::Failing => true,
        };
        if fail {
            return Err(ConclaveError::Orchestrator(format!(
                "demo worker refused '{}' (call {})",
                task.description,
                call + 1
            )));
        }

        let mut output = TaskOutput::new();
        output.insert(
            "summary".to_string(),
            serde_json::json!(format!("{}: {}", task.kind, task.description)),
        );
        output.insert("attempt".to_string(), serde_json::json!(task.attempts + 1));
        Ok(output)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conclave_orchestrator::TaskKind;

    fn task() -> Task {
        Task::new(TaskKind::Planning, "Draft roadmap")
    }

    #[tokio::test]
    async fn test_echo_summarises_task() {
        let worker = DemoWorker::new(Behaviour::Echo, Duration::ZERO);
        let out = worker.execute(&task()).await.unwrap();
        assert_eq!(out["summary"], "planning: Draft roadmap");
        assert_eq!(out["attempt"], 1);
    }

    #[tokio::test]
    async fn test_flaky_alternates() {
        let worker = DemoWorker::new(Behaviour::Flaky, Duration::ZERO);
        assert!(worker.execute(&task()).await.is_err());
        assert!(worker.execute(&task()).await.is_ok());
        assert!(worker.execute(&task()).await.is_err());
    }

    #[tokio::test]
    async fn test_failing_always_fails() {
        let worker = DemoWorker::new(Behaviour::Failing, Duration::ZERO);
        for _ in 0..3 {
            assert!(worker.execute(&task()).await.is_err());
        }
    }
}
