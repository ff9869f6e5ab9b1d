use crate::context::EngineContext;
use crate::retry::RetryDecision;
use crate::types::{Outcome, Task, TaskId, TaskOutput, WorkerStatus};
use conclave_core::{ConclaveError, ConclaveResult};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Result of a single dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchStep {
    /// The queue is empty.
    Idle,
    /// Every queued task is waiting on dependencies.
    Deferred,
    /// The head-of-line task has no idle capable worker; it keeps its place.
    NoCapableWorker(TaskId),
    /// A task ran to a successful outcome.
    Completed(TaskId),
}

/// Pairs ready tasks with workers and runs them.
///
/// Several dispatchers may share one [`EngineContext`]; task selection and
/// worker claiming happen under the queue lock, so each task runs at most once
/// at a time.
#[derive(Clone)]
pub struct Dispatcher {
    ctx: Arc<EngineContext>,
    shutdown: watch::Receiver<bool>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<EngineContext>, shutdown: watch::Receiver<bool>) -> Self {
        Self { ctx, shutdown }
    }

    /// Start at most one task and wait for it to finish.
    ///
    /// A worker failure is returned as [`ConclaveError::Execution`] after the
    /// cooldown and requeue decision have been applied.
    pub async fn dispatch_once(&self) -> ConclaveResult<DispatchStep> {
        let (task, worker_id, worker) = {
            let mut queue = self.ctx.queue.lock().await;
            let ready = {
                let ledger = self.ctx.ledger.read().await;
                queue.next_ready(&ledger)
            };
            let Some(ready) = ready else {
                return Ok(if queue.is_empty() {
                    DispatchStep::Idle
                } else {
                    DispatchStep::Deferred
                });
            };

            let mut registry = self.ctx.registry.write().await;
            let Some((worker_id, worker)) = registry.claim(&ready.requirements, &ready.id) else {
                debug!(task_id = %ready.id, "No available worker for task");
                return Ok(DispatchStep::NoCapableWorker(ready.id));
            };
            let Some(task) = queue.remove(&ready.id) else {
                registry.release(&worker_id);
                return Ok(DispatchStep::Idle);
            };
            self.ctx.in_flight.lock().insert(task.id.clone());
            (task, worker_id, worker)
        };

        info!(task_id = %task.id, worker_id = %worker_id, attempt = task.attempts + 1, "Task assigned");
        let start = Instant::now();
        let result = match self.ctx.execution_timeout {
            Some(limit) => match tokio::time::timeout(limit, worker.execute(&task)).await {
                Ok(result) => result,
                Err(_) => Err(ConclaveError::Timeout(format!(
                    "task {} exceeded {}ms",
                    task.id,
                    limit.as_millis()
                ))),
            },
            None => worker.execute(&task).await,
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                let task_id = task.id.clone();
                self.complete(&task, &worker_id, output, duration_ms).await;
                Ok(DispatchStep::Completed(task_id))
            }
            Err(e) => {
                let reason = e.to_string();
                error!(task_id = %task.id, worker_id = %worker_id, error = %reason, "Task execution failed");
                let task_id = task.id.to_string();
                self.fail(task, &worker_id, &reason, duration_ms).await;
                Err(ConclaveError::Execution {
                    task_id,
                    worker_id,
                    reason,
                })
            }
        }
    }

    async fn complete(&self, task: &Task, worker_id: &str, output: TaskOutput, duration_ms: u64) {
        let summary = match output.get("summary") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "No summary".to_string(),
        };

        let action = format!("Task result: {summary}");
        let context = serde_json::json!({ "result": &output, "task": task });
        let eval = self.ctx.policy.evaluate(&action, &context);
        let mut outcome = Outcome::succeeded(task, worker_id, output, duration_ms);
        if !eval.allowed {
            warn!(
                task_id = %task.id,
                violations = %eval.violation_summary(),
                "Task result flagged by policy"
            );
            outcome = outcome.with_policy_warnings(eval.violations);
        }

        {
            let mut registry = self.ctx.registry.write().await;
            if let Err(e) = registry.record_outcome(worker_id, true) {
                warn!(worker_id = %worker_id, error = %e, "Worker left before its result was recorded");
            }
            let _ = registry.set_status(worker_id, WorkerStatus::Idle);
        }
        self.ctx.ledger.write().await.record(outcome);
        self.ctx.in_flight.lock().remove(&task.id);

        info!(task_id = %task.id, worker_id = %worker_id, duration_ms, summary = %summary, "Task completed");
    }

    async fn fail(&self, task: Task, worker_id: &str, reason: &str, duration_ms: u64) {
        {
            let mut registry = self.ctx.registry.write().await;
            if let Err(e) = registry.record_outcome(worker_id, false) {
                warn!(worker_id = %worker_id, error = %e, "Worker left before its failure was recorded");
            }
            let _ = registry.set_status(worker_id, WorkerStatus::Error);
        }
        self.ctx
            .ledger
            .write()
            .await
            .record(Outcome::failed(&task, worker_id, reason, duration_ms));

        self.handle_failure(task, worker_id).await;
    }

    /// Cool the worker down, then decide whether the task gets another attempt.
    ///
    /// Shutdown cuts the cooldown short but the decision is still applied.
    async fn handle_failure(&self, task: Task, worker_id: &str) -> RetryDecision {
        let mut shutdown = self.shutdown.clone();
        if !is_stopping(&shutdown) {
            tokio::select! {
                _ = tokio::time::sleep(self.ctx.retry.cooldown) => {}
                _ = shutdown.changed() => {
                    debug!(worker_id = %worker_id, "Cooldown interrupted by shutdown");
                }
            }
        }

        {
            let mut registry = self.ctx.registry.write().await;
            // A worker paused during its cooldown stays paused.
            if registry
                .get(worker_id)
                .is_some_and(|r| r.status == WorkerStatus::Error)
            {
                let _ = registry.set_status(worker_id, WorkerStatus::Idle);
                debug!(worker_id = %worker_id, "Worker recovered from error");
            }
        }

        let decision = self.ctx.retry.decide(&task);
        match decision {
            RetryDecision::Requeued => {
                let mut queue = self.ctx.queue.lock().await;
                self.ctx.ledger.write().await.retract(&task.id);
                self.ctx.in_flight.lock().remove(&task.id);
                queue.requeue(task);
                return decision;
            }
            RetryDecision::Exhausted => {
                warn!(task_id = %task.id, attempts = task.attempts + 1, "Retry budget exhausted, task failed");
            }
            RetryDecision::BelowThreshold => {
                info!(task_id = %task.id, priority = task.priority, "Task failed without retry");
            }
        }
        self.ctx.in_flight.lock().remove(&task.id);
        decision
    }

    /// Dispatch until shutdown is signalled.
    ///
    /// Backs off for the poll interval whenever nothing could be started.
    /// Worker failures are logged and never end the loop. Dropping the
    /// shutdown sender stops the loop like sending `true`.
    pub async fn run(self) {
        let mut shutdown = self.shutdown.clone();
        info!("Dispatcher started");
        loop {
            if is_stopping(&shutdown) {
                break;
            }
            let back_off = match self.dispatch_once().await {
                Ok(DispatchStep::Completed(_)) => false,
                Ok(_) => true,
                Err(e) => {
                    debug!(error = %e, "Dispatch step ended with an error");
                    false
                }
            };
            if back_off {
                tokio::select! {
                    _ = tokio::time::sleep(self.ctx.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        info!("Dispatcher stopped");
    }
}

/// Shutdown was requested, or its sender is gone.
fn is_stopping(shutdown: &watch::Receiver<bool>) -> bool {
    let requested = *shutdown.borrow();
    requested || shutdown.has_changed().is_err()
}
