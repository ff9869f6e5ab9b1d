use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::dispatcher::Dispatcher;
use crate::snapshot::{JsonFileSink, Snapshot, SnapshotSink, SystemStats};
use crate::types::{Outcome, Task, TaskId, WorkerConfig, WorkerId, WorkerStatusReport};
use crate::worker::Worker;
use conclave_core::{ConclaveError, ConclaveResult};
use conclave_policy::{PolicyAudit, PolicyGate, PolicySummary};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// The task orchestration engine.
///
/// Owns the shared [`EngineContext`] and the dispatch loops running over it.
/// Registration and submission go through the policy gate; everything else
/// is bookkeeping over the registry, queue and ledger.
pub struct Engine {
    config: EngineConfig,
    ctx: Arc<EngineContext>,
    audit: Option<Arc<PolicyAudit>>,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Create an engine with the given policy gate.
    pub fn new(config: EngineConfig, policy: Arc<dyn PolicyGate>) -> ConclaveResult<Self> {
        config.validate()?;
        let ctx = Arc::new(EngineContext::new(&config, policy));
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            config,
            ctx,
            audit: None,
            shutdown,
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Report this audit's summary in stats and snapshots.
    ///
    /// The audit must be the one fed by the engine's gate, e.g. through
    /// [`conclave_policy::AuditedGate::with_audit`].
    pub fn with_policy_audit(mut self, audit: Arc<PolicyAudit>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    /// A dispatcher bound to this engine's state and shutdown signal.
    ///
    /// Useful for stepping the engine by hand with [`Dispatcher::dispatch_once`].
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.ctx.clone(), self.shutdown.subscribe())
    }

    // --- Workers ---

    pub async fn register_worker(
        &self,
        id: impl Into<WorkerId>,
        worker: Arc<dyn Worker>,
        config: WorkerConfig,
    ) -> ConclaveResult<WorkerId> {
        self.ctx.registry.write().await.register(id, worker, config)
    }

    pub async fn unregister_worker(&self, id: &str) -> bool {
        self.ctx.registry.write().await.unregister(id)
    }

    pub async fn pause_worker(&self, id: &str) -> ConclaveResult<()> {
        self.ctx.registry.write().await.pause(id)
    }

    pub async fn resume_worker(&self, id: &str) -> ConclaveResult<()> {
        self.ctx.registry.write().await.resume(id)
    }

    /// Status of one worker, or of every worker when `id` is `None`.
    pub async fn status(&self, id: Option<&str>) -> ConclaveResult<Vec<WorkerStatusReport>> {
        let registry = self.ctx.registry.read().await;
        match id {
            Some(id) => registry
                .status(id)
                .map(|report| vec![report])
                .ok_or_else(|| ConclaveError::WorkerNotFound(id.to_string())),
            None => Ok(registry.status_all()),
        }
    }

    // --- Tasks ---

    /// Validate and enqueue a task.
    ///
    /// Ids already queued, running, cooling down after a failure, or already
    /// holding an outcome are rejected.
    pub async fn submit(&self, task: Task) -> ConclaveResult<TaskId> {
        let mut queue = self.ctx.queue.lock().await;
        // In-flight before ledger: a finishing task is written to the ledger
        // before it leaves the in-flight set.
        if self.ctx.is_in_flight(&task.id) {
            return Err(ConclaveError::Orchestrator(format!(
                "Task {} is already in flight",
                task.id
            )));
        }
        if self.ctx.ledger.read().await.contains(&task.id) {
            return Err(ConclaveError::Orchestrator(format!(
                "Task {} already has an outcome",
                task.id
            )));
        }
        queue.submit(task)
    }

    /// The latest outcome recorded for a task.
    pub async fn outcome(&self, task_id: &TaskId) -> Option<Outcome> {
        self.ctx.ledger.read().await.get(task_id).cloned()
    }

    // --- Reporting ---

    pub async fn stats(&self) -> SystemStats {
        let queue = self.ctx.queue.lock().await;
        let ledger = self.ctx.ledger.read().await;
        let registry = self.ctx.registry.read().await;
        SystemStats::collect(&registry, &queue, &ledger, self.policy_summary())
    }

    pub async fn snapshot(&self) -> Snapshot {
        let queue = self.ctx.queue.lock().await;
        let ledger = self.ctx.ledger.read().await;
        let registry = self.ctx.registry.read().await;
        Snapshot::capture(&registry, &queue, &ledger, self.policy_summary())
    }

    pub async fn export(&self, sink: &dyn SnapshotSink) -> ConclaveResult<()> {
        let snapshot = self.snapshot().await;
        sink.write(&snapshot).await?;
        info!(workers = snapshot.workers.len(), "State exported");
        Ok(())
    }

    fn policy_summary(&self) -> Option<PolicySummary> {
        self.audit.as_ref().map(|a| a.summary())
    }

    // --- Lifecycle ---

    /// Spawn the configured number of dispatch loops. No-op when running.
    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            warn!("Engine already running");
            return;
        }
        self.shutdown.send_replace(false);
        for _ in 0..self.config.dispatchers {
            handles.push(tokio::spawn(self.dispatcher().run()));
        }
        info!(dispatchers = self.config.dispatchers, "Engine started");
    }

    /// Signal shutdown and wait for every dispatch loop to exit.
    ///
    /// A task already handed to a worker runs to completion first.
    pub async fn stop(&self) {
        let drained: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();
        if drained.is_empty() {
            return;
        }
        self.shutdown.send_replace(true);
        for handle in drained {
            if let Err(e) = handle.await {
                error!(error = %e, "Dispatcher task panicked");
            }
        }
        info!("Engine stopped");
    }

    pub async fn is_running(&self) -> bool {
        !self.handles.lock().await.is_empty()
    }

    /// Run for `duration`, stop, and export the final state when an
    /// `export_path` is configured.
    pub async fn run_for(&self, duration: Duration) -> ConclaveResult<SystemStats> {
        self.start().await;
        tokio::time::sleep(duration).await;
        self.stop().await;

        if let Some(path) = &self.config.export_path {
            self.export(&JsonFileSink::new(path)).await?;
        }
        let stats = self.stats().await;
        info!(
            completed = stats.completed_tasks,
            failed = stats.failed_tasks,
            queued = stats.queued_tasks,
            "Run finished"
        );
        Ok(stats)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Dispatch loops still running exit at their next check.
        self.shutdown.send_replace(true);
    }
}
