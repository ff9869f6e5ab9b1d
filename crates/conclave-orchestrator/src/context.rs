use crate::config::EngineConfig;
use crate::ledger::Ledger;
use crate::registry::WorkerRegistry;
use crate::retry::RetryPolicy;
use crate::task_queue::TaskQueue;
use crate::types::TaskId;
use conclave_policy::PolicyGate;
use parking_lot::Mutex as SyncMutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// State shared by the engine and every dispatcher.
///
/// When more than one store is locked at once the order is queue, then
/// ledger, then registry. The registry lock is never held while a worker runs.
///
/// Every accepted task id is held by `queue`, `in_flight` or the ledger, and a
/// queued id is never also in flight or terminal. `in_flight` covers execution
/// and the failure cooldown; ids move between it and the queue under the
/// queue lock.
pub struct EngineContext {
    pub registry: RwLock<WorkerRegistry>,
    pub queue: Mutex<TaskQueue>,
    pub ledger: RwLock<Ledger>,
    pub in_flight: SyncMutex<HashSet<TaskId>>,
    pub policy: Arc<dyn PolicyGate>,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    pub execution_timeout: Option<Duration>,
}

impl EngineContext {
    pub fn new(config: &EngineConfig, policy: Arc<dyn PolicyGate>) -> Self {
        Self {
            registry: RwLock::new(WorkerRegistry::new(policy.clone())),
            queue: Mutex::new(
                TaskQueue::new(policy.clone()).with_stuck_threshold(config.stuck_after_deferrals),
            ),
            ledger: RwLock::new(Ledger::new().with_history_limit(config.history_limit)),
            in_flight: SyncMutex::new(HashSet::new()),
            policy,
            retry: config.retry_policy(),
            poll_interval: config.poll_interval(),
            execution_timeout: config.execution_timeout(),
        }
    }

    pub fn is_in_flight(&self, task_id: &TaskId) -> bool {
        self.in_flight.lock().contains(task_id)
    }
}
