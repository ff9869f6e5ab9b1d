use crate::types::{
    TaskId, WorkerConfig, WorkerId, WorkerStats, WorkerStatus, WorkerStatusReport,
};
use crate::worker::Worker;
use chrono::{DateTime, Utc};
use conclave_core::{Capability, ConclaveError, ConclaveResult};
use conclave_policy::PolicyGate;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// A registered worker and its live bookkeeping.
pub struct WorkerRecord {
    pub id: WorkerId,
    pub config: WorkerConfig,
    pub status: WorkerStatus,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub current_task: Option<TaskId>,
    pub registered_at: DateTime<Utc>,
    worker: Arc<dyn Worker>,
}

impl WorkerRecord {
    /// `completed / (completed + failed)`, or `1.0` with no history.
    pub fn success_rate(&self) -> f64 {
        let total = self.tasks_completed + self.tasks_failed;
        if total == 0 {
            return 1.0;
        }
        self.tasks_completed as f64 / total as f64
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            tasks_completed: self.tasks_completed,
            tasks_failed: self.tasks_failed,
            success_rate: self.success_rate(),
        }
    }

    pub fn report(&self) -> WorkerStatusReport {
        WorkerStatusReport {
            worker_id: self.id.clone(),
            status: self.status,
            current_task: self.current_task.clone(),
            stats: self.stats(),
            config: self.config.clone(),
        }
    }
}

/// Tracks registered workers, their capabilities and live status.
///
/// The registry is the only writer of worker state. Records are kept in id
/// order so that selection ties resolve to the lowest id.
pub struct WorkerRegistry {
    workers: BTreeMap<WorkerId, WorkerRecord>,
    policy: Arc<dyn PolicyGate>,
}

impl WorkerRegistry {
    pub fn new(policy: Arc<dyn PolicyGate>) -> Self {
        Self {
            workers: BTreeMap::new(),
            policy,
        }
    }

    /// Register a worker after the policy gate approves it.
    ///
    /// A duplicate id replaces the previous record.
    pub fn register(
        &mut self,
        id: impl Into<WorkerId>,
        worker: Arc<dyn Worker>,
        config: WorkerConfig,
    ) -> ConclaveResult<WorkerId> {
        let id = id.into();
        let action = format!(
            "Register worker {id} with capabilities {}",
            config.capabilities
        );
        let context = serde_json::json!({ "worker_config": &config });
        let eval = self.policy.evaluate(&action, &context);
        if let Err(e) = eval.ensure_allowed(&action) {
            warn!(worker_id = %id, violations = %eval.violation_summary(), "Worker registration rejected");
            return Err(e);
        }

        let record = WorkerRecord {
            id: id.clone(),
            config,
            status: WorkerStatus::Idle,
            tasks_completed: 0,
            tasks_failed: 0,
            current_task: None,
            registered_at: Utc::now(),
            worker,
        };
        if self.workers.insert(id.clone(), record).is_some() {
            warn!(worker_id = %id, "Worker re-registered, previous record replaced");
        }
        info!(worker_id = %id, "Worker registered");
        Ok(id)
    }

    /// Remove a worker. Returns whether it was registered.
    pub fn unregister(&mut self, id: &str) -> bool {
        let removed = self.workers.remove(id).is_some();
        if removed {
            info!(worker_id = %id, "Worker unregistered");
        }
        removed
    }

    /// Best idle worker whose capabilities cover `required`.
    ///
    /// Maximises `(priority, success_rate)`; ties go to the lowest id.
    pub fn find_capable(&self, required: &[Capability]) -> Option<WorkerId> {
        let mut best: Option<&WorkerRecord> = None;
        for record in self.workers.values() {
            if record.status != WorkerStatus::Idle || !record.config.capabilities.covers(required) {
                continue;
            }
            let better = match best {
                None => true,
                Some(b) => {
                    (record.config.priority, record.success_rate())
                        .partial_cmp(&(b.config.priority, b.success_rate()))
                        == Some(std::cmp::Ordering::Greater)
                }
            };
            if better {
                best = Some(record);
            }
        }
        best.map(|r| r.id.clone())
    }

    /// Select a capable worker and mark it busy with `task_id` in one step.
    pub fn claim(
        &mut self,
        required: &[Capability],
        task_id: &TaskId,
    ) -> Option<(WorkerId, Arc<dyn Worker>)> {
        let id = self.find_capable(required)?;
        let record = self.workers.get_mut(&id)?;
        record.status = WorkerStatus::Busy;
        record.current_task = Some(task_id.clone());
        Some((id, record.worker.clone()))
    }

    /// Return a claimed worker to idle without recording an outcome.
    pub fn release(&mut self, id: &str) {
        if let Some(record) = self.workers.get_mut(id) {
            record.current_task = None;
            if record.status == WorkerStatus::Busy {
                record.status = WorkerStatus::Idle;
            }
        }
    }

    pub fn set_status(&mut self, id: &str, status: WorkerStatus) -> ConclaveResult<()> {
        let record = self.get_mut(id)?;
        if status != WorkerStatus::Busy {
            record.current_task = None;
        }
        record.status = status;
        Ok(())
    }

    /// Bump the completed or failed counter.
    pub fn record_outcome(&mut self, id: &str, success: bool) -> ConclaveResult<()> {
        let record = self.get_mut(id)?;
        if success {
            record.tasks_completed += 1;
        } else {
            record.tasks_failed += 1;
        }
        Ok(())
    }

    /// Exclude a worker from selection. Rejected while it is busy.
    pub fn pause(&mut self, id: &str) -> ConclaveResult<()> {
        let record = self.get_mut(id)?;
        if record.status == WorkerStatus::Busy {
            return Err(ConclaveError::WorkerBusy(id.to_string()));
        }
        record.status = WorkerStatus::Paused;
        info!(worker_id = %id, "Worker paused");
        Ok(())
    }

    /// Make a worker selectable again. Rejected while it is busy.
    pub fn resume(&mut self, id: &str) -> ConclaveResult<()> {
        let record = self.get_mut(id)?;
        if record.status == WorkerStatus::Busy {
            return Err(ConclaveError::WorkerBusy(id.to_string()));
        }
        record.status = WorkerStatus::Idle;
        info!(worker_id = %id, "Worker resumed");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&WorkerRecord> {
        self.workers.get(id)
    }

    fn get_mut(&mut self, id: &str) -> ConclaveResult<&mut WorkerRecord> {
        self.workers
            .get_mut(id)
            .ok_or_else(|| ConclaveError::WorkerNotFound(id.to_string()))
    }

    pub fn status(&self, id: &str) -> Option<WorkerStatusReport> {
        self.workers.get(id).map(WorkerRecord::report)
    }

    /// Reports for every worker, in id order.
    pub fn status_all(&self) -> Vec<WorkerStatusReport> {
        self.workers.values().map(WorkerRecord::report).collect()
    }

    pub fn count_with_status(&self, status: WorkerStatus) -> usize {
        self.workers.values().filter(|r| r.status == status).count()
    }

    pub fn records(&self) -> impl Iterator<Item = &WorkerRecord> {
        self.workers.values()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
