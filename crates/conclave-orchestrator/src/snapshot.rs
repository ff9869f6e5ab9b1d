use crate::ledger::Ledger;
use crate::registry::WorkerRegistry;
use crate::task_queue::TaskQueue;
use crate::types::{TaskId, WorkerConfig, WorkerStats, WorkerStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conclave_core::{ConclaveError, ConclaveResult};
use conclave_policy::PolicySummary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Aggregate counters across workers, queue and ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_workers: usize,
    pub busy_workers: usize,
    pub idle_workers: usize,
    pub paused_workers: usize,
    pub errored_workers: usize,
    pub queued_tasks: usize,
    pub in_flight_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    /// `0.0` until some task has finished.
    pub overall_success_rate: f64,
    #[serde(default)]
    pub stuck_tasks: Vec<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicySummary>,
}

impl SystemStats {
    /// Counters over the current state of each store.
    ///
    /// Completed and failed counts come from the ledger's terminal outcomes,
    /// so a failed attempt that was re-queued is not counted.
    pub fn collect(
        registry: &WorkerRegistry,
        queue: &TaskQueue,
        ledger: &Ledger,
        policy: Option<PolicySummary>,
    ) -> Self {
        let busy = registry.count_with_status(WorkerStatus::Busy);
        Self {
            total_workers: registry.len(),
            busy_workers: busy,
            idle_workers: registry.count_with_status(WorkerStatus::Idle),
            paused_workers: registry.count_with_status(WorkerStatus::Paused),
            errored_workers: registry.count_with_status(WorkerStatus::Error),
            queued_tasks: queue.len(),
            in_flight_tasks: busy,
            completed_tasks: ledger.total_completed(),
            failed_tasks: ledger.total_failed(),
            overall_success_rate: ledger.overall_success_rate(),
            stuck_tasks: queue.stuck(),
            policy,
        }
    }
}

/// One worker as it appears in an exported snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub config: WorkerConfig,
    pub stats: WorkerStats,
    pub status: WorkerStatus,
}

/// Point-in-time export of the engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub exported_at: DateTime<Utc>,
    pub workers: BTreeMap<String, WorkerSnapshot>,
    pub aggregate: SystemStats,
}

impl Snapshot {
    pub fn capture(
        registry: &WorkerRegistry,
        queue: &TaskQueue,
        ledger: &Ledger,
        policy: Option<PolicySummary>,
    ) -> Self {
        let workers = registry
            .records()
            .map(|r| {
                (
                    r.id.clone(),
                    WorkerSnapshot {
                        config: r.config.clone(),
                        stats: r.stats(),
                        status: r.status,
                    },
                )
            })
            .collect();
        Self {
            exported_at: Utc::now(),
            workers,
            aggregate: SystemStats::collect(registry, queue, ledger, policy),
        }
    }
}

/// Destination for exported snapshots.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn write(&self, snapshot: &Snapshot) -> ConclaveResult<()>;
}

/// Writes snapshots as pretty-printed JSON to a fixed path.
///
/// Each write replaces the previous file; missing parent directories are
/// created.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back a snapshot written by this sink.
    pub async fn load(&self) -> ConclaveResult<Snapshot> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(ConclaveError::Io)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl SnapshotSink for JsonFileSink {
    async fn write(&self, snapshot: &Snapshot) -> ConclaveResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(ConclaveError::Io)?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(ConclaveError::Io)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conclave_core::Capability;

    fn sample() -> Snapshot {
        let mut workers = BTreeMap::new();
        workers.insert(
            "w1".to_string(),
            WorkerSnapshot {
                config: WorkerConfig::new([Capability::Research]),
                stats: WorkerStats {
                    tasks_completed: 3,
                    tasks_failed: 1,
                    success_rate: 0.75,
                },
                status: WorkerStatus::Idle,
            },
        );
        Snapshot {
            exported_at: Utc::now(),
            workers,
            aggregate: SystemStats {
                total_workers: 1,
                busy_workers: 0,
                idle_workers: 1,
                paused_workers: 0,
                errored_workers: 0,
                queued_tasks: 0,
                in_flight_tasks: 0,
                completed_tasks: 3,
                failed_tasks: 1,
                overall_success_rate: 0.75,
                stuck_tasks: Vec::new(),
                policy: None,
            },
        }
    }

    #[test]
    fn test_snapshot_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        let worker = &json["workers"]["w1"];
        assert_eq!(worker["status"], "idle");
        assert_eq!(worker["stats"]["tasks_completed"], 3);
        assert_eq!(worker["config"]["capabilities"][0], "research");
        assert_eq!(json["aggregate"]["overall_success_rate"], 0.75);
        assert!(json["aggregate"].get("policy").is_none());
    }

    #[tokio::test]
    async fn test_json_sink_creates_parent_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(tmp.path().join("nested/dir/state.json"));
        sink.write(&sample()).await.unwrap();

        let loaded = sink.load().await.unwrap();
        assert_eq!(loaded.workers.len(), 1);
        assert_eq!(loaded.aggregate.completed_tasks, 3);
    }

    #[tokio::test]
    async fn test_json_sink_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(tmp.path().join("state.json"));
        sink.write(&sample()).await.unwrap();

        let mut second = sample();
        second.workers.clear();
        sink.write(&second).await.unwrap();
        assert!(sink.load().await.unwrap().workers.is_empty());
    }
}
