use chrono::{DateTime, Utc};
use conclave_core::{Capability, CapabilitySet};
use conclave_policy::{Severity, Violation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Identifier of a registered worker.
pub type WorkerId = String;

/// Map returned by a worker; its `summary` entry is what gets logged.
pub type TaskOutput = HashMap<String, serde_json::Value>;

/// Unique identifier of a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generates a fresh `task_<8 hex>` id.
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("task_{}", &hex[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The type tag of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Research,
    Code,
    Analysis,
    Communication,
    Planning,
    Learning,
}

impl TaskKind {
    /// Capabilities required when a submission names none.
    pub fn default_requirements(&self) -> Vec<Capability> {
        match self {
            TaskKind::Research => vec![Capability::Research, Capability::Analysis],
            TaskKind::Code => vec![Capability::Code],
            TaskKind::Analysis => vec![Capability::Analysis],
            TaskKind::Communication => vec![Capability::Communication],
            TaskKind::Planning => vec![Capability::Planning],
            TaskKind::Learning => vec![Capability::Learning],
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Research => write!(f, "research"),
            TaskKind::Code => write!(f, "code"),
            TaskKind::Analysis => write!(f, "analysis"),
            TaskKind::Communication => write!(f, "communication"),
            TaskKind::Planning => write!(f, "planning"),
            TaskKind::Learning => write!(f, "learning"),
        }
    }
}

/// Default priority of a new task.
pub const DEFAULT_TASK_PRIORITY: i32 = 5;

/// A unit of work submitted to the orchestrator.
///
/// Immutable after submission except for the requeue bookkeeping fields
/// `attempts` and `deferrals`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub description: String,
    /// Higher is more urgent.
    pub priority: i32,
    pub requirements: Vec<Capability>,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    /// Number of times the task has been re-queued after a failure.
    #[serde(default)]
    pub attempts: u32,
    /// Number of times the task was rotated to the tail because it was not ready.
    #[serde(default)]
    pub deferrals: u32,
    pub submitted_at: DateTime<Utc>,
}

impl Task {
    pub fn new(kind: TaskKind, description: impl Into<String>) -> Self {
        Self {
            id: TaskId::generate(),
            kind,
            description: description.into(),
            priority: DEFAULT_TASK_PRIORITY,
            requirements: kind.default_requirements(),
            context: HashMap::new(),
            dependencies: Vec::new(),
            attempts: 0,
            deferrals: 0,
            submitted_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Replaces the required capabilities, keeping first occurrences only.
    pub fn with_requirements(mut self, requirements: impl IntoIterator<Item = Capability>) -> Self {
        let mut reqs: Vec<Capability> = Vec::new();
        for cap in requirements {
            if !reqs.contains(&cap) {
                reqs.push(cap);
            }
        }
        self.requirements = reqs;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<TaskId>) -> Self {
        self.dependencies = deps;
        self
    }

    /// Whether every dependency satisfies `succeeded`.
    pub fn dependencies_met<F>(&self, succeeded: F) -> bool
    where
        F: Fn(&TaskId) -> bool,
    {
        self.dependencies.iter().all(succeeded)
    }
}

/// Live status of a registered worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Error,
    Paused,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerStatus::Idle => write!(f, "idle"),
            WorkerStatus::Busy => write!(f, "busy"),
            WorkerStatus::Error => write!(f, "error"),
            WorkerStatus::Paused => write!(f, "paused"),
        }
    }
}

/// Declared configuration of a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub capabilities: CapabilitySet,
    /// Selection weight; higher wins.
    #[serde(default = "default_worker_priority")]
    pub priority: i32,
    /// Advisory only; the dispatcher runs one task per worker.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: u32,
    #[serde(default = "default_learning_enabled")]
    pub learning_enabled: bool,
    #[serde(default = "default_policy_level")]
    pub policy_level: Severity,
}

fn default_worker_priority() -> i32 {
    1
}
fn default_max_concurrent() -> u32 {
    5
}
fn default_learning_enabled() -> bool {
    true
}
fn default_policy_level() -> Severity {
    Severity::High
}

impl WorkerConfig {
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            capabilities: capabilities.into_iter().collect(),
            priority: default_worker_priority(),
            max_concurrent_tasks: default_max_concurrent(),
            learning_enabled: default_learning_enabled(),
            policy_level: default_policy_level(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Terminal state of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeState {
    Succeeded,
    Failed,
}

/// Record of how a task's execution ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
    pub state: OutcomeState,
    pub result: Option<TaskOutput>,
    pub error: Option<String>,
    /// Violations flagged by the result check; they never change `state`.
    #[serde(default)]
    pub policy_warnings: Vec<Violation>,
    /// 1-based attempt number.
    pub attempt: u32,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl Outcome {
    pub fn succeeded(task: &Task, worker_id: &str, result: TaskOutput, duration_ms: u64) -> Self {
        Self {
            task_id: task.id.clone(),
            worker_id: worker_id.to_string(),
            state: OutcomeState::Succeeded,
            result: Some(result),
            error: None,
            policy_warnings: Vec::new(),
            attempt: task.attempts + 1,
            duration_ms,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(task: &Task, worker_id: &str, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            task_id: task.id.clone(),
            worker_id: worker_id.to_string(),
            state: OutcomeState::Failed,
            result: None,
            error: Some(error.into()),
            policy_warnings: Vec::new(),
            attempt: task.attempts + 1,
            duration_ms,
            finished_at: Utc::now(),
        }
    }

    pub fn with_policy_warnings(mut self, warnings: Vec<Violation>) -> Self {
        self.policy_warnings = warnings;
        self
    }

    pub fn is_success(&self) -> bool {
        self.state == OutcomeState::Succeeded
    }
}

/// Per-worker execution counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub success_rate: f64,
}

/// Externally visible view of one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatusReport {
    pub worker_id: WorkerId,
    pub status: WorkerStatus,
    pub current_task: Option<TaskId>,
    pub stats: WorkerStats,
    pub config: WorkerConfig,
}
