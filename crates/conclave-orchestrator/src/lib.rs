//! Capability-based task orchestration engine.
//!
//! Workers register with a set of capabilities, tasks are queued by priority
//! with optional dependencies, and dispatch loops pair each ready task with
//! the best idle worker able to run it. Failures cool the worker down and
//! may re-queue the task. Registrations, submissions and results pass
//! through a pluggable policy gate.
//!
//! # Main types
//!
//! - [`Engine`] — Owns the shared state and the dispatch loops.
//! - [`WorkerRegistry`] — Registered workers, their status and statistics.
//! - [`TaskQueue`] — Priority queue with dependency-aware readiness.
//! - [`Dispatcher`] — Runs one task at a time and applies the failure policy.
//! - [`Ledger`] — Outcomes of executed tasks and aggregate success rates.
//! - [`RetryPolicy`] — Cooldown and requeue rules after a failure.

/// Engine tunables loaded from configuration.
pub mod config;
/// Shared stores used by the engine and its dispatchers.
pub mod context;
/// Task-to-worker dispatch loop.
pub mod dispatcher;
/// Top-level engine facade.
pub mod engine;
/// Task outcome store.
pub mod ledger;
/// Worker registry and selection.
pub mod registry;
/// Failure cooldown and requeue policy.
pub mod retry;
/// State export and aggregate statistics.
pub mod snapshot;
/// Priority task queue.
pub mod task_queue;
/// Shared orchestration types (Task, Outcome, WorkerConfig, etc.).
pub mod types;
/// The worker execution trait.
pub mod worker;

pub use config::{EngineConfig, RetryConfig};
pub use context::EngineContext;
pub use dispatcher::{DispatchStep, Dispatcher};
pub use engine::Engine;
pub use ledger::Ledger;
pub use registry::{WorkerRecord, WorkerRegistry};
pub use retry::{RetryDecision, RetryPolicy};
pub use snapshot::{JsonFileSink, Snapshot, SnapshotSink, SystemStats, WorkerSnapshot};
pub use task_queue::TaskQueue;
pub use types::{
    Outcome, OutcomeState, Task, TaskId, TaskKind, TaskOutput, WorkerConfig, WorkerId,
    WorkerStats, WorkerStatus, WorkerStatusReport, DEFAULT_TASK_PRIORITY,
};
pub use worker::Worker;
