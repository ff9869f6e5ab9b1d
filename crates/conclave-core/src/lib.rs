//! Core types and error definitions for the Conclave orchestrator.
//!
//! This crate provides the foundational types shared across all Conclave crates:
//! the unified error enum and the closed set of capability tags that workers
//! declare and tasks require.
//!
//! # Main types
//!
//! - [`ConclaveError`] — Unified error enum for all Conclave subsystems.
//! - [`ConclaveResult`] — Convenience alias for `Result<T, ConclaveError>`.
//! - [`Capability`] — A category of work a worker can perform.

/// Capability tags and helpers.
pub mod capability;

pub use capability::{Capability, CapabilitySet};

// --- Error types ---

/// Top-level error type for the Conclave orchestrator.
///
/// Only [`ConclaveError::PolicyViolation`] is meant to escape the public
/// registration and submission API. [`ConclaveError::Execution`] escapes a
/// single dispatch step but is absorbed by the dispatch loop.
#[derive(Debug, thiserror::Error)]
pub enum ConclaveError {
    /// A registration, submission or result check was rejected by the policy gate.
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// A worker failed while executing a task.
    #[error("Execution failed for task {task_id} on worker {worker_id}: {reason}")]
    Execution {
        /// The task that was being executed.
        task_id: String,
        /// The worker that ran it.
        worker_id: String,
        /// Error description reported by the worker.
        reason: String,
    },

    /// A worker call did not finish within the configured execution timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// No worker is registered under the given id.
    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    /// The operation is not allowed while the worker is executing a task.
    #[error("Worker busy: {0}")]
    WorkerBusy(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal scheduling inconsistency.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),
}

impl ConclaveError {
    /// Whether this error is a policy rejection.
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, ConclaveError::PolicyViolation(_))
    }
}

/// A convenience `Result` alias using [`ConclaveError`].
pub type ConclaveResult<T> = Result<T, ConclaveError>;
