//! Policy gate for the Conclave orchestrator.
//!
//! Every worker registration, task submission and task result passes through a
//! [`PolicyGate`] before the orchestrator acts on it. The gate is an opaque
//! collaborator: the orchestrator only reads the returned [`Evaluation`].
//!
//! # Main types
//!
//! - [`PolicyGate`] — Trait evaluating an action description plus JSON context.
//! - [`Evaluation`] — Allow/deny decision with violations, warnings and recommendations.
//! - [`PolicyChain`] — Composite gate that merges the verdicts of several gates.
//! - [`RulePolicy`] — Configurable term-matching gate with severity levels.
//! - [`AuditedGate`] — Wrapper recording every decision for later summary.

/// Decision audit trail.
pub mod audit;
/// Gate trait, evaluation types and the composite chain.
pub mod gate;
/// Rule-based gate implementation.
pub mod rules;

pub use audit::{AuditedGate, DecisionRecord, PolicyAudit, PolicySummary};
pub use gate::{AllowAll, Evaluation, PolicyChain, PolicyGate, Severity, Violation};
pub use rules::{GuidelineRule, ProhibitedRule, RulePolicy, RulePolicyConfig};
