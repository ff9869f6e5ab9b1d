use conclave_core::{ConclaveError, ConclaveResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Severity level of a policy violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A single reason an action was denied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub category: String,
    pub level: Severity,
    pub reason: String,
}

impl Violation {
    pub fn new(category: impl Into<String>, level: Severity, reason: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            level,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.category, self.level, self.reason)
    }
}

/// Result of evaluating an action against a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub allowed: bool,
    pub confidence: f64,
    #[serde(default)]
    pub violations: Vec<Violation>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl Evaluation {
    /// An unconditional allow with full confidence.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            confidence: 1.0,
            violations: Vec::new(),
            warnings: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    /// A denial carrying one violation.
    pub fn deny(violation: Violation) -> Self {
        Self {
            allowed: false,
            confidence: 1.0,
            violations: vec![violation],
            warnings: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    /// Joined, human-readable list of violations.
    pub fn violation_summary(&self) -> String {
        self.violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Turns a denial into [`ConclaveError::PolicyViolation`].
    pub fn ensure_allowed(&self, action: &str) -> ConclaveResult<()> {
        if self.allowed {
            return Ok(());
        }
        let reasons = if self.violations.is_empty() {
            "denied without stated reason".to_string()
        } else {
            self.violation_summary()
        };
        Err(ConclaveError::PolicyViolation(format!("{action}: {reasons}")))
    }
}

impl Default for Evaluation {
    fn default() -> Self {
        Self::allow()
    }
}

/// Evaluates proposed actions before the orchestrator performs them.
///
/// Called at worker registration, task submission and after a task returns
/// its result. Implementations must be cheap and must not block.
pub trait PolicyGate: Send + Sync {
    fn evaluate(&self, action: &str, context: &serde_json::Value) -> Evaluation;
}

impl<G: PolicyGate + ?Sized> PolicyGate for Arc<G> {
    fn evaluate(&self, action: &str, context: &serde_json::Value) -> Evaluation {
        (**self).evaluate(action, context)
    }
}

/// Gate that allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PolicyGate for AllowAll {
    fn evaluate(&self, _action: &str, _context: &serde_json::Value) -> Evaluation {
        Evaluation::allow()
    }
}

/// Composite gate that evaluates every gate in the chain.
///
/// The action is allowed only if every gate allows it. Violations, warnings
/// and recommendations are concatenated and confidences multiplied.
pub struct PolicyChain {
    gates: Vec<Arc<dyn PolicyGate>>,
}

impl PolicyChain {
    pub fn new() -> Self {
        Self { gates: Vec::new() }
    }

    /// Add a gate to the chain.
    pub fn add(&mut self, gate: Arc<dyn PolicyGate>) {
        self.gates.push(gate);
    }

    /// Get the number of gates in the chain.
    pub fn gate_count(&self) -> usize {
        self.gates.len()
    }
}

impl Default for PolicyChain {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyGate for PolicyChain {
    fn evaluate(&self, action: &str, context: &serde_json::Value) -> Evaluation {
        let mut merged = Evaluation::allow();
        for gate in &self.gates {
            let eval = gate.evaluate(action, context);
            merged.allowed &= eval.allowed;
            merged.confidence *= eval.confidence;
            merged.violations.extend(eval.violations);
            merged.warnings.extend(eval.warnings);
            merged.recommendations.extend(eval.recommendations);
        }
        merged
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    struct DenyAll;

    impl PolicyGate for DenyAll {
        fn evaluate(&self, _action: &str, _context: &serde_json::Value) -> Evaluation {
            Evaluation::deny(Violation::new("harm", Severity::Critical, "always denied"))
        }
    }

    struct Doubtful;

    impl PolicyGate for Doubtful {
        fn evaluate(&self, _action: &str, _context: &serde_json::Value) -> Evaluation {
            let mut eval = Evaluation::allow();
            eval.confidence = 0.5;
            eval.warnings.push("unsure".into());
            eval
        }
    }

    #[test]
    fn test_allow_all() {
        let eval = AllowAll.evaluate("anything", &json!({}));
        assert!(eval.allowed);
        assert_eq!(eval.confidence, 1.0);
        assert!(eval.ensure_allowed("anything").is_ok());
    }

    #[test]
    fn test_ensure_allowed_reports_violations() {
        let eval = DenyAll.evaluate("Execute task: x", &json!({}));
        let err = eval.ensure_allowed("Execute task: x").unwrap_err();
        assert!(err.is_policy_violation());
        let msg = err.to_string();
        assert!(msg.contains("harm (critical): always denied"));
        assert!(msg.contains("Execute task: x"));
    }

    #[test]
    fn test_empty_chain_allows() {
        let chain = PolicyChain::new();
        assert_eq!(chain.gate_count(), 0);
        assert!(chain.evaluate("x", &json!(null)).allowed);
    }

    #[test]
    fn test_chain_merges_verdicts() {
        let mut chain = PolicyChain::new();
        chain.add(Arc::new(Doubtful));
        chain.add(Arc::new(Doubtful));
        let eval = chain.evaluate("x", &json!({}));
        assert!(eval.allowed);
        assert!((eval.confidence - 0.25).abs() < f64::EPSILON);
        assert_eq!(eval.warnings.len(), 2);

        chain.add(Arc::new(DenyAll));
        let eval = chain.evaluate("x", &json!({}));
        assert!(!eval.allowed);
        assert_eq!(eval.violations.len(), 1);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::High.to_string(), "high");
    }
}
