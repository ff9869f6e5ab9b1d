use crate::gate::{Evaluation, PolicyGate};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// One recorded policy decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub allowed: bool,
    pub confidence: f64,
    pub violation_count: usize,
    pub warning_count: usize,
}

/// Aggregate view over recorded decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySummary {
    pub total_decisions: usize,
    pub violations_prevented: usize,
    /// Share of allowed decisions; `1.0` when nothing has been evaluated yet.
    pub compliance_rate: f64,
}

const DEFAULT_RECORD_LIMIT: usize = 1000;

/// In-memory record of policy decisions.
///
/// Totals cover every decision ever recorded; only the most recent
/// `record_limit` decisions are kept in full.
#[derive(Debug)]
pub struct PolicyAudit {
    log: Mutex<AuditLog>,
}

#[derive(Debug)]
struct AuditLog {
    records: VecDeque<DecisionRecord>,
    limit: usize,
    total: usize,
    denied: usize,
}

impl Default for PolicyAudit {
    fn default() -> Self {
        Self::with_record_limit(DEFAULT_RECORD_LIMIT)
    }
}

impl PolicyAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record_limit(limit: usize) -> Self {
        Self {
            log: Mutex::new(AuditLog {
                records: VecDeque::new(),
                limit,
                total: 0,
                denied: 0,
            }),
        }
    }

    /// Record the outcome of evaluating `action`.
    pub fn record(&self, action: &str, eval: &Evaluation) {
        if eval.allowed {
            debug!(action = %action, confidence = eval.confidence, "policy: allowed");
        } else {
            warn!(
                action = %action,
                violations = %eval.violation_summary(),
                "policy: violation prevented"
            );
        }
        let mut log = self.log.lock();
        log.total += 1;
        log.denied += usize::from(!eval.allowed);
        log.records.push_back(DecisionRecord {
            timestamp: Utc::now(),
            action: action.to_string(),
            allowed: eval.allowed,
            confidence: eval.confidence,
            violation_count: eval.violations.len(),
            warning_count: eval.warnings.len(),
        });
        while log.records.len() > log.limit {
            log.records.pop_front();
        }
    }

    /// Number of decisions recorded, including ones no longer retained.
    pub fn len(&self) -> usize {
        self.log.lock().total
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the retained records, oldest first.
    pub fn records(&self) -> Vec<DecisionRecord> {
        self.log.lock().records.iter().cloned().collect()
    }

    pub fn summary(&self) -> PolicySummary {
        let log = self.log.lock();
        let compliance_rate = if log.total == 0 {
            1.0
        } else {
            (log.total - log.denied) as f64 / log.total as f64
        };
        PolicySummary {
            total_decisions: log.total,
            violations_prevented: log.denied,
            compliance_rate,
        }
    }
}

/// Gate wrapper that records every decision in a [`PolicyAudit`].
pub struct AuditedGate<G> {
    inner: G,
    audit: Arc<PolicyAudit>,
}

impl<G: PolicyGate> AuditedGate<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            audit: Arc::new(PolicyAudit::new()),
        }
    }

    /// Shares an existing audit trail.
    pub fn with_audit(inner: G, audit: Arc<PolicyAudit>) -> Self {
        Self { inner, audit }
    }

    pub fn audit(&self) -> &Arc<PolicyAudit> {
        &self.audit
    }
}

impl<G: PolicyGate> PolicyGate for AuditedGate<G> {
    fn evaluate(&self, action: &str, context: &serde_json::Value) -> Evaluation {
        let eval = self.inner.evaluate(action, context);
        self.audit.record(action, &eval);
        eval
    }
}
