#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for the conclave-policy crate.
//!
//! Covers rule configuration, chained gates, and auditing of mixed decisions.

use conclave_policy::*;
use serde_json::json;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// 1. Chain of a rule gate and a custom gate
// ---------------------------------------------------------------------------

struct NoWeekendDeploys;

impl PolicyGate for NoWeekendDeploys {
    fn evaluate(&self, action: &str, context: &serde_json::Value) -> Evaluation {
        let weekend = context
            .get("weekend")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if weekend && action.contains("deploy") {
            Evaluation::deny(Violation::new(
                "change_freeze",
                Severity::Medium,
                "no deploys on weekends",
            ))
        } else {
            Evaluation::allow()
        }
    }
}

#[test]
fn chain_combines_rule_and_context_gates() {
    let mut chain = PolicyChain::new();
    chain.add(Arc::new(RulePolicy::with_default_rules()));
    chain.add(Arc::new(NoWeekendDeploys));
    assert_eq!(chain.gate_count(), 2);

    let ok = chain.evaluate("Execute task: deploy docs", &json!({"weekend": false}));
    assert!(ok.allowed);

    let frozen = chain.evaluate("Execute task: deploy docs", &json!({"weekend": true}));
    assert!(!frozen.allowed);
    assert_eq!(frozen.violations[0].category, "change_freeze");

    let both = chain.evaluate("Execute task: deploy fraud", &json!({"weekend": true}));
    assert_eq!(both.violations.len(), 2);
    let err = both.ensure_allowed("Execute task: deploy fraud").unwrap_err();
    assert!(err.is_policy_violation());
}

// ---------------------------------------------------------------------------
// 2. Audit over a chained gate
// ---------------------------------------------------------------------------

#[test]
fn audit_summarises_chained_decisions() {
    let gate = AuditedGate::new(RulePolicy::with_default_rules());
    let actions = [
        "Register worker w1 with capabilities [research]",
        "Execute task: summarise the changelog",
        "Execute task: leak information and destroy logs",
    ];
    for action in actions {
        gate.evaluate(action, &json!({}));
    }

    let summary = gate.audit().summary();
    assert_eq!(summary.total_decisions, 3);
    assert_eq!(summary.violations_prevented, 1);

    let last = gate.audit().records().pop().unwrap();
    assert_eq!(last.warning_count, 1);
    assert!(last.confidence < 1.0);
}

// ---------------------------------------------------------------------------
// 3. Evaluation serializes with lowercase severity
// ---------------------------------------------------------------------------

#[test]
fn evaluation_json_shape() {
    let eval = Evaluation::deny(Violation::new("harm", Severity::Critical, "nope"));
    let value = serde_json::to_value(&eval).unwrap();
    assert_eq!(value["allowed"], json!(false));
    assert_eq!(value["violations"][0]["level"], json!("critical"));

    let parsed: Evaluation = serde_json::from_value(value).unwrap();
    assert_eq!(parsed, eval);
}
