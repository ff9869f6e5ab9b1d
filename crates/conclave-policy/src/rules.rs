use crate::gate::{Evaluation, PolicyGate, Severity, Violation};
use serde::{Deserialize, Serialize};

/// Confidence multiplier applied for each guideline warning.
const WARNING_CONFIDENCE_FACTOR: f64 = 0.9;

/// A category of prohibited actions. Any matching term denies the action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProhibitedRule {
    pub category: String,
    pub level: Severity,
    pub terms: Vec<String>,
}

/// A behavioural guideline. Matching terms add a warning but do not deny.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidelineRule {
    pub guideline: String,
    pub terms: Vec<String>,
    /// Warning text; defaults to "Action may conflict with the <guideline> guideline".
    #[serde(default)]
    pub message: Option<String>,
}

impl GuidelineRule {
    fn warning(&self) -> String {
        self.message.clone().unwrap_or_else(|| {
            format!(
                "Action may conflict with the {} guideline",
                self.guideline
            )
        })
    }
}

/// Rule set for [`RulePolicy`], usually read from the `[policy]` config section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulePolicyConfig {
    #[serde(default)]
    pub rules: Vec<ProhibitedRule>,
    #[serde(default)]
    pub warnings: Vec<GuidelineRule>,
}

/// Case-insensitive term matching over the action description.
///
/// This is a stand-in gate; production deployments plug their own
/// [`PolicyGate`] in instead.
#[derive(Debug, Clone)]
pub struct RulePolicy {
    rules: Vec<ProhibitedRule>,
    guidelines: Vec<GuidelineRule>,
}

impl RulePolicy {
    pub fn new(config: RulePolicyConfig) -> Self {
        let lower = |terms: Vec<String>| terms.into_iter().map(|t| t.to_lowercase()).collect();
        Self {
            rules: config
                .rules
                .into_iter()
                .map(|r| ProhibitedRule {
                    terms: lower(r.terms),
                    ..r
                })
                .collect(),
            guidelines: config
                .warnings
                .into_iter()
                .map(|g| GuidelineRule {
                    terms: lower(g.terms),
                    ..g
                })
                .collect(),
        }
    }

    /// A small built-in rule set used when no `[policy]` section is configured.
    pub fn with_default_rules() -> Self {
        fn terms(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| (*s).to_string()).collect()
        }

        Self::new(RulePolicyConfig {
            rules: vec![
                ProhibitedRule {
                    category: "harm".into(),
                    level: Severity::Critical,
                    terms: terms(&["harm", "hurt", "injure", "destroy"]),
                },
                ProhibitedRule {
                    category: "illegal_activities".into(),
                    level: Severity::Critical,
                    terms: terms(&["steal", "fraud", "illegal"]),
                },
                ProhibitedRule {
                    category: "misinformation".into(),
                    level: Severity::High,
                    terms: terms(&["fake news", "false claim"]),
                },
                ProhibitedRule {
                    category: "privacy_violations".into(),
                    level: Severity::High,
                    terms: terms(&["private data", "passwords"]),
                },
            ],
            warnings: vec![
                GuidelineRule {
                    guideline: "transparency".into(),
                    terms: terms(&["conceal", "deceive", "mislead"]),
                    message: Some("Action may lack transparency".into()),
                },
                GuidelineRule {
                    guideline: "privacy".into(),
                    terms: terms(&["expose data", "leak information"]),
                    message: Some("Action may violate privacy".into()),
                },
            ],
        })
    }

    /// Number of prohibited categories.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    fn recommendations(violations: &[Violation], warnings: &[String]) -> Vec<String> {
        let mut out = Vec::new();
        if !violations.is_empty() {
            out.push("Revise the action to comply with policy".to_string());
            for v in violations {
                out.push(format!(
                    "Address {} violation at {} level",
                    v.category, v.level
                ));
            }
        }
        if !warnings.is_empty() {
            out.push("Consider revising to address the following concerns:".to_string());
            out.extend(warnings.iter().cloned());
        }
        out
    }
}

impl PolicyGate for RulePolicy {
    fn evaluate(&self, action: &str, _context: &serde_json::Value) -> Evaluation {
        let text = action.to_lowercase();
        let mut eval = Evaluation::allow();

        for rule in &self.rules {
            if rule.terms.iter().any(|t| text.contains(t.as_str())) {
                eval.allowed = false;
                eval.violations.push(Violation::new(
                    rule.category.clone(),
                    rule.level,
                    format!("Action violates {} principle", rule.category),
                ));
            }
        }

        for guideline in &self.guidelines {
            if guideline.terms.iter().any(|t| text.contains(t.as_str())) {
                eval.warnings.push(guideline.warning());
                eval.confidence *= WARNING_CONFIDENCE_FACTOR;
            }
        }

        eval.recommendations = Self::recommendations(&eval.violations, &eval.warnings);
        eval
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clean_action_allowed() {
        let policy = RulePolicy::with_default_rules();
        let eval = policy.evaluate("Execute task: summarize Rust release notes", &json!({}));
        assert!(eval.allowed);
        assert!(eval.violations.is_empty());
        assert!(eval.recommendations.is_empty());
        assert_eq!(eval.confidence, 1.0);
    }

    #[test]
    fn test_prohibited_term_denies() {
        let policy = RulePolicy::with_default_rules();
        let eval = policy.evaluate("Execute task: Steal the passwords", &json!({}));
        assert!(!eval.allowed);
        let categories: Vec<&str> = eval.violations.iter().map(|v| v.category.as_str()).collect();
        assert_eq!(categories, vec!["illegal_activities", "privacy_violations"]);
        assert_eq!(eval.violations[0].level, Severity::Critical);
        assert!(eval.recommendations[0].contains("Revise"));
    }

    #[test]
    fn test_guideline_warns_and_lowers_confidence() {
        let policy = RulePolicy::with_default_rules();
        let eval = policy.evaluate("Task result: conceal the draft", &json!({}));
        assert!(eval.allowed);
        assert_eq!(eval.warnings, vec!["Action may lack transparency".to_string()]);
        assert!((eval.confidence - 0.9).abs() < 1e-9);
        assert!(eval
            .recommendations
            .contains(&"Action may lack transparency".to_string()));
    }

    #[test]
    fn test_configured_terms_are_case_insensitive() {
        let config: RulePolicyConfig = parse_config(
            r#"{"rules":[{"category":"spam","level":"medium","terms":["Mass Mail"]}],
                "warnings":[{"guideline":"tone","terms":["shout"]}]}"#,
        );
        let policy = RulePolicy::new(config);
        assert_eq!(policy.rule_count(), 1);

        let eval = policy.evaluate("send MASS MAIL and shout", &json!({}));
        assert!(!eval.allowed);
        assert_eq!(eval.violations[0].level, Severity::Medium);
        assert_eq!(
            eval.warnings,
            vec!["Action may conflict with the tone guideline".to_string()]
        );
    }

    fn parse_config(json: &str) -> RulePolicyConfig {
        serde_json::from_str(json).unwrap()
    }
}
