//! `conclave.toml` loading.
//!
//! The file holds the engine tunables, an optional policy rule set, and the
//! workers and tasks a run starts with.

use crate::demo::{Behaviour, DemoWorker};
use anyhow::{bail, Context};
use conclave_core::Capability;
use conclave_orchestrator::{
    EngineConfig, Task, TaskKind, Worker, WorkerConfig, DEFAULT_TASK_PRIORITY,
};
use conclave_policy::{RulePolicy, RulePolicyConfig};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct ConclaveConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    /// Omitted section means the built-in rule set.
    #[serde(default)]
    pub policy: Option<RulePolicyConfig>,
    #[serde(default)]
    pub workers: Vec<WorkerEntry>,
    #[serde(default)]
    pub tasks: Vec<TaskEntry>,
}

#[derive(Debug, Deserialize)]
pub struct WorkerEntry {
    pub id: String,
    pub capabilities: Vec<Capability>,
    #[serde(default = "default_worker_priority")]
    pub priority: i32,
    #[serde(default)]
    pub behaviour: Behaviour,
    #[serde(default)]
    pub delay_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct TaskEntry {
    /// Generated when omitted.
    #[serde(default)]
    pub id: Option<String>,
    pub kind: TaskKind,
    pub description: String,
    #[serde(default = "default_task_priority")]
    pub priority: i32,
    /// Derived from `kind` when omitted.
    #[serde(default)]
    pub requirements: Option<Vec<Capability>>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_worker_priority() -> i32 {
    1
}

fn default_task_priority() -> i32 {
    DEFAULT_TASK_PRIORITY
}

impl ConclaveConfig {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config file '{}'", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Engine limits plus id uniqueness across workers and tasks.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.engine.validate()?;

        let mut worker_ids = HashSet::new();
        for worker in &self.workers {
            if !worker_ids.insert(worker.id.as_str()) {
                bail!("duplicate worker id '{}'", worker.id);
            }
            if worker.capabilities.is_empty() {
                bail!("worker '{}' declares no capabilities", worker.id);
            }
        }

        let mut task_ids = HashSet::new();
        for id in self.tasks.iter().filter_map(|t| t.id.as_deref()) {
            if !task_ids.insert(id) {
                bail!("duplicate task id '{id}'");
            }
        }
        Ok(())
    }

    /// Dependencies that name no configured task.
    ///
    /// Such tasks can never become ready; they are reported, not rejected.
    pub fn unknown_dependencies(&self) -> Vec<(String, String)> {
        let known: HashSet<&str> = self.tasks.iter().filter_map(|t| t.id.as_deref()).collect();
        self.tasks
            .iter()
            .flat_map(|t| {
                let owner = t.id.clone().unwrap_or_else(|| t.description.clone());
                t.depends_on
                    .iter()
                    .filter(|dep| !known.contains(dep.as_str()))
                    .map(move |dep| (owner.clone(), dep.clone()))
            })
            .collect()
    }

    pub fn rule_policy(&self) -> RulePolicy {
        match &self.policy {
            Some(rules) => RulePolicy::new(rules.clone()),
            None => RulePolicy::with_default_rules(),
        }
    }
}

impl WorkerEntry {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::new(self.capabilities.iter().copied()).with_priority(self.priority)
    }

    pub fn build(&self) -> Arc<dyn Worker> {
        Arc::new(DemoWorker::new(
            self.behaviour,
            Duration::from_millis(self.delay_ms),
        ))
    }
}

impl TaskEntry {
    pub fn to_task(&self) -> Task {
        let mut task = Task::new(self.kind, &self.description)
            .with_priority(self.priority)
            .with_dependencies(self.depends_on.iter().map(|d| d.as_str().into()).collect());
        if let Some(id) = &self.id {
            task = task.with_id(id.as_str());
        }
        if let Some(reqs) = &self.requirements {
            task = task.with_requirements(reqs.iter().copied());
        }
        task
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[engine]
poll_interval_ms = 50
export_path = "state.json"

[engine.retry]
cooldown_ms = 100
max_retries = 2

[[workers]]
id = "researcher"
capabilities = ["research", "analysis"]
priority = 2
behaviour = "flaky"

[[workers]]
id = "coder"
capabilities = ["code"]

[[tasks]]
id = "t1"
kind = "research"
description = "Survey async runtimes"
priority = 8

[[tasks]]
id = "t2"
kind = "code"
description = "Prototype the scheduler"
requirements = ["code", "planning"]
depends_on = ["t1"]
"#;

    #[test]
    fn test_parse_sample() {
        let config = ConclaveConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.engine.poll_interval_ms, 50);
        assert_eq!(config.engine.retry.cooldown_ms, 100);
        assert_eq!(config.engine.retry.max_retries, Some(2));
        assert_eq!(config.engine.retry.priority_threshold, 5);
        assert!(config.policy.is_none());

        assert_eq!(config.workers.len(), 2);
        assert_eq!(config.workers[0].behaviour, Behaviour::Flaky);
        assert_eq!(config.workers[1].behaviour, Behaviour::Echo);
        assert_eq!(config.workers[1].worker_config().priority, 1);

        let t1 = config.tasks[0].to_task();
        assert_eq!(t1.id.as_str(), "t1");
        assert_eq!(
            t1.requirements,
            vec![Capability::Research, Capability::Analysis]
        );
        let t2 = config.tasks[1].to_task();
        assert_eq!(t2.priority, DEFAULT_TASK_PRIORITY);
        assert_eq!(t2.requirements, vec![Capability::Code, Capability::Planning]);
        assert_eq!(t2.dependencies, vec!["t1".into()]);
        assert!(config.unknown_dependencies().is_empty());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ConclaveConfig::parse("").unwrap();
        assert_eq!(config.engine.poll_interval_ms, 1000);
        assert!(config.workers.is_empty());
        assert!(config.rule_policy().rule_count() > 0);
    }

    #[test]
    fn test_policy_section_replaces_defaults() {
        let config = ConclaveConfig::parse(
            r#"
[[policy.rules]]
category = "harm"
level = "critical"
terms = ["destroy"]
"#,
        )
        .unwrap();
        assert_eq!(config.rule_policy().rule_count(), 1);
    }

    #[test]
    fn test_rejects_duplicates_and_bad_values() {
        let dup_worker = r#"
[[workers]]
id = "w"
capabilities = ["code"]
[[workers]]
id = "w"
capabilities = ["research"]
"#;
        assert!(ConclaveConfig::parse(dup_worker).is_err());

        let dup_task = r#"
[[tasks]]
id = "t"
kind = "code"
description = "a"
[[tasks]]
id = "t"
kind = "code"
description = "b"
"#;
        assert!(ConclaveConfig::parse(dup_task).is_err());

        assert!(ConclaveConfig::parse("[engine]\ndispatchers = 0").is_err());
        assert!(ConclaveConfig::parse(
            "[[workers]]\nid = \"w\"\ncapabilities = [\"telepathy\"]"
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("conclave.toml");
        tokio::fs::write(&path, SAMPLE).await.unwrap();
        let config = ConclaveConfig::load(&path).await.unwrap();
        assert_eq!(config.tasks.len(), 2);

        let err = ConclaveConfig::load(&tmp.path().join("absent.toml"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_unknown_dependencies_reported() {
        let config = ConclaveConfig::parse(
            r#"
[[tasks]]
id = "report"
kind = "analysis"
description = "Write report"
depends_on = ["missing"]
"#,
        )
        .unwrap();
        assert_eq!(
            config.unknown_dependencies(),
            vec![("report".to_string(), "missing".to_string())]
        );
    }
}
