use crate::ledger::Ledger;
use crate::types::{Task, TaskId};
use conclave_core::{ConclaveError, ConclaveResult};
use conclave_policy::PolicyGate;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pending tasks ordered by descending priority, ties by arrival.
///
/// Tasks whose dependencies have not succeeded yet are rotated to the tail
/// while scanning, so an unready head never blocks the rest of the queue.
pub struct TaskQueue {
    tasks: VecDeque<Task>,
    policy: Arc<dyn PolicyGate>,
    /// Deferral count at which a task is reported as stuck; `0` disables.
    stuck_after: u32,
    stuck: HashSet<TaskId>,
}

impl TaskQueue {
    pub fn new(policy: Arc<dyn PolicyGate>) -> Self {
        Self {
            tasks: VecDeque::new(),
            policy,
            stuck_after: 0,
            stuck: HashSet::new(),
        }
    }

    /// Report tasks rotated `deferrals` times as stuck.
    pub fn with_stuck_threshold(mut self, deferrals: u32) -> Self {
        self.stuck_after = deferrals;
        self
    }

    /// Validate a task against the policy gate and enqueue it.
    pub fn submit(&mut self, task: Task) -> ConclaveResult<TaskId> {
        if self.contains(&task.id) {
            return Err(ConclaveError::Orchestrator(format!(
                "Task {} is already queued",
                task.id
            )));
        }

        let action = format!("Execute task: {}", task.description);
        let context = serde_json::json!({
            "task_type": task.kind,
            "context": &task.context,
        });
        let eval = self.policy.evaluate(&action, &context);
        if let Err(e) = eval.ensure_allowed(&action) {
            warn!(task_id = %task.id, violations = %eval.violation_summary(), "Task rejected");
            return Err(e);
        }

        let id = task.id.clone();
        info!(task_id = %id, priority = task.priority, kind = %task.kind, "Task submitted");
        self.insert(task);
        Ok(id)
    }

    /// Put a failed task back, counting the attempt. No policy re-check.
    pub fn requeue(&mut self, mut task: Task) {
        task.attempts += 1;
        info!(task_id = %task.id, attempt = task.attempts + 1, "Task re-queued for retry");
        self.insert(task);
    }

    /// Append, then stable-sort by descending priority.
    ///
    /// Stability keeps arrival order among equal priorities.
    fn insert(&mut self, task: Task) {
        self.tasks.push_back(task);
        self.tasks
            .make_contiguous()
            .sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// The first task whose dependencies have all succeeded.
    ///
    /// Unready tasks met at the head are rotated to the tail; at most one full
    /// pass is made. The returned task stays queued until [`TaskQueue::remove`].
    pub fn next_ready(&mut self, ledger: &Ledger) -> Option<Task> {
        for _ in 0..self.tasks.len() {
            let head = self.tasks.front()?;
            if head.dependencies_met(|dep| ledger.is_succeeded(dep)) {
                return Some(head.clone());
            }
            let mut task = self.tasks.pop_front()?;
            task.deferrals += 1;
            debug!(task_id = %task.id, deferrals = task.deferrals, "Task deferred, dependencies pending");
            if self.stuck_after > 0
                && task.deferrals >= self.stuck_after
                && self.stuck.insert(task.id.clone())
            {
                warn!(
                    task_id = %task.id,
                    deferrals = task.deferrals,
                    dependencies = ?task.dependencies,
                    "Task appears stuck on unresolved dependencies"
                );
            }
            self.tasks.push_back(task);
        }
        None
    }

    /// Take a specific task out of the queue.
    pub fn remove(&mut self, id: &TaskId) -> Option<Task> {
        let pos = self.tasks.iter().position(|t| &t.id == id)?;
        self.stuck.remove(id);
        self.tasks.remove(pos)
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.iter().any(|t| &t.id == id)
    }

    /// Tasks flagged as stuck that are still queued.
    pub fn stuck(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.stuck.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Queued tasks in current scan order.
    pub fn pending(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{Outcome, TaskKind, TaskOutput};
    use conclave_policy::{AllowAll, RulePolicy};

    fn queue() -> TaskQueue {
        TaskQueue::new(Arc::new(AllowAll))
    }

    fn task(id: &str, priority: i32) -> Task {
        Task::new(TaskKind::Code, format!("Task {id}"))
            .with_id(id)
            .with_priority(priority)
    }

    fn ids(queue: &TaskQueue) -> Vec<String> {
        queue.pending().map(|t| t.id.to_string()).collect()
    }

    fn succeed(ledger: &mut Ledger, id: &str) {
        ledger.record(Outcome::succeeded(&task(id, 0), "w1", TaskOutput::new(), 1));
    }

    #[test]
    fn test_empty_queue() {
        let mut queue = queue();
        assert!(queue.is_empty());
        assert!(queue.next_ready(&Ledger::new()).is_none());
    }

    #[test]
    fn test_submit_orders_by_priority_then_arrival() {
        let mut queue = queue();
        queue.submit(task("low", 1)).unwrap();
        queue.submit(task("high", 9)).unwrap();
        queue.submit(task("mid-a", 5)).unwrap();
        queue.submit(task("mid-b", 5)).unwrap();
        assert_eq!(ids(&queue), vec!["high", "mid-a", "mid-b", "low"]);
    }

    #[test]
    fn test_submit_rejected_by_policy() {
        let mut queue = TaskQueue::new(Arc::new(RulePolicy::with_default_rules()));
        let bad = Task::new(TaskKind::Research, "Find passwords in the dump");
        let err = queue.submit(bad).unwrap_err();
        assert!(err.is_policy_violation());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_submit_duplicate_id_rejected() {
        let mut queue = queue();
        queue.submit(task("t1", 1)).unwrap();
        assert!(matches!(
            queue.submit(task("t1", 2)),
            Err(ConclaveError::Orchestrator(_))
        ));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_next_ready_does_not_remove() {
        let mut queue = queue();
        queue.submit(task("t1", 1)).unwrap();
        let ready = queue.next_ready(&Ledger::new()).unwrap();
        assert_eq!(ready.id.as_str(), "t1");
        assert_eq!(queue.len(), 1);
        assert!(queue.remove(&ready.id).is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_unready_head_rotates_to_tail() {
        let mut queue = queue();
        queue
            .submit(task("blocked", 9).with_dependencies(vec!["dep".into()]))
            .unwrap();
        queue.submit(task("free", 1)).unwrap();

        let ready = queue.next_ready(&Ledger::new()).unwrap();
        assert_eq!(ready.id.as_str(), "free");
        assert_eq!(ids(&queue), vec!["free", "blocked"]);
        assert_eq!(queue.get(&"blocked".into()).unwrap().deferrals, 1);
    }

    #[test]
    fn test_no_ready_task_after_full_pass() {
        let mut queue = queue();
        queue
            .submit(task("a", 2).with_dependencies(vec!["x".into()]))
            .unwrap();
        queue
            .submit(task("b", 1).with_dependencies(vec!["y".into()]))
            .unwrap();
        assert!(queue.next_ready(&Ledger::new()).is_none());
        // One full pass leaves the original order.
        assert_eq!(ids(&queue), vec!["a", "b"]);
    }

    #[test]
    fn test_dependency_requires_success() {
        let mut queue = queue();
        queue
            .submit(task("child", 1).with_dependencies(vec!["parent".into()]))
            .unwrap();

        let mut ledger = Ledger::new();
        ledger.record(Outcome::failed(&task("parent", 0), "w1", "boom", 1));
        assert!(queue.next_ready(&ledger).is_none());

        succeed(&mut ledger, "parent");
        assert_eq!(queue.next_ready(&ledger).unwrap().id.as_str(), "child");
    }

    #[test]
    fn test_requeue_counts_attempt_and_respects_priority() {
        let mut queue = queue();
        queue.submit(task("a", 7)).unwrap();
        queue.submit(task("c", 3)).unwrap();
        queue.requeue(task("b", 7));
        assert_eq!(ids(&queue), vec!["a", "b", "c"]);
        assert_eq!(queue.get(&"b".into()).unwrap().attempts, 1);
    }

    #[test]
    fn test_stuck_detection_does_not_reorder() {
        let mut queue = queue().with_stuck_threshold(3);
        queue
            .submit(task("cycle-a", 5).with_dependencies(vec!["cycle-b".into()]))
            .unwrap();
        queue
            .submit(task("cycle-b", 5).with_dependencies(vec!["cycle-a".into()]))
            .unwrap();
        let ledger = Ledger::new();

        for _ in 0..2 {
            assert!(queue.next_ready(&ledger).is_none());
        }
        assert!(queue.stuck().is_empty());

        assert!(queue.next_ready(&ledger).is_none());
        assert_eq!(
            queue.stuck(),
            vec![TaskId::from("cycle-a"), TaskId::from("cycle-b")]
        );
        assert_eq!(ids(&queue), vec!["cycle-a", "cycle-b"]);

        queue.remove(&"cycle-a".into());
        assert_eq!(queue.stuck(), vec![TaskId::from("cycle-b")]);
    }
}
