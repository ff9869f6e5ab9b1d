use crate::types::{Outcome, OutcomeState, TaskId, WorkerId};
use std::collections::{HashMap, VecDeque};

const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Outcomes of executed tasks.
///
/// `outcomes` holds the latest outcome per task (last write wins). When a
/// failed task is re-queued its outcome is moved into `history`, so a task id
/// never sits in the queue and the terminal map at the same time.
///
/// `history` keeps at most `history_limit` entries. Per-worker success rates
/// come from counters updated on every `record`, so trimming never changes them.
#[derive(Debug)]
pub struct Ledger {
    outcomes: HashMap<TaskId, Outcome>,
    history: VecDeque<Outcome>,
    history_limit: usize,
    attempts: HashMap<WorkerId, AttemptCount>,
}

#[derive(Debug, Default, Clone, Copy)]
struct AttemptCount {
    succeeded: usize,
    total: usize,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            outcomes: HashMap::new(),
            history: VecDeque::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            attempts: HashMap::new(),
        }
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Store an outcome, returning the one it replaced.
    ///
    /// Every call counts as one attempt of the outcome's worker.
    pub fn record(&mut self, outcome: Outcome) -> Option<Outcome> {
        let count = self.attempts.entry(outcome.worker_id.clone()).or_default();
        count.total += 1;
        count.succeeded += usize::from(outcome.is_success());
        self.outcomes.insert(outcome.task_id.clone(), outcome)
    }

    /// Move a task's outcome into the attempt history.
    pub fn retract(&mut self, task_id: &TaskId) -> bool {
        match self.outcomes.remove(task_id) {
            Some(outcome) => {
                self.history.push_back(outcome);
                while self.history.len() > self.history_limit {
                    self.history.pop_front();
                }
                true
            }
            None => false,
        }
    }

    pub fn get(&self, task_id: &TaskId) -> Option<&Outcome> {
        self.outcomes.get(task_id)
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.outcomes.contains_key(task_id)
    }

    /// Whether the task's latest outcome is a success.
    pub fn is_succeeded(&self, task_id: &TaskId) -> bool {
        self.outcomes
            .get(task_id)
            .is_some_and(|o| o.state == OutcomeState::Succeeded)
    }

    pub fn total_completed(&self) -> usize {
        self.count_state(OutcomeState::Succeeded)
    }

    pub fn total_failed(&self) -> usize {
        self.count_state(OutcomeState::Failed)
    }

    fn count_state(&self, state: OutcomeState) -> usize {
        self.outcomes.values().filter(|o| o.state == state).count()
    }

    /// Success rate over every attempt the worker ran, `1.0` with no history.
    pub fn worker_success_rate(&self, worker_id: &str) -> f64 {
        match self.attempts.get(worker_id) {
            Some(count) if count.total > 0 => count.succeeded as f64 / count.total as f64,
            _ => 1.0,
        }
    }

    /// `completed / (completed + failed)` over terminal outcomes.
    ///
    /// Unlike the per-worker rate this is `0.0` when nothing has finished.
    pub fn overall_success_rate(&self) -> f64 {
        let completed = self.total_completed();
        let total = completed + self.total_failed();
        if total == 0 {
            return 0.0;
        }
        completed as f64 / total as f64
    }

    /// The most recent superseded attempts, oldest first.
    pub fn history(&self) -> &VecDeque<Outcome> {
        &self.history
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.values()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}
