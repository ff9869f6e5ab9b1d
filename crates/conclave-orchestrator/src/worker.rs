use crate::types::{Task, TaskOutput};
use async_trait::async_trait;
use conclave_core::ConclaveResult;

/// An executor that performs tasks within its declared capabilities.
///
/// Implementations own their internal state. Any `Err` returned from
/// [`Worker::execute`] is recorded by the dispatcher as a failed outcome.
/// The call may suspend for as long as the work takes; the dispatcher awaits it.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn execute(&self, task: &Task) -> ConclaveResult<TaskOutput>;
}
