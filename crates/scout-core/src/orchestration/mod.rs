pub mod combined;
pub mod control;
pub mod poller;
pub mod slot;

pub use combined::{
    CombinedOutcome, CombinedSearchCoordinator, CombinedSearchHandle, CombinedTermination,
    SearchProgress,
};
pub use control::{
    ControlledOperation, OperationControl, OperationSnapshot, TaskCancellationToken,
};
pub use poller::{PollHandle, TaskOutcome, TaskPoller};
pub use slot::OperationSlot;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::backend::TaskBackend;
use crate::models::{EngineError, TaskId};

pub type OrchestrationResult<T> = Result<T, EngineError>;

/// Ask the server to stop a job without waiting for the answer. Failures are
/// logged and otherwise ignored.
pub(crate) fn spawn_remote_cancel(
    backend: Arc<dyn TaskBackend>,
    task_id: TaskId,
    request_timeout: Duration,
) {
    tokio::spawn(async move {
        match timeout(request_timeout, backend.cancel_task(&task_id)).await {
            Ok(Ok(())) => {
                tracing::debug!(task_id = %task_id, "remote cancel acknowledged");
            }
            Ok(Err(error)) => {
                tracing::warn!(
                    task_id = %task_id,
                    kind = ?error.kind,
                    message = %error.message,
                    "remote cancel failed"
                );
            }
            Err(_) => {
                tracing::warn!(task_id = %task_id, "remote cancel timed out");
            }
        }
    });
}
