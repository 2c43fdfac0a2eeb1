use std::sync::Arc;

use tokio::sync::watch;

use crate::models::{OperationState, TaskKind, TaskRecord};

/// Cooperative cancellation flag shared between a handle and its polling loop.
#[derive(Clone, Debug)]
pub struct TaskCancellationToken {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for TaskCancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskCancellationToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once `cancel` has been called, immediately if it already was.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperationSnapshot {
    pub kind: TaskKind,
    pub state: OperationState,
    pub task: Option<TaskRecord>,
}

/// Cloneable view of a running poller or coordinator: observe and cancel.
#[derive(Clone, Debug)]
pub struct OperationControl {
    token: TaskCancellationToken,
    snapshot: watch::Receiver<OperationSnapshot>,
}

impl OperationControl {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn snapshot(&self) -> OperationSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> OperationState {
        self.snapshot.borrow().state
    }

    pub fn kind(&self) -> TaskKind {
        self.snapshot.borrow().kind
    }

    pub fn is_live(&self) -> bool {
        !self.state().is_terminal()
    }

    pub async fn wait_terminal(&self) -> OperationState {
        let mut receiver = self.snapshot.clone();
        let outcome = receiver
            .wait_for(|snapshot| snapshot.state.is_terminal())
            .await
            .map(|snapshot| snapshot.state);
        match outcome {
            Ok(state) => state,
            Err(_) => receiver.borrow().state,
        }
    }
}

/// Anything that can be parked in an [`OperationSlot`](crate::orchestration::OperationSlot).
pub trait ControlledOperation {
    fn control(&self) -> OperationControl;
}

/// Writer half owned by the spawned loop.
pub(crate) struct OperationReporter {
    sender: watch::Sender<OperationSnapshot>,
}

impl OperationReporter {
    pub(crate) fn channel(
        kind: TaskKind,
        token: TaskCancellationToken,
    ) -> (OperationReporter, OperationControl) {
        let (sender, receiver) = watch::channel(OperationSnapshot {
            kind,
            state: OperationState::Idle,
            task: None,
        });
        (
            OperationReporter { sender },
            OperationControl {
                token,
                snapshot: receiver,
            },
        )
    }

    pub(crate) fn transition(&self, state: OperationState) {
        self.sender.send_modify(|snapshot| {
            if !snapshot.state.is_terminal() {
                snapshot.state = state;
            }
        });
    }

    pub(crate) fn record(&self, task: &TaskRecord) {
        self.sender.send_modify(|snapshot| snapshot.task = Some(task.clone()));
    }
}
