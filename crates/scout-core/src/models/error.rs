use crate::models::{TaskId, TaskKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EngineErrorKind {
    LaunchFailure,
    PollTransport,
    TaskFailed,
    Timeout,
    MutationFailure,
    InvalidInput,
    ParseFailure,
    StorageFailure,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct EngineError {
    pub task: Option<TaskKind>,
    pub task_id: Option<TaskId>,
    pub kind: EngineErrorKind,
    pub message: String,
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            task: None,
            task_id: None,
            kind,
            message: message.into(),
        }
    }

    pub fn with_task(mut self, task: TaskKind) -> Self {
        self.task = self.task.or(Some(task));
        self
    }

    pub fn with_task_id(mut self, task_id: &TaskId) -> Self {
        if self.task_id.is_none() {
            self.task_id = Some(task_id.clone());
        }
        self
    }

    /// Short user-facing status line.
    ///
    /// Server-reported task failures are shown verbatim; every other kind
    /// gets a generic line so transport details never reach the banner.
    pub fn banner(&self) -> String {
        match self.kind {
            EngineErrorKind::TaskFailed => self.message.clone(),
            EngineErrorKind::LaunchFailure => "Could not start the search.".to_string(),
            EngineErrorKind::Timeout => {
                "The search took too long and was stopped. Please try again.".to_string()
            }
            EngineErrorKind::MutationFailure => {
                "Could not save your change. Please try again.".to_string()
            }
            EngineErrorKind::PollTransport => {
                "Lost contact with the server while checking progress.".to_string()
            }
            EngineErrorKind::InvalidInput
            | EngineErrorKind::ParseFailure
            | EngineErrorKind::StorageFailure
            | EngineErrorKind::Internal => "Something went wrong.".to_string(),
        }
    }
}
