use std::sync::Arc;
use std::time::SystemTime;

use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until, timeout};

use crate::backend::TaskBackend;
use crate::config::PollerConfig;
use crate::models::{
    EngineError, EngineErrorKind, OperationState, TaskId, TaskKind, TaskRecord, TaskStatus,
};
use crate::orchestration::control::OperationReporter;
use crate::orchestration::{
    ControlledOperation, OperationControl, OrchestrationResult, TaskCancellationToken,
    spawn_remote_cancel,
};

#[derive(Clone, Debug, PartialEq)]
pub enum TaskOutcome {
    Completed {
        task_id: TaskId,
        data: serde_json::Value,
    },
    /// Stopped on request. Not an error for callers.
    Cancelled { task_id: Option<TaskId> },
}

/// Starts server jobs and watches them to a terminal state.
#[derive(Clone)]
pub struct TaskPoller {
    backend: Arc<dyn TaskBackend>,
    config: PollerConfig,
}

impl TaskPoller {
    pub fn new(backend: Arc<dyn TaskBackend>, config: PollerConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Launch `kind` and poll it on a spawned task. Requires a tokio runtime.
    pub fn start(&self, kind: TaskKind, params: serde_json::Value) -> PollHandle {
        let token = TaskCancellationToken::new();
        let (reporter, control) = OperationReporter::channel(kind, token.clone());
        let run = PollRun {
            backend: self.backend.clone(),
            config: self.config,
            kind,
            token,
            reporter,
        };
        let join = tokio::spawn(run.execute(params));
        PollHandle { control, join }
    }
}

pub struct PollHandle {
    control: OperationControl,
    join: JoinHandle<OrchestrationResult<TaskOutcome>>,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn state(&self) -> OperationState {
        self.control.state()
    }

    pub async fn wait(self) -> OrchestrationResult<TaskOutcome> {
        self.join.await.map_err(|join_error| {
            EngineError::new(
                EngineErrorKind::Internal,
                format!("task poller join failure: {join_error}"),
            )
        })?
    }
}

impl ControlledOperation for PollHandle {
    fn control(&self) -> OperationControl {
        self.control.clone()
    }
}

struct PollRun {
    backend: Arc<dyn TaskBackend>,
    config: PollerConfig,
    kind: TaskKind,
    token: TaskCancellationToken,
    reporter: OperationReporter,
}

impl PollRun {
    async fn execute(self, params: serde_json::Value) -> OrchestrationResult<TaskOutcome> {
        let kind = self.kind;
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let started_at = SystemTime::now();

        self.reporter.transition(OperationState::Launching);
        // The launch is never abandoned mid-flight: a cancel that lands here
        // still needs the task id to stop the server job.
        let receipt = match self.backend.start_task(kind, &params).await {
            Ok(receipt) => receipt,
            Err(error) => {
                let error = EngineError {
                    kind: EngineErrorKind::LaunchFailure,
                    ..error
                }
                .with_task(kind);
                tracing::warn!(
                    kind = kind.as_str(),
                    message = %error.message,
                    "task launch failed"
                );
                self.reporter.transition(OperationState::Failed);
                return Err(error);
            }
        };

        let task_id = receipt.task_id;
        let mut record = TaskRecord {
            id: task_id.clone(),
            kind,
            status: TaskStatus::Processing,
            started_at,
        };
        self.reporter.record(&record);

        if self.token.is_cancelled() {
            return Ok(self.finish_cancelled(&task_id));
        }

        self.reporter.transition(OperationState::Polling);
        tracing::info!(task_id = %task_id, kind = kind.as_str(), "task launched");

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return Ok(self.finish_cancelled(&task_id)),
                _ = sleep(self.config.interval) => {}
            }

            let response = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Ok(self.finish_cancelled(&task_id)),
                response = timeout(self.config.request_timeout, self.backend.task_status(&task_id)) => response,
                // A response already in hand at the deadline still counts.
                _ = sleep_until(deadline) => return Err(self.finish_timed_out(&task_id)),
            };
            let response = response.unwrap_or_else(|_| {
                Err(EngineError::new(
                    EngineErrorKind::PollTransport,
                    format!(
                        "status request exceeded {}ms",
                        self.config.request_timeout.as_millis()
                    ),
                ))
            });

            match response {
                Ok(status) => {
                    record.status = status.status;
                    self.reporter.record(&record);
                    match status.status {
                        TaskStatus::Completed => {
                            tracing::info!(
                                task_id = %task_id,
                                kind = kind.as_str(),
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "task completed"
                            );
                            self.reporter.transition(OperationState::Completed);
                            return Ok(TaskOutcome::Completed {
                                task_id,
                                data: status.data.unwrap_or(serde_json::Value::Null),
                            });
                        }
                        TaskStatus::Failed => {
                            let message = status
                                .error
                                .unwrap_or_else(|| format!("task '{task_id}' failed"));
                            tracing::warn!(
                                task_id = %task_id,
                                kind = kind.as_str(),
                                message = %message,
                                "task reported failure"
                            );
                            self.reporter.transition(OperationState::Failed);
                            return Err(EngineError::new(EngineErrorKind::TaskFailed, message)
                                .with_task(kind)
                                .with_task_id(&task_id));
                        }
                        TaskStatus::Processing => {}
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        task_id = %task_id,
                        kind = kind.as_str(),
                        message = %error.message,
                        "status check failed; retrying on next tick"
                    );
                }
            }

            if Instant::now() >= deadline {
                return Err(self.finish_timed_out(&task_id));
            }
        }
    }

    fn finish_timed_out(&self, task_id: &TaskId) -> EngineError {
        tracing::warn!(
            task_id = %task_id,
            kind = self.kind.as_str(),
            timeout_ms = self.config.timeout.as_millis() as u64,
            "task exceeded its time budget"
        );
        self.reporter.transition(OperationState::TimedOut);
        spawn_remote_cancel(
            self.backend.clone(),
            task_id.clone(),
            self.config.request_timeout,
        );
        EngineError::new(
            EngineErrorKind::Timeout,
            format!(
                "task '{task_id}' did not finish within {}s",
                self.config.timeout.as_secs()
            ),
        )
        .with_task(self.kind)
        .with_task_id(task_id)
    }

    fn finish_cancelled(&self, task_id: &TaskId) -> TaskOutcome {
        tracing::info!(task_id = %task_id, kind = self.kind.as_str(), "task polling cancelled");
        self.reporter.transition(OperationState::Cancelled);
        spawn_remote_cancel(
            self.backend.clone(),
            task_id.clone(),
            self.config.request_timeout,
        );
        TaskOutcome::Cancelled {
            task_id: Some(task_id.clone()),
        }
    }
}
