use std::sync::Arc;
use std::time::SystemTime;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until, timeout};

use crate::backend::{LaunchReceipt, TaskBackend};
use crate::config::CombinedSearchConfig;
use crate::models::{
    CandidateRecord, EngineError, EngineErrorKind, EngineResult, OperationState, TaskId, TaskKind,
    TaskRecord, TaskStatus,
};
use crate::orchestration::control::OperationReporter;
use crate::orchestration::{
    ControlledOperation, OperationControl, OrchestrationResult, TaskCancellationToken,
    spawn_remote_cancel,
};

/// Latest incremental snapshot of a running combined search.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SearchProgress {
    pub candidates: Vec<CandidateRecord>,
    pub refreshes: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CombinedTermination {
    Completed,
    /// Budget exhausted with no outstanding error; partial results are kept.
    TimedOut,
    Cancelled,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CombinedOutcome {
    pub termination: CombinedTermination,
    pub candidates: Vec<CandidateRecord>,
    pub task_id: Option<TaskId>,
}

/// Runs the incremental result feed and the final sourcing task as one search.
#[derive(Clone)]
pub struct CombinedSearchCoordinator {
    backend: Arc<dyn TaskBackend>,
    config: CombinedSearchConfig,
}

impl CombinedSearchCoordinator {
    pub fn new(backend: Arc<dyn TaskBackend>, config: CombinedSearchConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &CombinedSearchConfig {
        &self.config
    }

    /// Launch a `CombinedSearch` task and follow it.
    ///
    /// `since` is captured before the launch call so no row produced by the
    /// new search can predate it.
    pub fn start(&self, jd_id: impl Into<String>, params: serde_json::Value) -> CombinedSearchHandle {
        let since = OffsetDateTime::now_utc();
        self.spawn(jd_id.into(), since, Launch::Request(params))
    }

    /// Follow a search whose launch already happened elsewhere.
    pub fn follow(
        &self,
        jd_id: impl Into<String>,
        since: OffsetDateTime,
        apollo_task_id: Option<TaskId>,
    ) -> CombinedSearchHandle {
        self.spawn(jd_id.into(), since, Launch::Known(apollo_task_id))
    }

    fn spawn(&self, jd_id: String, since: OffsetDateTime, launch: Launch) -> CombinedSearchHandle {
        let token = TaskCancellationToken::new();
        let (reporter, control) =
            OperationReporter::channel(TaskKind::CombinedSearch, token.clone());
        let (progress_tx, progress_rx) = watch::channel(SearchProgress::default());
        let run = CombinedRun {
            backend: self.backend.clone(),
            config: self.config,
            jd_id,
            since,
            token,
            reporter,
            progress: progress_tx,
        };
        let join = tokio::spawn(run.execute(launch));
        CombinedSearchHandle {
            control,
            progress: progress_rx,
            since,
            join,
        }
    }
}

enum Launch {
    Request(serde_json::Value),
    Known(Option<TaskId>),
}

pub struct CombinedSearchHandle {
    control: OperationControl,
    progress: watch::Receiver<SearchProgress>,
    since: OffsetDateTime,
    join: JoinHandle<OrchestrationResult<CombinedOutcome>>,
}

impl CombinedSearchHandle {
    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn state(&self) -> OperationState {
        self.control.state()
    }

    pub fn since(&self) -> OffsetDateTime {
        self.since
    }

    pub fn progress(&self) -> watch::Receiver<SearchProgress> {
        self.progress.clone()
    }

    pub async fn wait(self) -> OrchestrationResult<CombinedOutcome> {
        self.join.await.map_err(|join_error| {
            EngineError::new(
                EngineErrorKind::Internal,
                format!("combined search join failure: {join_error}"),
            )
        })?
    }
}

impl ControlledOperation for CombinedSearchHandle {
    fn control(&self) -> OperationControl {
        self.control.clone()
    }
}

struct CombinedRun {
    backend: Arc<dyn TaskBackend>,
    config: CombinedSearchConfig,
    jd_id: String,
    since: OffsetDateTime,
    token: TaskCancellationToken,
    reporter: OperationReporter,
    progress: watch::Sender<SearchProgress>,
}

impl CombinedRun {
    async fn execute(self, launch: Launch) -> OrchestrationResult<CombinedOutcome> {
        let deadline = Instant::now() + self.config.timeout;
        let tracked = match launch {
            Launch::Known(task_id) => task_id,
            Launch::Request(params) => {
                self.reporter.transition(OperationState::Launching);
                let receipt = self.launch(&params).await?;
                Some(receipt.tracked_task_id().clone())
            }
        };

        let mut record = tracked.as_ref().map(|task_id| TaskRecord {
            id: task_id.clone(),
            kind: TaskKind::CombinedSearch,
            status: TaskStatus::Processing,
            started_at: SystemTime::now(),
        });
        if let Some(record) = &record {
            self.reporter.record(record);
        }

        if self.token.is_cancelled() {
            return Ok(self.finish_cancelled(tracked));
        }
        self.reporter.transition(OperationState::Polling);
        tracing::info!(
            jd_id = %self.jd_id,
            task_id = ?tracked.as_ref().map(TaskId::as_str),
            "combined search started"
        );

        let termination = loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return Ok(self.finish_cancelled(tracked)),
                _ = sleep(self.config.refresh_interval) => {}
            }

            let fetched = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Ok(self.finish_cancelled(tracked)),
                fetched = self.fetch_snapshot() => Some(fetched),
                _ = sleep_until(deadline) => None,
            };
            let Some(fetched) = fetched else {
                break self.time_out(&tracked, None)?;
            };

            let mut outstanding: Option<EngineError> = None;
            match fetched {
                Ok(candidates) => self.publish(candidates),
                Err(error) => {
                    tracing::warn!(
                        jd_id = %self.jd_id,
                        message = %error.message,
                        "incremental fetch failed; retrying on next tick"
                    );
                    outstanding = Some(error);
                }
            }

            if let Some(task_id) = &tracked {
                let response = tokio::select! {
                    biased;
                    _ = self.token.cancelled() => return Ok(self.finish_cancelled(tracked.clone())),
                    response = timeout(self.config.request_timeout, self.backend.task_status(task_id)) => Some(response),
                    _ = sleep_until(deadline) => None,
                };
                let Some(response) = response else {
                    break self.time_out(&tracked, outstanding)?;
                };
                let response = response.unwrap_or_else(|_| {
                    Err(EngineError::new(
                        EngineErrorKind::PollTransport,
                        "status request timed out",
                    ))
                });

                match response {
                    Ok(status) => {
                        if let Some(record) = record.as_mut() {
                            record.status = status.status;
                            self.reporter.record(record);
                        }
                        match status.status {
                            TaskStatus::Completed => break CombinedTermination::Completed,
                            TaskStatus::Failed => {
                                let message = status
                                    .error
                                    .unwrap_or_else(|| format!("task '{task_id}' failed"));
                                tracing::warn!(
                                    jd_id = %self.jd_id,
                                    task_id = %task_id,
                                    message = %message,
                                    "combined search task reported failure"
                                );
                                self.reporter.transition(OperationState::Failed);
                                return Err(EngineError::new(EngineErrorKind::TaskFailed, message)
                                    .with_task(TaskKind::CombinedSearch)
                                    .with_task_id(task_id));
                            }
                            TaskStatus::Processing => {}
                        }
                    }
                    Err(error) => {
                        tracing::warn!(
                            jd_id = %self.jd_id,
                            task_id = %task_id,
                            message = %error.message,
                            "combined search status check failed; retrying on next tick"
                        );
                        outstanding = Some(error);
                    }
                }
            }

            if Instant::now() >= deadline {
                break self.time_out(&tracked, outstanding)?;
            }
        };

        // One last read so rows written just before the terminal status are
        // not lost.
        let candidates = match self.fetch_snapshot().await {
            Ok(candidates) => {
                self.publish(candidates.clone());
                candidates
            }
            Err(error) => {
                tracing::warn!(
                    jd_id = %self.jd_id,
                    message = %error.message,
                    "final incremental fetch failed; keeping last snapshot"
                );
                self.progress.borrow().candidates.clone()
            }
        };

        self.reporter.transition(match termination {
            CombinedTermination::Completed => OperationState::Completed,
            CombinedTermination::TimedOut => OperationState::TimedOut,
            CombinedTermination::Cancelled => OperationState::Cancelled,
        });
        tracing::info!(
            jd_id = %self.jd_id,
            candidates = candidates.len(),
            termination = ?termination,
            "combined search finished"
        );

        Ok(CombinedOutcome {
            termination,
            candidates,
            task_id: tracked,
        })
    }

    async fn launch(&self, params: &serde_json::Value) -> OrchestrationResult<LaunchReceipt> {
        match self
            .backend
            .start_task(TaskKind::CombinedSearch, params)
            .await
        {
            Ok(receipt) => {
                if receipt.apollo_task_id.is_none() {
                    tracing::info!(
                        jd_id = %self.jd_id,
                        task_id = %receipt.task_id,
                        "combined launch returned a single task; tracking it directly"
                    );
                }
                Ok(receipt)
            }
            Err(error) => {
                tracing::warn!(
                    jd_id = %self.jd_id,
                    message = %error.message,
                    "combined search launch failed"
                );
                self.reporter.transition(OperationState::Failed);
                Err(EngineError {
                    kind: EngineErrorKind::LaunchFailure,
                    ..error
                }
                .with_task(TaskKind::CombinedSearch))
            }
        }
    }

    async fn fetch_snapshot(&self) -> EngineResult<Vec<CandidateRecord>> {
        timeout(
            self.config.request_timeout,
            self.backend
                .fetch_incremental_results(&self.jd_id, self.since),
        )
        .await
        .unwrap_or_else(|_| {
            Err(EngineError::new(
                EngineErrorKind::PollTransport,
                "incremental fetch timed out",
            ))
        })
    }

    fn publish(&self, candidates: Vec<CandidateRecord>) {
        self.progress.send_modify(|progress| {
            progress.candidates = candidates;
            progress.refreshes = progress.refreshes.saturating_add(1);
        });
    }

    /// Budget exhausted: an outstanding error ends the search as a timeout
    /// error, otherwise it ends as `TimedOut` and keeps the partial rows.
    fn time_out(
        &self,
        tracked: &Option<TaskId>,
        outstanding: Option<EngineError>,
    ) -> OrchestrationResult<CombinedTermination> {
        tracing::warn!(
            jd_id = %self.jd_id,
            timeout_ms = self.config.timeout.as_millis() as u64,
            "combined search exceeded its time budget"
        );
        if let Some(task_id) = tracked {
            spawn_remote_cancel(
                self.backend.clone(),
                task_id.clone(),
                self.config.request_timeout,
            );
        }
        let Some(cause) = outstanding else {
            return Ok(CombinedTermination::TimedOut);
        };
        self.reporter.transition(OperationState::TimedOut);
        let mut error = EngineError::new(
            EngineErrorKind::Timeout,
            format!(
                "combined search did not finish within {}s (last error: {})",
                self.config.timeout.as_secs(),
                cause.message
            ),
        )
        .with_task(TaskKind::CombinedSearch);
        if let Some(task_id) = tracked {
            error = error.with_task_id(task_id);
        }
        Err(error)
    }

    fn finish_cancelled(&self, tracked: Option<TaskId>) -> CombinedOutcome {
        tracing::info!(jd_id = %self.jd_id, "combined search cancelled");
        self.reporter.transition(OperationState::Cancelled);
        if let Some(task_id) = &tracked {
            spawn_remote_cancel(
                self.backend.clone(),
                task_id.clone(),
                self.config.request_timeout,
            );
        }
        CombinedOutcome {
            termination: CombinedTermination::Cancelled,
            candidates: self.progress.borrow().candidates.clone(),
            task_id: tracked,
        }
    }
}
