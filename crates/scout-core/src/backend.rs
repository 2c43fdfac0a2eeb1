use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::models::{
    CandidateRecord, CandidateSource, EngineError, EngineErrorKind, EngineResult, TaskId, TaskKind,
    TaskStatus,
};

pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = EngineResult<T>> + Send + 'a>>;

/// Response of a start call.
///
/// Combined launches report the tracked sourcing task separately; degraded
/// single-task launches leave `apollo_task_id` empty.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LaunchReceipt {
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apollo_task_id: Option<TaskId>,
}

impl LaunchReceipt {
    pub fn single(task_id: TaskId) -> Self {
        Self {
            task_id,
            apollo_task_id: None,
        }
    }

    /// Id whose status decides when a combined search is finished.
    pub fn tracked_task_id(&self) -> &TaskId {
        self.apollo_task_id.as_ref().unwrap_or(&self.task_id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteTaskStatus {
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RemoteTaskStatus {
    pub fn processing() -> Self {
        Self {
            status: TaskStatus::Processing,
            data: None,
            error: None,
        }
    }

    pub fn completed(data: serde_json::Value) -> Self {
        Self {
            status: TaskStatus::Completed,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            data: None,
            error: Some(error.into()),
        }
    }
}

pub trait TaskBackend: Send + Sync {
    fn start_task<'a>(
        &'a self,
        kind: TaskKind,
        params: &'a serde_json::Value,
    ) -> BackendFuture<'a, LaunchReceipt>;

    fn task_status<'a>(&'a self, task_id: &'a TaskId) -> BackendFuture<'a, RemoteTaskStatus>;

    fn cancel_task<'a>(&'a self, task_id: &'a TaskId) -> BackendFuture<'a, ()>;

    /// Full snapshot of rows created at or after `since`, not a delta.
    fn fetch_incremental_results<'a>(
        &'a self,
        jd_id: &'a str,
        since: OffsetDateTime,
    ) -> BackendFuture<'a, Vec<CandidateRecord>>;
}

pub trait CandidateBackend: Send + Sync {
    fn set_favorite<'a>(
        &'a self,
        candidate_id: &'a str,
        source: CandidateSource,
        value: bool,
    ) -> BackendFuture<'a, ()>;

    fn set_save_for_future<'a>(
        &'a self,
        candidate_id: &'a str,
        source: CandidateSource,
        value: bool,
    ) -> BackendFuture<'a, ()>;

    fn fetch_current_list<'a>(
        &'a self,
        jd_id: Option<&'a str>,
    ) -> BackendFuture<'a, Vec<CandidateRecord>>;
}

/// Decode a completed task payload into candidate rows.
///
/// Accepts either a bare array or an object carrying a `candidates` array.
pub fn decode_candidates(payload: &serde_json::Value) -> EngineResult<Vec<CandidateRecord>> {
    let rows = match payload {
        serde_json::Value::Object(map) => map.get("candidates").unwrap_or(payload),
        _ => payload,
    };

    let candidates: Vec<CandidateRecord> =
        serde_json::from_value(rows.clone()).map_err(|error| {
            EngineError::new(
                EngineErrorKind::ParseFailure,
                format!("task payload is not a candidate list: {error}"),
            )
        })?;

    for candidate in &candidates {
        candidate.validate()?;
    }
    Ok(candidates)
}

/// RFC 3339 rendering used when a backend puts `since` on the wire.
pub fn format_since(since: OffsetDateTime) -> EngineResult<String> {
    since
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|error| {
            EngineError::new(
                EngineErrorKind::InvalidInput,
                format!("failed to format incremental cursor: {error}"),
            )
        })
}
