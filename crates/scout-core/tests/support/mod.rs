#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use scout_core::backend::{
    BackendFuture, CandidateBackend, LaunchReceipt, RemoteTaskStatus, TaskBackend,
};
use scout_core::models::{
    CandidateIds, CandidateRecord, CandidateSource, EngineError, EngineErrorKind, EngineResult,
    TaskId, TaskKind,
};
use time::OffsetDateTime;
use tokio::time::Instant;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TaskCall {
    Start(TaskKind),
    Status(TaskId),
    Cancel(TaskId),
    Incremental(String),
}

type LaunchScript = Box<dyn Fn(TaskKind, u32) -> EngineResult<LaunchReceipt> + Send + Sync>;
type StatusScript =
    Box<dyn Fn(&TaskId, u32, Duration) -> EngineResult<RemoteTaskStatus> + Send + Sync>;
type IncrementalScript =
    Box<dyn Fn(u32, Duration) -> EngineResult<Vec<CandidateRecord>> + Send + Sync>;

/// Task backend driven by closures over (call index, elapsed virtual time).
pub struct ScriptedTaskBackend {
    origin: Instant,
    launch_delay: Duration,
    status_delay: Duration,
    cancel_delay: Duration,
    launch: LaunchScript,
    status: StatusScript,
    incremental: IncrementalScript,
    counters: Mutex<[u32; 4]>,
    calls: Mutex<Vec<(Duration, TaskCall)>>,
    since_seen: Mutex<Vec<OffsetDateTime>>,
}

impl ScriptedTaskBackend {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            launch_delay: Duration::ZERO,
            status_delay: Duration::ZERO,
            cancel_delay: Duration::ZERO,
            launch: Box::new(|_, index| {
                Ok(LaunchReceipt::single(TaskId::new(format!("task-{}", index + 1))))
            }),
            status: Box::new(|_, _, _| Ok(RemoteTaskStatus::processing())),
            incremental: Box::new(|_, _| Ok(Vec::new())),
            counters: Mutex::new([0; 4]),
            calls: Mutex::new(Vec::new()),
            since_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    /// Each status response arrives this long after the request.
    pub fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = delay;
        self
    }

    /// Cancel requests are recorded on arrival and acknowledged after `delay`.
    pub fn with_cancel_delay(mut self, delay: Duration) -> Self {
        self.cancel_delay = delay;
        self
    }

    pub fn with_launch(
        mut self,
        script: impl Fn(TaskKind, u32) -> EngineResult<LaunchReceipt> + Send + Sync + 'static,
    ) -> Self {
        self.launch = Box::new(script);
        self
    }

    pub fn with_status(
        mut self,
        script: impl Fn(&TaskId, u32, Duration) -> EngineResult<RemoteTaskStatus>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.status = Box::new(script);
        self
    }

    pub fn with_incremental(
        mut self,
        script: impl Fn(u32, Duration) -> EngineResult<Vec<CandidateRecord>> + Send + Sync + 'static,
    ) -> Self {
        self.incremental = Box::new(script);
        self
    }

    pub fn calls(&self) -> Vec<TaskCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn timed_calls(&self) -> Vec<(Duration, TaskCall)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn since_seen(&self) -> Vec<OffsetDateTime> {
        self.since_seen.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.count(|call| matches!(call, TaskCall::Status(_)))
    }

    pub fn cancel_calls(&self) -> Vec<TaskId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TaskCall::Cancel(task_id) => Some(task_id),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&TaskCall) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: TaskCall) -> (u32, Duration) {
        let elapsed = self.origin.elapsed();
        let slot = match call {
            TaskCall::Start(_) => 0,
            TaskCall::Status(_) => 1,
            TaskCall::Cancel(_) => 2,
            TaskCall::Incremental(_) => 3,
        };
        let index = {
            let mut counters = self.counters.lock().unwrap();
            let index = counters[slot];
            counters[slot] += 1;
            index
        };
        self.calls.lock().unwrap().push((elapsed, call));
        (index, elapsed)
    }
}

impl TaskBackend for ScriptedTaskBackend {
    fn start_task<'a>(
        &'a self,
        kind: TaskKind,
        _params: &'a serde_json::Value,
    ) -> BackendFuture<'a, LaunchReceipt> {
        Box::pin(async move {
            let (index, _) = self.record(TaskCall::Start(kind));
            if !self.launch_delay.is_zero() {
                tokio::time::sleep(self.launch_delay).await;
            }
            (self.launch)(kind, index)
        })
    }

    fn task_status<'a>(&'a self, task_id: &'a TaskId) -> BackendFuture<'a, RemoteTaskStatus> {
        Box::pin(async move {
            let (index, elapsed) = self.record(TaskCall::Status(task_id.clone()));
            if !self.status_delay.is_zero() {
                tokio::time::sleep(self.status_delay).await;
            }
            (self.status)(task_id, index, elapsed)
        })
    }

    fn cancel_task<'a>(&'a self, task_id: &'a TaskId) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.record(TaskCall::Cancel(task_id.clone()));
            if !self.cancel_delay.is_zero() {
                tokio::time::sleep(self.cancel_delay).await;
            }
            Ok(())
        })
    }

    fn fetch_incremental_results<'a>(
        &'a self,
        jd_id: &'a str,
        since: OffsetDateTime,
    ) -> BackendFuture<'a, Vec<CandidateRecord>> {
        Box::pin(async move {
            self.since_seen.lock().unwrap().push(since);
            let (index, elapsed) = self.record(TaskCall::Incremental(jd_id.to_string()));
            (self.incremental)(index, elapsed)
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MutationCall {
    pub field: &'static str,
    pub candidate_id: String,
    pub source: CandidateSource,
    pub value: bool,
}

/// Candidate backend with a switchable rejection mode.
#[derive(Default)]
pub struct FakeCandidateBackend {
    reject: Mutex<bool>,
    current_list: Mutex<Vec<CandidateRecord>>,
    calls: Mutex<Vec<MutationCall>>,
    list_requests: Mutex<Vec<Option<String>>>,
}

impl FakeCandidateBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        let backend = Self::default();
        *backend.reject.lock().unwrap() = true;
        backend
    }

    pub fn set_current_list(&self, candidates: Vec<CandidateRecord>) {
        *self.current_list.lock().unwrap() = candidates;
    }

    pub fn calls(&self) -> Vec<MutationCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn list_requests(&self) -> Vec<Option<String>> {
        self.list_requests.lock().unwrap().clone()
    }

    fn mutate(
        &self,
        field: &'static str,
        candidate_id: &str,
        source: CandidateSource,
        value: bool,
    ) -> EngineResult<()> {
        self.calls.lock().unwrap().push(MutationCall {
            field,
            candidate_id: candidate_id.to_string(),
            source,
            value,
        });
        if *self.reject.lock().unwrap() {
            return Err(EngineError::new(
                EngineErrorKind::PollTransport,
                "server returned 503",
            ));
        }
        Ok(())
    }
}

impl CandidateBackend for FakeCandidateBackend {
    fn set_favorite<'a>(
        &'a self,
        candidate_id: &'a str,
        source: CandidateSource,
        value: bool,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move { self.mutate("favorite", candidate_id, source, value) })
    }

    fn set_save_for_future<'a>(
        &'a self,
        candidate_id: &'a str,
        source: CandidateSource,
        value: bool,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move { self.mutate("save_for_future", candidate_id, source, value) })
    }

    fn fetch_current_list<'a>(
        &'a self,
        jd_id: Option<&'a str>,
    ) -> BackendFuture<'a, Vec<CandidateRecord>> {
        Box::pin(async move {
            self.list_requests
                .lock()
                .unwrap()
                .push(jd_id.map(str::to_string));
            Ok(self.current_list.lock().unwrap().clone())
        })
    }
}

pub fn candidate(ids: CandidateIds, name: &str) -> CandidateRecord {
    CandidateRecord::new(ids, name)
}

pub fn ranked_rows(count: usize) -> Vec<CandidateRecord> {
    (1..=count)
        .map(|index| candidate(CandidateIds::ranked(format!("r{index}")), &format!("Candidate {index}")))
        .collect()
}

pub fn transport_error(message: &str) -> EngineError {
    EngineError::new(EngineErrorKind::PollTransport, message)
}

pub fn test_db_path(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("scout-{test_name}-{nanos}.sqlite3"))
}

/// Let spawned tasks drain their queues without advancing time.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
