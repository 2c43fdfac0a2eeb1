mod support;

use std::sync::Arc;
use std::time::Duration;

use scout_core::backend::{LaunchReceipt, RemoteTaskStatus};
use scout_core::config::CombinedSearchConfig;
use scout_core::models::{EngineErrorKind, EngineResult, OperationState, TaskId, TaskKind};
use scout_core::orchestration::{CombinedSearchCoordinator, CombinedTermination, ControlledOperation};
use serde_json::json;
use support::{ScriptedTaskBackend, TaskCall, ranked_rows, settle, transport_error};
use time::OffsetDateTime;

fn config(timeout_secs: u64) -> CombinedSearchConfig {
    CombinedSearchConfig::default()
        .with_refresh_interval(Duration::from_secs(1))
        .with_timeout(Duration::from_secs(timeout_secs))
}

fn two_task_launch() -> impl Fn(TaskKind, u32) -> EngineResult<LaunchReceipt> + Send + Sync + 'static {
    |_, _| {
        Ok(LaunchReceipt {
            task_id: TaskId::new("combined-1"),
            apollo_task_id: Some(TaskId::new("apollo-1")),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn exactly_one_fetch_follows_the_terminal_status() {
    let backend = Arc::new(
        ScriptedTaskBackend::new()
            .with_launch(two_task_launch())
            .with_incremental(|index, _| Ok(ranked_rows(index as usize + 1)))
            .with_status(|_, index, _| {
                if index == 2 {
                    Ok(RemoteTaskStatus::completed(json!(null)))
                } else {
                    Ok(RemoteTaskStatus::processing())
                }
            }),
    );
    let coordinator = CombinedSearchCoordinator::new(backend.clone(), config(900));

    let before_launch = OffsetDateTime::now_utc();
    let handle = coordinator.start("jd-42", json!({ "limit": 50 }));
    let since = handle.since();
    let progress = handle.progress();
    let outcome = handle.wait().await.unwrap();

    assert_eq!(outcome.termination, CombinedTermination::Completed);
    assert_eq!(outcome.task_id, Some(TaskId::new("apollo-1")));
    assert_eq!(outcome.candidates, ranked_rows(4));

    let calls = backend.calls();
    assert_eq!(calls[0], TaskCall::Start(TaskKind::CombinedSearch));
    let last_status = calls
        .iter()
        .rposition(|call| matches!(call, TaskCall::Status(_)))
        .unwrap();
    assert_eq!(calls[last_status], TaskCall::Status(TaskId::new("apollo-1")));
    let fetches_after_terminal = calls[last_status + 1..]
        .iter()
        .filter(|call| matches!(call, TaskCall::Incremental(_)))
        .count();
    assert_eq!(fetches_after_terminal, 1);
    assert_eq!(calls.len(), last_status + 2);

    let snapshot = progress.borrow().clone();
    assert_eq!(snapshot.refreshes, 4);
    assert_eq!(snapshot.candidates.len(), 4);

    assert!(since >= before_launch);
    assert!(backend.since_seen().iter().all(|seen| *seen == since));
}

#[tokio::test(start_paused = true)]
async fn degraded_single_task_launch_tracks_the_returned_id() {
    let backend = Arc::new(
        ScriptedTaskBackend::new()
            .with_incremental(|_, _| Ok(ranked_rows(2)))
            .with_status(|_, index, _| {
                if index == 0 {
                    Ok(RemoteTaskStatus::processing())
                } else {
                    Ok(RemoteTaskStatus::completed(json!(null)))
                }
            }),
    );
    let coordinator = CombinedSearchCoordinator::new(backend.clone(), config(900));

    let outcome = coordinator.start("jd-1", json!({})).wait().await.unwrap();

    assert_eq!(outcome.termination, CombinedTermination::Completed);
    assert_eq!(outcome.task_id, Some(TaskId::new("task-1")));
    assert!(
        backend
            .calls()
            .iter()
            .filter(|call| matches!(call, TaskCall::Status(_)))
            .all(|call| *call == TaskCall::Status(TaskId::new("task-1")))
    );
}

#[tokio::test(start_paused = true)]
async fn following_without_a_task_id_runs_until_the_budget_and_keeps_partial_rows() {
    let backend =
        Arc::new(ScriptedTaskBackend::new().with_incremental(|index, _| Ok(ranked_rows(index as usize))));
    let coordinator = CombinedSearchCoordinator::new(backend.clone(), config(5));

    let since = OffsetDateTime::now_utc();
    let handle = coordinator.follow("jd-3", since, None);
    let control = handle.control();
    let outcome = handle.wait().await.unwrap();

    assert_eq!(outcome.termination, CombinedTermination::TimedOut);
    assert_eq!(outcome.task_id, None);
    assert_eq!(outcome.candidates, ranked_rows(5));
    assert_eq!(control.state(), OperationState::TimedOut);
    assert_eq!(backend.status_calls(), 0);
    assert!(backend.cancel_calls().is_empty());
    assert_eq!(
        backend.count(|call| matches!(call, TaskCall::Incremental(_))),
        6
    );
}

#[tokio::test(start_paused = true)]
async fn failed_status_ends_the_search_immediately() {
    let backend = Arc::new(
        ScriptedTaskBackend::new()
            .with_launch(two_task_launch())
            .with_incremental(|_, _| Ok(ranked_rows(1)))
            .with_status(|_, index, _| {
                if index == 1 {
                    Ok(RemoteTaskStatus::failed("LinkedIn sourcing is disabled"))
                } else {
                    Ok(RemoteTaskStatus::processing())
                }
            }),
    );
    let coordinator = CombinedSearchCoordinator::new(backend.clone(), config(900));

    let handle = coordinator.start("jd-9", json!({}));
    let control = handle.control();
    let error = handle.wait().await.unwrap_err();

    assert_eq!(error.kind, EngineErrorKind::TaskFailed);
    assert_eq!(error.message, "LinkedIn sourcing is disabled");
    assert_eq!(error.task_id, Some(TaskId::new("apollo-1")));
    assert_eq!(control.state(), OperationState::Failed);
    assert!(matches!(backend.calls().last(), Some(TaskCall::Status(_))));
}

#[tokio::test(start_paused = true)]
async fn one_bad_fetch_does_not_end_the_search() {
    let backend = Arc::new(
        ScriptedTaskBackend::new()
            .with_launch(two_task_launch())
            .with_incremental(|index, _| {
                if index == 1 {
                    Err(transport_error("504 gateway timeout"))
                } else {
                    Ok(ranked_rows(index as usize + 1))
                }
            })
            .with_status(|_, index, _| {
                if index == 3 {
                    Ok(RemoteTaskStatus::completed(json!(null)))
                } else {
                    Ok(RemoteTaskStatus::processing())
                }
            }),
    );
    let coordinator = CombinedSearchCoordinator::new(backend.clone(), config(900));

    let outcome = coordinator.start("jd-2", json!({})).wait().await.unwrap();

    assert_eq!(outcome.termination, CombinedTermination::Completed);
    assert_eq!(outcome.candidates, ranked_rows(5));
}

#[tokio::test(start_paused = true)]
async fn timeout_with_an_outstanding_error_surfaces_a_timeout() {
    let backend = Arc::new(
        ScriptedTaskBackend::new()
            .with_launch(two_task_launch())
            .with_incremental(|_, _| Err(transport_error("connection refused"))),
    );
    let coordinator = CombinedSearchCoordinator::new(backend.clone(), config(5));

    let handle = coordinator.start("jd-5", json!({}));
    let control = handle.control();
    let error = handle.wait().await.unwrap_err();

    assert_eq!(error.kind, EngineErrorKind::Timeout);
    assert_eq!(error.task, Some(TaskKind::CombinedSearch));
    assert!(error.message.contains("connection refused"));
    assert_eq!(control.state(), OperationState::TimedOut);
    settle().await;
    assert_eq!(backend.cancel_calls(), vec![TaskId::new("apollo-1")]);
}

#[tokio::test(start_paused = true)]
async fn timeout_without_errors_returns_the_final_snapshot() {
    let backend = Arc::new(
        ScriptedTaskBackend::new()
            .with_launch(two_task_launch())
            .with_incremental(|index, _| Ok(ranked_rows(index as usize + 1))),
    );
    let coordinator = CombinedSearchCoordinator::new(backend.clone(), config(5));

    let outcome = coordinator.start("jd-5", json!({})).wait().await.unwrap();

    assert_eq!(outcome.termination, CombinedTermination::TimedOut);
    assert_eq!(outcome.candidates, ranked_rows(6));
    settle().await;
    assert_eq!(backend.cancel_calls(), vec![TaskId::new("apollo-1")]);
}

#[tokio::test(start_paused = true)]
async fn failed_final_fetch_keeps_the_last_snapshot() {
    let backend = Arc::new(
        ScriptedTaskBackend::new()
            .with_launch(two_task_launch())
            .with_incremental(|index, _| {
                if index >= 2 {
                    Err(transport_error("socket closed"))
                } else {
                    Ok(ranked_rows(index as usize + 1))
                }
            })
            .with_status(|_, index, _| {
                if index == 1 {
                    Ok(RemoteTaskStatus::completed(json!(null)))
                } else {
                    Ok(RemoteTaskStatus::processing())
                }
            }),
    );
    let coordinator = CombinedSearchCoordinator::new(backend, config(900));

    let outcome = coordinator.start("jd-8", json!({})).wait().await.unwrap();

    assert_eq!(outcome.termination, CombinedTermination::Completed);
    assert_eq!(outcome.candidates, ranked_rows(2));
}

#[tokio::test(start_paused = true)]
async fn cancel_keeps_streamed_rows_and_stops_the_server_task() {
    let backend = Arc::new(
        ScriptedTaskBackend::new()
            .with_launch(two_task_launch())
            .with_incremental(|index, _| Ok(ranked_rows(index as usize + 1))),
    );
    let coordinator = CombinedSearchCoordinator::new(backend.clone(), config(900));

    let handle = coordinator.start("jd-4", json!({}));
    tokio::time::sleep(Duration::from_millis(2500)).await;
    handle.cancel();
    let outcome = handle.wait().await.unwrap();

    assert_eq!(outcome.termination, CombinedTermination::Cancelled);
    assert_eq!(outcome.candidates, ranked_rows(2));
    settle().await;
    assert_eq!(backend.cancel_calls(), vec![TaskId::new("apollo-1")]);
}

#[tokio::test(start_paused = true)]
async fn budget_ends_a_search_stuck_on_a_slow_status_check() {
    let backend = Arc::new(
        ScriptedTaskBackend::new()
            .with_launch(two_task_launch())
            .with_incremental(|index, _| Ok(ranked_rows(index as usize + 1)))
            .with_status_delay(Duration::from_secs(10))
            .with_cancel_delay(Duration::from_secs(20)),
    );
    let coordinator = CombinedSearchCoordinator::new(backend.clone(), config(5));

    let started = tokio::time::Instant::now();
    let outcome = coordinator.start("jd-6", json!({})).wait().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome.termination, CombinedTermination::TimedOut);
    assert_eq!(outcome.candidates, ranked_rows(2));
    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed <= Duration::from_secs(6));
    assert_eq!(backend.status_calls(), 1);
    settle().await;
    assert_eq!(backend.cancel_calls(), vec![TaskId::new("apollo-1")]);
}

#[tokio::test(start_paused = true)]
async fn cancel_resolves_before_the_server_acknowledges() {
    let backend = Arc::new(
        ScriptedTaskBackend::new()
            .with_launch(two_task_launch())
            .with_cancel_delay(Duration::from_secs(20)),
    );
    let coordinator = CombinedSearchCoordinator::new(backend.clone(), config(900));

    let handle = coordinator.start("jd-4", json!({}));
    let control = handle.control();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let cancelled_at = tokio::time::Instant::now();
    handle.cancel();
    let outcome = handle.wait().await.unwrap();

    assert_eq!(outcome.termination, CombinedTermination::Cancelled);
    assert_eq!(cancelled_at.elapsed(), Duration::ZERO);
    assert_eq!(control.state(), OperationState::Cancelled);
}
