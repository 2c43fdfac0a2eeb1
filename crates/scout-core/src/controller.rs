use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::{CandidateBackend, TaskBackend, decode_candidates};
use crate::config::EngineConfig;
use crate::models::{
    CandidateRecord, EngineError, EngineErrorKind, EngineResult, PersistedSearchState, TaskKind,
};
use crate::mutation::{OptimisticMutationController, resync_flags_from_remote};
use crate::orchestration::{
    CombinedSearchCoordinator, CombinedTermination, OperationSlot, TaskOutcome, TaskPoller,
};
use crate::persistence::SearchStatePersistence;
use crate::sync::{SyncBus, SyncSubscription};
use crate::view::{CandidateList, CandidateView};

pub const STOPPED_BANNER: &str = "Search stopped.";
pub const PARTIAL_RESULTS_BANNER: &str =
    "The search ran out of time. Showing the candidates found so far.";

/// What the page shows around the candidate lists.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ViewStatus {
    pub loading: bool,
    pub banner: Option<String>,
    pub jd_id: Option<String>,
    generation: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunSummary {
    Completed { candidates: usize },
    /// Budget ran out; the partial list was kept.
    TimedOut { candidates: usize },
    Stopped,
    /// A newer launch took over the view before this one finished.
    Superseded,
}

/// Page-level wiring of one candidate search view.
pub struct SearchController {
    view: CandidateView,
    slot: OperationSlot,
    poller: TaskPoller,
    coordinator: CombinedSearchCoordinator,
    persistence: Arc<SearchStatePersistence>,
    candidates: Arc<dyn CandidateBackend>,
    mutations: OptimisticMutationController,
    status: Arc<Mutex<ViewStatus>>,
    subscription: Mutex<Option<SyncSubscription>>,
}

impl SearchController {
    pub fn new(
        tasks: Arc<dyn TaskBackend>,
        candidates: Arc<dyn CandidateBackend>,
        persistence: SearchStatePersistence,
        bus: SyncBus,
        config: &EngineConfig,
    ) -> Self {
        let view = CandidateView::new();
        Self {
            slot: OperationSlot::new(),
            poller: TaskPoller::new(tasks.clone(), config.poller),
            coordinator: CombinedSearchCoordinator::new(tasks, config.combined),
            persistence: Arc::new(persistence),
            candidates,
            mutations: OptimisticMutationController::new(view.clone(), bus),
            status: Arc::new(Mutex::new(ViewStatus::default())),
            subscription: Mutex::new(None),
            view,
        }
    }

    pub fn view(&self) -> &CandidateView {
        &self.view
    }

    pub fn slot(&self) -> &OperationSlot {
        &self.slot
    }

    pub fn status(&self) -> EngineResult<ViewStatus> {
        Ok(lock_status(&self.status)?.clone())
    }

    /// Restore saved results and start listening to other tabs.
    ///
    /// Must run inside a tokio runtime. Returns whether a saved state was found.
    pub fn mount(&self) -> EngineResult<bool> {
        let restored = match self.persistence.restore() {
            Ok(Some(state)) => {
                self.view
                    .replace_list(CandidateList::SearchResults, state.candidates)?;
                lock_status(&self.status)?.jd_id = state.jd_id;
                true
            }
            Ok(None) => false,
            Err(error) => {
                tracing::warn!(
                    key = %self.persistence.key(),
                    message = %error.message,
                    "could not read persisted search state"
                );
                false
            }
        };

        let view = self.view.clone();
        let status = self.status.clone();
        let persistence = self.persistence.clone();
        let subscription = self.mutations.bus().subscribe(move |message| {
            match view.apply_sync(&message) {
                Ok(0) => {}
                Ok(_) => persist_state(&view, &status, &persistence),
                Err(error) => {
                    tracing::warn!(message = %error.message, "failed to apply sync message");
                }
            }
        });
        *self.lock_subscription()? = Some(subscription);

        Ok(restored)
    }

    /// Stop listening to other tabs and cancel any live search.
    pub fn unmount(&self) -> EngineResult<()> {
        self.slot.cancel_active()?;
        if let Some(subscription) = self.lock_subscription()?.take() {
            subscription.unsubscribe();
        }
        Ok(())
    }

    pub async fn select_jd(&self, jd_id: impl Into<String>) -> EngineResult<usize> {
        lock_status(&self.status)?.jd_id = Some(jd_id.into());
        self.persist();
        self.on_focus().await
    }

    pub async fn run_task(
        &self,
        kind: TaskKind,
        params: serde_json::Value,
    ) -> EngineResult<RunSummary> {
        let loading = self.begin_loading()?;
        self.reset_results()?;

        let handle = self.slot.launch(|| self.poller.start(kind, params))?;
        let outcome = handle.wait().await;
        if !loading.is_current() {
            return Ok(RunSummary::Superseded);
        }

        match outcome {
            Ok(TaskOutcome::Completed { data, .. }) => {
                let candidates = decode_candidates(&data).inspect_err(|error| {
                    loading.set_banner(error.banner());
                })?;
                let count = candidates.len();
                self.view
                    .replace_list(CandidateList::SearchResults, candidates)?;
                self.persist();
                Ok(RunSummary::Completed { candidates: count })
            }
            Ok(TaskOutcome::Cancelled { .. }) => {
                loading.set_banner(STOPPED_BANNER.to_string());
                Ok(RunSummary::Stopped)
            }
            Err(error) => {
                loading.set_banner(error.banner());
                Err(error)
            }
        }
    }

    /// Launch a combined search and stream its snapshots into the result list.
    pub async fn run_combined_search(
        &self,
        jd_id: impl Into<String>,
        params: serde_json::Value,
    ) -> EngineResult<RunSummary> {
        let jd_id = jd_id.into();
        let loading = self.begin_loading()?;
        lock_status(&self.status)?.jd_id = Some(jd_id.clone());
        self.reset_results()?;

        let handle = self
            .slot
            .launch(|| self.coordinator.start(jd_id, params))?;
        let mut progress = handle.progress();
        let wait = handle.wait();
        tokio::pin!(wait);

        let outcome = loop {
            tokio::select! {
                outcome = &mut wait => break outcome,
                changed = progress.changed() => {
                    if changed.is_err() {
                        break (&mut wait).await;
                    }
                    let candidates = progress.borrow_and_update().candidates.clone();
                    if loading.is_current() {
                        self.view.replace_list(CandidateList::SearchResults, candidates)?;
                        self.persist();
                    }
                }
            }
        };
        if !loading.is_current() {
            return Ok(RunSummary::Superseded);
        }

        match outcome {
            Ok(outcome) => {
                let count = outcome.candidates.len();
                self.view
                    .replace_list(CandidateList::SearchResults, outcome.candidates)?;
                self.persist();
                match outcome.termination {
                    CombinedTermination::Completed => Ok(RunSummary::Completed { candidates: count }),
                    CombinedTermination::TimedOut => {
                        loading.set_banner(PARTIAL_RESULTS_BANNER.to_string());
                        Ok(RunSummary::TimedOut { candidates: count })
                    }
                    CombinedTermination::Cancelled => {
                        loading.set_banner(STOPPED_BANNER.to_string());
                        Ok(RunSummary::Stopped)
                    }
                }
            }
            Err(error) => {
                loading.set_banner(error.banner());
                Err(error)
            }
        }
    }

    /// Returns true when a live search was asked to stop.
    pub fn stop(&self) -> EngineResult<bool> {
        let stopped = self.slot.cancel_active()?;
        if stopped {
            lock_status(&self.status)?.banner = Some(STOPPED_BANNER.to_string());
        }
        Ok(stopped)
    }

    /// Pull authoritative flags after the view regains focus.
    pub async fn on_focus(&self) -> EngineResult<usize> {
        let jd_id = lock_status(&self.status)?.jd_id.clone();
        let changed =
            resync_flags_from_remote(&self.view, self.candidates.as_ref(), jd_id.as_deref())
                .await
                .inspect_err(|error| {
                    tracing::warn!(
                        jd_id = ?jd_id,
                        message = %error.message,
                        "focus re-sync failed"
                    );
                })?;
        if changed > 0 {
            self.persist();
        }
        Ok(changed)
    }

    pub async fn set_favorite(&self, target: &CandidateRecord, value: bool) -> EngineResult<()> {
        let result = self
            .mutations
            .set_favorite(self.candidates.as_ref(), target, value)
            .await;
        self.finish_mutation(result)
    }

    pub async fn set_save_for_future(
        &self,
        target: &CandidateRecord,
        value: bool,
    ) -> EngineResult<()> {
        let result = self
            .mutations
            .set_save_for_future(self.candidates.as_ref(), target, value)
            .await;
        self.finish_mutation(result)
    }

    fn finish_mutation(&self, result: EngineResult<()>) -> EngineResult<()> {
        match &result {
            Ok(()) => self.persist(),
            Err(error) => {
                lock_status(&self.status)?.banner = Some(error.banner());
            }
        }
        result
    }

    fn begin_loading(&self) -> EngineResult<LoadingGuard> {
        let mut status = lock_status(&self.status)?;
        status.generation = status.generation.wrapping_add(1);
        status.loading = true;
        status.banner = None;
        Ok(LoadingGuard {
            status: self.status.clone(),
            generation: status.generation,
        })
    }

    /// Drop the previous run's rows from the view and from storage together.
    fn reset_results(&self) -> EngineResult<()> {
        self.view
            .replace_list(CandidateList::SearchResults, Vec::new())?;
        if let Err(error) = self.persistence.clear() {
            tracing::warn!(
                key = %self.persistence.key(),
                message = %error.message,
                "could not clear persisted search state"
            );
        }
        Ok(())
    }

    fn persist(&self) {
        persist_state(&self.view, &self.status, &self.persistence);
    }

    fn lock_subscription(&self) -> EngineResult<MutexGuard<'_, Option<SyncSubscription>>> {
        self.subscription.lock().map_err(|_| {
            EngineError::new(EngineErrorKind::Internal, "sync subscription mutex poisoned")
        })
    }
}

impl Drop for SearchController {
    fn drop(&mut self) {
        if let Ok(active) = self.slot.active()
            && let Some(control) = active
        {
            control.cancel();
        }
    }
}

/// Clears `loading` when the run that raised it ends, on every path.
struct LoadingGuard {
    status: Arc<Mutex<ViewStatus>>,
    generation: u64,
}

impl LoadingGuard {
    fn is_current(&self) -> bool {
        self.status
            .lock()
            .map(|status| status.generation == self.generation)
            .unwrap_or(false)
    }

    fn set_banner(&self, banner: String) {
        if let Ok(mut status) = self.status.lock()
            && status.generation == self.generation
        {
            status.banner = Some(banner);
        }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if let Ok(mut status) = self.status.lock()
            && status.generation == self.generation
        {
            status.loading = false;
        }
    }
}

fn persist_state(
    view: &CandidateView,
    status: &Mutex<ViewStatus>,
    persistence: &SearchStatePersistence,
) {
    let state = match (view.snapshot(CandidateList::SearchResults), lock_status(status)) {
        (Ok(candidates), Ok(status)) => PersistedSearchState {
            jd_id: status.jd_id.clone(),
            candidates,
        },
        _ => {
            tracing::warn!("skipping search state write; view state unavailable");
            return;
        }
    };

    if let Err(error) = persistence.save(&state) {
        tracing::warn!(
            key = %persistence.key(),
            message = %error.message,
            "could not persist search state"
        );
    }
}

fn lock_status(status: &Mutex<ViewStatus>) -> EngineResult<MutexGuard<'_, ViewStatus>> {
    status
        .lock()
        .map_err(|_| EngineError::new(EngineErrorKind::Internal, "view status mutex poisoned"))
}
