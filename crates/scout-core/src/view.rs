use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::{
    CandidateRecord, EngineError, EngineErrorKind, EngineResult, FlagField, SyncMessage,
};
use crate::sync::identity::{matches, same_candidate};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CandidateList {
    Pipeline,
    SearchResults,
    AllCandidates,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    Next,
    Previous,
}

#[derive(Debug, Default)]
struct ViewState {
    pipeline: Vec<CandidateRecord>,
    search_results: Vec<CandidateRecord>,
    all_candidates: Vec<CandidateRecord>,
    popup: Option<CandidateRecord>,
}

impl ViewState {
    fn list(&self, list: CandidateList) -> &Vec<CandidateRecord> {
        match list {
            CandidateList::Pipeline => &self.pipeline,
            CandidateList::SearchResults => &self.search_results,
            CandidateList::AllCandidates => &self.all_candidates,
        }
    }

    fn list_mut(&mut self, list: CandidateList) -> &mut Vec<CandidateRecord> {
        match list {
            CandidateList::Pipeline => &mut self.pipeline,
            CandidateList::SearchResults => &mut self.search_results,
            CandidateList::AllCandidates => &mut self.all_candidates,
        }
    }

    fn entries(&self) -> impl Iterator<Item = &CandidateRecord> {
        self.pipeline
            .iter()
            .chain(self.search_results.iter())
            .chain(self.all_candidates.iter())
            .chain(self.popup.iter())
    }

    fn entries_mut(&mut self) -> impl Iterator<Item = &mut CandidateRecord> {
        self.pipeline
            .iter_mut()
            .chain(self.search_results.iter_mut())
            .chain(self.all_candidates.iter_mut())
            .chain(self.popup.iter_mut())
    }
}

/// The candidate lists one view holds, plus its open detail popup.
///
/// Cloning shares the same state. The lock is never held across an await.
#[derive(Clone, Default)]
pub struct CandidateView {
    state: Arc<Mutex<ViewState>>,
}

impl CandidateView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_list(
        &self,
        list: CandidateList,
        candidates: Vec<CandidateRecord>,
    ) -> EngineResult<()> {
        let mut state = self.lock_state()?;
        *state.list_mut(list) = candidates;
        Ok(())
    }

    pub fn snapshot(&self, list: CandidateList) -> EngineResult<Vec<CandidateRecord>> {
        Ok(self.lock_state()?.list(list).clone())
    }

    pub fn open_popup(&self, candidate: CandidateRecord) -> EngineResult<()> {
        self.lock_state()?.popup = Some(candidate);
        Ok(())
    }

    pub fn close_popup(&self) -> EngineResult<()> {
        self.lock_state()?.popup = None;
        Ok(())
    }

    pub fn popup(&self) -> EngineResult<Option<CandidateRecord>> {
        Ok(self.lock_state()?.popup.clone())
    }

    /// Current value of `field` on the first held entry sharing an alias with `target`.
    pub fn flag_of(
        &self,
        target: &CandidateRecord,
        field: FlagField,
    ) -> EngineResult<Option<bool>> {
        let state = self.lock_state()?;
        Ok(state
            .entries()
            .find(|entry| same_candidate(entry, target))
            .map(|entry| entry.flag(field)))
    }

    /// Set `field` on every entry that shares an alias with `target`.
    pub fn set_flag(
        &self,
        target: &CandidateRecord,
        field: FlagField,
        value: bool,
    ) -> EngineResult<usize> {
        let mut state = self.lock_state()?;
        let mut touched = 0;
        for entry in state.entries_mut() {
            if same_candidate(entry, target) {
                entry.set_flag(field, value);
                touched += 1;
            }
        }
        Ok(touched)
    }

    /// Reconcile a message from another tab against every held entry.
    pub fn apply_sync(&self, message: &SyncMessage) -> EngineResult<usize> {
        let field = message.kind.field();
        let mut state = self.lock_state()?;
        let mut touched = 0;
        for entry in state.entries_mut() {
            if matches(entry, &message.candidate_id) {
                entry.set_flag(field, message.value);
                touched += 1;
            }
        }
        Ok(touched)
    }

    /// Overwrite only `favorite` and `save_for_future` of entries already held.
    ///
    /// Entries missing from `authoritative` and rows the view does not hold
    /// are left alone, so an in-flight search keeps its results.
    pub fn resync_flags(&self, authoritative: &[CandidateRecord]) -> EngineResult<usize> {
        let mut state = self.lock_state()?;
        let mut changed = 0;
        for entry in state.entries_mut() {
            let held: &CandidateRecord = entry;
            let Some(fresh) = authoritative
                .iter()
                .find(|candidate| same_candidate(held, candidate))
            else {
                continue;
            };
            if entry.favorite != fresh.favorite || entry.save_for_future != fresh.save_for_future {
                entry.favorite = fresh.favorite;
                entry.save_for_future = fresh.save_for_future;
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Entry before or after the one matching `id`, for popup navigation.
    pub fn neighbor(
        &self,
        list: CandidateList,
        id: &str,
        direction: Direction,
    ) -> EngineResult<Option<CandidateRecord>> {
        let state = self.lock_state()?;
        let entries = state.list(list);
        let Some(position) = entries.iter().position(|entry| matches(entry, id)) else {
            return Ok(None);
        };
        let neighbor = match direction {
            Direction::Next => entries.get(position + 1),
            Direction::Previous => position.checked_sub(1).and_then(|index| entries.get(index)),
        };
        Ok(neighbor.cloned())
    }

    fn lock_state(&self) -> EngineResult<MutexGuard<'_, ViewState>> {
        self.state.lock().map_err(|_| {
            EngineError::new(EngineErrorKind::Internal, "candidate view mutex poisoned")
        })
    }
}
