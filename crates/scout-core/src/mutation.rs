use std::future::Future;

use crate::backend::CandidateBackend;
use crate::models::{
    CandidateRecord, CandidateSource, EngineError, EngineErrorKind, EngineResult, FlagField,
};
use crate::sync::SyncBus;
use crate::sync::identity::primary_reference;
use crate::view::CandidateView;

/// Applies flag toggles locally first, then commits or rolls them back.
///
/// Rapid toggles are not coalesced: each call issues its own remote write and
/// the server's last write wins.
#[derive(Clone)]
pub struct OptimisticMutationController {
    view: CandidateView,
    bus: SyncBus,
}

impl OptimisticMutationController {
    pub fn new(view: CandidateView, bus: SyncBus) -> Self {
        Self { view, bus }
    }

    pub fn view(&self) -> &CandidateView {
        &self.view
    }

    pub fn bus(&self) -> &SyncBus {
        &self.bus
    }

    pub async fn apply<F, Fut>(
        &self,
        target: &CandidateRecord,
        field: FlagField,
        new_value: bool,
        remote_call: F,
    ) -> EngineResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<()>>,
    {
        target.validate()?;
        let previous = self
            .view
            .flag_of(target, field)?
            .unwrap_or_else(|| target.flag(field));

        let touched = self.view.set_flag(target, field, new_value)?;
        let published = self.bus.publish_flag(target, field, new_value);
        tracing::debug!(
            candidate = %target.name,
            field = ?field,
            value = new_value,
            touched,
            published,
            "optimistic update applied"
        );

        match remote_call().await {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::warn!(
                    candidate = %target.name,
                    field = ?field,
                    kind = ?error.kind,
                    message = %error.message,
                    "remote mutation rejected; rolling back"
                );
                self.view.set_flag(target, field, previous)?;
                self.bus.publish_flag(target, field, previous);
                Err(EngineError::new(
                    EngineErrorKind::MutationFailure,
                    format!(
                        "failed to set {field:?} to {new_value} for '{}': {}",
                        target.name, error.message
                    ),
                ))
            }
        }
    }

    pub async fn set_favorite(
        &self,
        backend: &dyn CandidateBackend,
        target: &CandidateRecord,
        value: bool,
    ) -> EngineResult<()> {
        let (candidate_id, source) = remote_reference(target)?;
        self.apply(target, FlagField::Favorite, value, || {
            backend.set_favorite(candidate_id, source, value)
        })
        .await
    }

    pub async fn set_save_for_future(
        &self,
        backend: &dyn CandidateBackend,
        target: &CandidateRecord,
        value: bool,
    ) -> EngineResult<()> {
        let (candidate_id, source) = remote_reference(target)?;
        self.apply(target, FlagField::SaveForFuture, value, || {
            backend.set_save_for_future(candidate_id, source, value)
        })
        .await
    }
}

/// Focus-time fallback: pull the authoritative list for `jd_id` and copy its
/// `favorite` / `save_for_future` flags onto entries the view already holds.
pub async fn resync_flags_from_remote(
    view: &CandidateView,
    backend: &dyn CandidateBackend,
    jd_id: Option<&str>,
) -> EngineResult<usize> {
    let authoritative = backend.fetch_current_list(jd_id).await?;
    let changed = view.resync_flags(&authoritative)?;
    tracing::debug!(
        jd_id = ?jd_id,
        fetched = authoritative.len(),
        changed,
        "flag re-sync finished"
    );
    Ok(changed)
}

fn remote_reference(target: &CandidateRecord) -> EngineResult<(&str, CandidateSource)> {
    primary_reference(target).ok_or_else(|| {
        EngineError::new(
            EngineErrorKind::InvalidInput,
            format!("candidate '{}' carries no identifier", target.name),
        )
    })
}
