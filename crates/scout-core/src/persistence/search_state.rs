use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::models::{EngineError, EngineErrorKind, PersistedSearchState};
use crate::persistence::{PersistenceResult, SessionKey, SessionStore};

pub const SEARCH_STATE_NAME: &str = "search_candidates";

/// Typed access to a user's persisted search results.
///
/// Writes are ignored until [`restore`](Self::restore) has run once, so the
/// initial empty view can never overwrite results saved before a reload.
pub struct SearchStatePersistence {
    store: Arc<dyn SessionStore>,
    key: SessionKey,
    restored: AtomicBool,
}

impl SearchStatePersistence {
    pub fn new(store: Arc<dyn SessionStore>, user_id: impl Into<String>) -> Self {
        Self {
            store,
            key: SessionKey::new(user_id, SEARCH_STATE_NAME),
            restored: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn is_restored(&self) -> bool {
        self.restored.load(Ordering::SeqCst)
    }

    /// Read the saved state and open the write gate.
    ///
    /// An unreadable entry is logged and treated as absent.
    pub fn restore(&self) -> PersistenceResult<Option<PersistedSearchState>> {
        let result = self.read_state();
        self.restored.store(true, Ordering::SeqCst);
        result
    }

    /// Returns `false` when the write was skipped because restore has not run.
    pub fn save(&self, state: &PersistedSearchState) -> PersistenceResult<bool> {
        if !self.is_restored() {
            tracing::debug!(key = %self.key, "skipping search state write during restore");
            return Ok(false);
        }

        let encoded = serde_json::to_string(state).map_err(|error| {
            EngineError::new(
                EngineErrorKind::ParseFailure,
                format!("failed to encode search state: {error}"),
            )
        })?;
        self.store.write(&self.key, &encoded)?;
        Ok(true)
    }

    pub fn clear(&self) -> PersistenceResult<()> {
        self.store.remove(&self.key)
    }

    fn read_state(&self) -> PersistenceResult<Option<PersistedSearchState>> {
        let Some(raw) = self.store.read(&self.key)? else {
            return Ok(None);
        };

        match serde_json::from_str::<PersistedSearchState>(&raw) {
            Ok(state) => {
                tracing::info!(
                    key = %self.key,
                    jd_id = ?state.jd_id,
                    candidates = state.candidates.len(),
                    "restored persisted search state"
                );
                Ok(Some(state))
            }
            Err(error) => {
                tracing::warn!(
                    key = %self.key,
                    error = %error,
                    "discarding unreadable persisted search state"
                );
                Ok(None)
            }
        }
    }
}
