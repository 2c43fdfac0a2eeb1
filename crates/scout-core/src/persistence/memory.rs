use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::models::{EngineError, EngineErrorKind};
use crate::persistence::{PersistenceResult, SessionKey, SessionStore};

/// Process-lifetime store, the equivalent of browser session storage.
#[derive(Default)]
pub struct InMemorySessionStore {
    entries: Mutex<HashMap<SessionKey, String>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_entries(&self) -> PersistenceResult<MutexGuard<'_, HashMap<SessionKey, String>>> {
        self.entries.lock().map_err(|_| {
            EngineError::new(
                EngineErrorKind::StorageFailure,
                "session store mutex poisoned",
            )
        })
    }
}

impl SessionStore for InMemorySessionStore {
    fn read(&self, key: &SessionKey) -> PersistenceResult<Option<String>> {
        Ok(self.lock_entries()?.get(key).cloned())
    }

    fn write(&self, key: &SessionKey, value: &str) -> PersistenceResult<()> {
        self.lock_entries()?.insert(key.clone(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &SessionKey) -> PersistenceResult<()> {
        self.lock_entries()?.remove(key);
        Ok(())
    }
}
