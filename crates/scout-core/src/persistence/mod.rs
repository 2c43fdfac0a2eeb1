pub mod memory;
pub mod search_state;

pub use memory::InMemorySessionStore;
pub use search_state::{SEARCH_STATE_NAME, SearchStatePersistence};

use std::fmt::{Display, Formatter};

use crate::models::EngineError;

pub type PersistenceResult<T> = Result<T, EngineError>;

/// Session storage entry address: one namespace per user.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SessionKey {
    pub user_id: String,
    pub name: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
        }
    }
}

impl Display for SessionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.name, self.user_id)
    }
}

/// Last-write-wins string store shared by every view of a session.
pub trait SessionStore: Send + Sync {
    fn read(&self, key: &SessionKey) -> PersistenceResult<Option<String>>;

    fn write(&self, key: &SessionKey, value: &str) -> PersistenceResult<()>;

    fn remove(&self, key: &SessionKey) -> PersistenceResult<()>;
}
