pub mod candidate;
pub mod error;
pub mod search_state;
pub mod sync;
pub mod task;

pub use candidate::{CandidateIds, CandidateRecord, CandidateSource, FlagField, Stage};
pub use error::{EngineError, EngineErrorKind, EngineResult};
pub use search_state::PersistedSearchState;
pub use sync::{SyncMessage, SyncMessageKind, TabId};
pub use task::{OperationState, TaskId, TaskKind, TaskRecord, TaskStatus};
