use serde::{Deserialize, Serialize};

use crate::models::CandidateRecord;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PersistedSearchState {
    pub jd_id: Option<String>,
    pub candidates: Vec<CandidateRecord>,
}
