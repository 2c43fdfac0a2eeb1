use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::FlagField;

/// Random per-tab nonce generated when a tab (or view process) loads.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub Uuid);

impl TabId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for TabId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMessageKind {
    FavoriteUpdated,
    SaveUpdated,
}

impl SyncMessageKind {
    pub fn field(self) -> FlagField {
        match self {
            SyncMessageKind::FavoriteUpdated => FlagField::Favorite,
            SyncMessageKind::SaveUpdated => FlagField::SaveForFuture,
        }
    }

    pub fn for_field(field: FlagField) -> Self {
        match field {
            FlagField::Favorite => SyncMessageKind::FavoriteUpdated,
            FlagField::SaveForFuture => SyncMessageKind::SaveUpdated,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    #[serde(rename = "type")]
    pub kind: SyncMessageKind,
    pub candidate_id: String,
    pub value: bool,
    pub source_tab_id: TabId,
}
