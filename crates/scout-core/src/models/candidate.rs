use serde::{Deserialize, Serialize};

use crate::models::{EngineError, EngineErrorKind, EngineResult};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    InConsideration,
    Interviewing,
    OfferExtended,
    Rejected,
}

/// Every identifier a candidate may carry depending on the table it came from.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CandidateIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_profile_id: Option<String>,
}

impl CandidateIds {
    pub fn ranked(rank_id: impl Into<String>) -> Self {
        Self {
            rank_id: Some(rank_id.into()),
            ..Self::default()
        }
    }

    pub fn profile(profile_id: impl Into<String>) -> Self {
        Self {
            profile_id: Some(profile_id.into()),
            ..Self::default()
        }
    }

    pub fn resume(resume_id: impl Into<String>) -> Self {
        Self {
            resume_id: Some(resume_id.into()),
            ..Self::default()
        }
    }

    pub fn linkedin(linkedin_profile_id: impl Into<String>) -> Self {
        Self {
            linkedin_profile_id: Some(linkedin_profile_id.into()),
            ..Self::default()
        }
    }

    pub fn with_rank_id(mut self, rank_id: impl Into<String>) -> Self {
        self.rank_id = Some(rank_id.into());
        self
    }

    pub fn with_profile_id(mut self, profile_id: impl Into<String>) -> Self {
        self.profile_id = Some(profile_id.into());
        self
    }

    pub fn with_resume_id(mut self, resume_id: impl Into<String>) -> Self {
        self.resume_id = Some(resume_id.into());
        self
    }

    pub fn with_linkedin_profile_id(mut self, linkedin_profile_id: impl Into<String>) -> Self {
        self.linkedin_profile_id = Some(linkedin_profile_id.into());
        self
    }

    /// True when no identifier carries a value. Empty strings count as absent.
    pub fn is_empty(&self) -> bool {
        [
            &self.rank_id,
            &self.profile_id,
            &self.resume_id,
            &self.linkedin_profile_id,
        ]
        .into_iter()
        .all(|id| id.as_deref().is_none_or(str::is_empty))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    #[serde(flatten)]
    pub ids: CandidateIds,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub save_for_future: bool,
    #[serde(default)]
    pub stage: Stage,
    #[serde(default)]
    pub contacted: bool,
}

impl CandidateRecord {
    pub fn new(ids: CandidateIds, name: impl Into<String>) -> Self {
        Self {
            ids,
            name: name.into(),
            title: None,
            favorite: false,
            save_for_future: false,
            stage: Stage::default(),
            contacted: false,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.ids.is_empty() {
            return Err(EngineError::new(
                EngineErrorKind::InvalidInput,
                format!("candidate '{}' carries no identifier", self.name),
            ));
        }
        Ok(())
    }

    pub fn flag(&self, field: FlagField) -> bool {
        match field {
            FlagField::Favorite => self.favorite,
            FlagField::SaveForFuture => self.save_for_future,
        }
    }

    pub fn set_flag(&mut self, field: FlagField, value: bool) {
        match field {
            FlagField::Favorite => self.favorite = value,
            FlagField::SaveForFuture => self.save_for_future = value,
        }
    }
}

/// Boolean flags that are toggled optimistically and synced across views.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagField {
    Favorite,
    SaveForFuture,
}

/// Origin table used to address the remote setters.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Ranked,
    Web,
    Resume,
    Linkedin,
}

impl CandidateSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CandidateSource::Ranked => "ranked",
            CandidateSource::Web => "web",
            CandidateSource::Resume => "resume",
            CandidateSource::Linkedin => "linkedin",
        }
    }
}
