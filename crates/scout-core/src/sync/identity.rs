//! Alias equivalence for candidates.
//!
//! One person can be referenced by a rank id (pipeline-tracked), a profile id
//! (web sourced), a resume id (uploaded resume) or a LinkedIn profile id
//! (LinkedIn discovery). Every component that asks "is this the same
//! candidate?" goes through here.

use crate::models::{CandidateRecord, CandidateSource};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AliasField {
    RankId,
    ProfileId,
    ResumeId,
    LinkedinProfileId,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct CandidateAlias<'a> {
    pub field: AliasField,
    pub id: &'a str,
}

/// Present identifiers in rank, profile, resume, linkedin order.
pub fn aliases_of(candidate: &CandidateRecord) -> Vec<CandidateAlias<'_>> {
    let ids = &candidate.ids;
    [
        (AliasField::RankId, ids.rank_id.as_deref()),
        (AliasField::ProfileId, ids.profile_id.as_deref()),
        (AliasField::ResumeId, ids.resume_id.as_deref()),
        (AliasField::LinkedinProfileId, ids.linkedin_profile_id.as_deref()),
    ]
    .into_iter()
    .filter_map(|(field, id)| {
        id.filter(|id| !id.is_empty())
            .map(|id| CandidateAlias { field, id })
    })
    .collect()
}

pub fn alias_ids(candidate: &CandidateRecord) -> Vec<String> {
    aliases_of(candidate)
        .into_iter()
        .map(|alias| alias.id.to_string())
        .collect()
}

pub fn matches(candidate: &CandidateRecord, id: &str) -> bool {
    !id.is_empty() && aliases_of(candidate).iter().any(|alias| alias.id == id)
}

pub fn same_candidate(first: &CandidateRecord, second: &CandidateRecord) -> bool {
    aliases_of(first)
        .iter()
        .any(|alias| matches(second, alias.id))
}

/// Identifier and origin table used to address the remote setters.
///
/// A pipeline-tracked candidate is always addressed by its rank id.
pub fn primary_reference(candidate: &CandidateRecord) -> Option<(&str, CandidateSource)> {
    aliases_of(candidate).first().map(|alias| {
        let source = match alias.field {
            AliasField::RankId => CandidateSource::Ranked,
            AliasField::ProfileId => CandidateSource::Web,
            AliasField::ResumeId => CandidateSource::Resume,
            AliasField::LinkedinProfileId => CandidateSource::Linkedin,
        };
        (alias.id, source)
    })
}
