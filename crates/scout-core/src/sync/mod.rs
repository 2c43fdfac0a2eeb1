pub mod bus;
pub mod identity;

pub use bus::{SyncBus, SyncChannel, SyncHub, SyncListener, SyncSubscription};
pub use identity::{
    AliasField, CandidateAlias, alias_ids, aliases_of, matches, primary_reference, same_candidate,
};
