//! Group state mutation and synchronization
//!
//! ## Flow
//!
//! ```text
//! Mutation -> ChangeProposalBuilder -> CommitCoordinator -> applier -> ChangeBroadcaster
//!                 (pure)               (authority, bounded)  (cache + disk)  (members)
//! ```
//!
//! `GroupsManager` drives the flow under a per-(account, group) lock so two
//! mutations of the same group never interleave their commit and apply steps.

pub mod actions;
pub mod applier;
pub mod broadcast;
pub mod coordinator;
pub mod error;
pub mod locks;
pub mod manager;
pub mod model;
pub mod proposal;

pub use actions::{
    ActionSet, EncryptedGroupState, EncryptedMember, EncryptedPendingMember, GroupAction,
    SignedChangeRecord,
};
pub use applier::{apply_committed, AppliedChange};
pub use broadcast::{ChangeBroadcaster, GroupContextEnvelope};
pub use coordinator::{CommitCoordinator, CommittedChange};
pub use error::{GroupError, GroupResult};
pub use locks::GroupLocks;
pub use manager::GroupsManager;
pub use model::{
    DecryptedGroup, DecryptedMember, DecryptedPendingMember, Group, GroupId, GroupIdError, Role,
};
pub use proposal::{
    ChangeProposal, ChangeProposalBuilder, Credentials, Mutation, MAX_DESCRIPTION_LEN,
    MAX_TITLE_LEN,
};
