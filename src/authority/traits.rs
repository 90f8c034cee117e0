//! Group authority transport abstraction
//!
//! The authority is the remote service holding the encrypted, revisioned
//! group state. It accepts a change only when it is built against its
//! current revision; the trait lets tests swap in `LoopbackAuthority`.

use crate::group::{ActionSet, EncryptedGroupState, GroupId, SignedChangeRecord};
use async_trait::async_trait;
use thiserror::Error;

pub type AuthorityResult<T> = Result<T, AuthorityError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    /// The change targeted a revision other than current + 1.
    #[error("Revision conflict: authority is at revision {current_revision}")]
    Conflict { current_revision: u32 },

    #[error("Group not found")]
    GroupNotFound,

    #[error("Group already exists")]
    AlreadyExists,

    /// The whole change was refused (e.g. the source is not in the group).
    #[error("Change rejected: {0}")]
    Rejected(String),

    /// Network or timeout failure. The change may or may not have applied.
    #[error("Authority unavailable: {0}")]
    Unavailable(String),
}

/// Successful commit: the state the authority now holds plus its proof
#[derive(Debug, Clone)]
pub struct CommitResponse {
    pub state: EncryptedGroupState,
    pub signed_change: SignedChangeRecord,
}

#[async_trait]
pub trait GroupAuthority: Send + Sync {
    /// Register a new group at revision 0 and sign its creation.
    async fn create_group(
        &self,
        group_id: &GroupId,
        state: &EncryptedGroupState,
    ) -> AuthorityResult<SignedChangeRecord>;

    /// Current authoritative state (used to re-sync before a retry).
    async fn fetch_group(&self, group_id: &GroupId) -> AuthorityResult<EncryptedGroupState>;

    /// Submit `actions` to move the group to `target_revision`.
    ///
    /// Not idempotent: callers must not blindly resubmit after `Unavailable`.
    async fn submit_change(
        &self,
        group_id: &GroupId,
        target_revision: u32,
        actions: &ActionSet,
    ) -> AuthorityResult<CommitResponse>;
}
