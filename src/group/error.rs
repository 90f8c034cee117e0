//! Group mutation errors
//!
//! The ordering of variants follows the order in which a mutation can fail:
//! everything above `RevisionConflict` happens before any network call;
//! `Persistence` and `PartialDelivery` only after the authority accepted.

use super::model::GroupId;
use crate::account::StoreError;
use crate::address::Address;
use crate::crypto::GroupParamsError;
use thiserror::Error;

pub type GroupResult<T> = Result<T, GroupError>;

#[derive(Debug, Error)]
pub enum GroupError {
    #[error("Unknown group: {0}")]
    UnknownGroup(GroupId),

    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Profile key credential unavailable for {0}")]
    CredentialUnavailable(Address),

    #[error("Invalid change: {0}")]
    InvalidChange(String),

    #[error("Revision conflict: authority is at revision {current_revision}")]
    RevisionConflict { current_revision: u32 },

    #[error("Commit unavailable: {0}")]
    CommitUnavailable(String),

    /// The authority accepted the change and the cache holds it; only the
    /// write to disk failed.
    #[error("Committed revision {revision} but failed to persist: {source}")]
    Persistence {
        revision: u32,
        #[source]
        source: StoreError,
    },

    /// Committed and persisted; some members did not receive the update.
    #[error("Revision {revision} delivered to {delivered} of {attempted} members")]
    PartialDelivery {
        revision: u32,
        attempted: usize,
        delivered: usize,
        failed: Vec<(Address, String)>,
    },
}

impl From<GroupParamsError> for GroupError {
    fn from(e: GroupParamsError) -> Self {
        GroupError::InvalidKeyMaterial(e.to_string())
    }
}
