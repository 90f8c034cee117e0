//! Commit coordinator
//!
//! Submits a proposal to the authority under revision control. The only
//! three outcomes are: the authoritative post-commit state plus its signed
//! record, a revision conflict, or "unavailable". Nothing is retried here;
//! after `CommitUnavailable` the authority may already hold the change, so
//! callers re-fetch before trying again.

use super::actions::SignedChangeRecord;
use super::error::{GroupError, GroupResult};
use super::model::{DecryptedGroup, Group, GroupId};
use super::proposal::ChangeProposal;
use crate::authority::{AuthorityError, GroupAuthority};
use crate::crypto::GroupSecretParams;
use std::time::Duration;
use tracing::{debug, warn};

/// A successful commit as acknowledged by the authority
#[derive(Debug, Clone)]
pub struct CommittedChange {
    /// Ground truth; may differ from what the proposal asked for
    pub state: DecryptedGroup,
    pub signed_change: SignedChangeRecord,
}

pub struct CommitCoordinator<'a> {
    authority: &'a dyn GroupAuthority,
    timeout: Duration,
}

impl<'a> CommitCoordinator<'a> {
    pub fn new(authority: &'a dyn GroupAuthority, timeout: Duration) -> Self {
        Self { authority, timeout }
    }

    pub async fn commit(
        &self,
        group: &Group,
        params: &GroupSecretParams,
        proposal: &ChangeProposal,
    ) -> GroupResult<CommittedChange> {
        if proposal.target_revision != group.revision + 1 {
            return Err(GroupError::InvalidChange(format!(
                "proposal targets revision {} but the cache is at {}",
                proposal.target_revision, group.revision
            )));
        }

        debug!(
            group = %group.id,
            target_revision = proposal.target_revision,
            actions = proposal.actions.actions.len(),
            "submitting change"
        );

        let submit =
            self.authority
                .submit_change(&group.id, proposal.target_revision, &proposal.actions);

        let response = match tokio::time::timeout(self.timeout, submit).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(authority_error(e, group.id)),
            Err(_) => {
                warn!(group = %group.id, "commit timed out, outcome unknown");
                return Err(GroupError::CommitUnavailable(format!(
                    "no acknowledgment within {}",
                    humantime::format_duration(self.timeout)
                )));
            }
        };

        if response.signed_change.is_empty() {
            return Err(GroupError::CommitUnavailable(
                "authority returned an empty change record".into(),
            ));
        }

        let state = response.state.decrypt(params).map_err(|e| {
            GroupError::CommitUnavailable(format!("authoritative state unreadable: {}", e))
        })?;

        if state.revision != proposal.target_revision {
            warn!(
                group = %group.id,
                expected = proposal.target_revision,
                reported = state.revision,
                "authority reported an unexpected revision"
            );
        }

        Ok(CommittedChange {
            state,
            signed_change: response.signed_change,
        })
    }
}

/// Translate an authority failure for `group_id` into the group taxonomy.
pub(crate) fn authority_error(e: AuthorityError, group_id: GroupId) -> GroupError {
    match e {
        AuthorityError::Conflict { current_revision } => {
            GroupError::RevisionConflict { current_revision }
        }
        AuthorityError::GroupNotFound => GroupError::UnknownGroup(group_id),
        AuthorityError::AlreadyExists | AuthorityError::Rejected(_) => {
            GroupError::InvalidChange(e.to_string())
        }
        AuthorityError::Unavailable(reason) => GroupError::CommitUnavailable(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{Fault, LoopbackAuthority};
    use crate::crypto::{GroupMasterKey, ProfileKeyCredential};
    use crate::group::actions::EncryptedGroupState;
    use crate::group::model::{DecryptedMember, DecryptedPendingMember, Role};
    use crate::group::proposal::{ChangeProposalBuilder, Credentials, Mutation};
    use uuid::Uuid;

    struct Fixture {
        authority: LoopbackAuthority,
        params: GroupSecretParams,
        group: Group,
        invitee: Uuid,
    }

    fn fixture(revision: u32) -> Fixture {
        let admin = Uuid::new_v4();
        let invitee = Uuid::new_v4();
        let key = GroupMasterKey::from_slice(&[4u8; 32]).unwrap();
        let params = GroupSecretParams::derive_from_master_key(&key).unwrap();
        let state = DecryptedGroup {
            title: "Quilting".into(),
            revision,
            members: vec![DecryptedMember {
                uuid: admin,
                role: Role::Administrator,
                joined_at_revision: 0,
            }],
            pending_members: vec![DecryptedPendingMember {
                uuid: invitee,
                role: Role::Default,
                added_by: admin,
            }],
            ..Default::default()
        };
        let authority = LoopbackAuthority::new();
        authority.insert_group(
            params.group_id(),
            EncryptedGroupState::encrypt(&params, &state).unwrap(),
        );
        Fixture {
            authority,
            params,
            group: Group::new(key, state).unwrap(),
            invitee,
        }
    }

    fn accept_proposal(f: &Fixture) -> ChangeProposal {
        let mut credentials = Credentials::new();
        credentials.insert(f.invitee, ProfileKeyCredential::new(vec![1]));
        ChangeProposalBuilder::new(&f.params, &f.group, f.invitee)
            .build(&Mutation::AcceptInvitation, &credentials)
            .unwrap()
    }

    #[tokio::test]
    async fn test_commit_returns_authoritative_state() {
        let f = fixture(5);
        let coordinator = CommitCoordinator::new(&f.authority, Duration::from_secs(5));

        let committed = coordinator
            .commit(&f.group, &f.params, &accept_proposal(&f))
            .await
            .unwrap();

        assert_eq!(committed.state.revision, 6);
        assert!(committed.state.member(&f.invitee).is_some());
        assert!(!committed.signed_change.is_empty());
    }

    #[tokio::test]
    async fn test_conflict_maps_to_revision_conflict() {
        let f = fixture(5);
        f.authority.inject_fault(Fault::Conflict(7));
        let coordinator = CommitCoordinator::new(&f.authority, Duration::from_secs(5));

        let result = coordinator
            .commit(&f.group, &f.params, &accept_proposal(&f))
            .await;
        assert!(matches!(
            result,
            Err(GroupError::RevisionConflict {
                current_revision: 7
            })
        ));
    }

    #[tokio::test]
    async fn test_outage_maps_to_commit_unavailable() {
        let f = fixture(1);
        f.authority.inject_fault(Fault::Unavailable);
        let coordinator = CommitCoordinator::new(&f.authority, Duration::from_secs(5));

        let result = coordinator
            .commit(&f.group, &f.params, &accept_proposal(&f))
            .await;
        assert!(matches!(result, Err(GroupError::CommitUnavailable(_))));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_commit_unavailable() {
        let f = fixture(1);
        f.authority.set_latency(Duration::from_secs(10));
        let coordinator = CommitCoordinator::new(&f.authority, Duration::from_millis(50));

        let result = coordinator
            .commit(&f.group, &f.params, &accept_proposal(&f))
            .await;
        assert!(matches!(result, Err(GroupError::CommitUnavailable(_))));
    }

    #[tokio::test]
    async fn test_stale_proposal_rejected_locally() {
        let f = fixture(5);
        let proposal = accept_proposal(&f);
        let mut newer = f.group.clone();
        newer.revision = 6;

        let coordinator = CommitCoordinator::new(&f.authority, Duration::from_secs(5));
        let result = coordinator.commit(&newer, &f.params, &proposal).await;

        assert!(matches!(result, Err(GroupError::InvalidChange(_))));
        assert_eq!(f.authority.submit_count(), 0);
    }
}
