//! Group mutation engine
//!
//! Runs one mutation end to end:
//!
//! 1. take the (account, group) lock
//! 2. copy the cached group, derive its parameters
//! 3. gather credentials (snapshot cache first, then the account context)
//! 4. build the proposal against the cached revision
//! 5. commit with a bounded wait
//! 6. apply the authoritative result and persist the snapshot
//! 7. release the lock, then broadcast
//!
//! Errors from steps 2-5 leave the cache untouched. A failed snapshot write
//! takes precedence over a delivery failure in what the caller sees, but the
//! broadcast is still attempted because the authority already holds the change.

use super::applier::{apply_and_persist, AppliedChange};
use super::broadcast::ChangeBroadcaster;
use super::coordinator::{authority_error, CommitCoordinator};
use super::error::{GroupError, GroupResult};
use super::locks::GroupLocks;
use super::actions::EncryptedGroupState;
use super::model::{DecryptedGroup, DecryptedMember, DecryptedPendingMember, Group, GroupId, Role};
use super::proposal::{ChangeProposalBuilder, Credentials, Mutation, MAX_TITLE_LEN};
use crate::account::Account;
use crate::address::Address;
use crate::authority::GroupAuthority;
use crate::crypto::{GroupMasterKey, GroupSecretParams};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct GroupsManager {
    authority: Arc<dyn GroupAuthority>,
    locks: GroupLocks,
    commit_timeout: Duration,
    delivery_timeout: Duration,
}

impl GroupsManager {
    pub fn new(
        authority: Arc<dyn GroupAuthority>,
        commit_timeout: Duration,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            authority,
            locks: GroupLocks::new(),
            commit_timeout,
            delivery_timeout,
        }
    }

    /// Cached copy of one group.
    pub async fn group(&self, account: &Account, group_id: &GroupId) -> GroupResult<Group> {
        account
            .data()
            .await
            .group(group_id)
            .cloned()
            .ok_or(GroupError::UnknownGroup(*group_id))
    }

    /// Every cached group of the account, ordered by group id.
    pub async fn groups(&self, account: &Account) -> Vec<Group> {
        account.data().await.groups.values().cloned().collect()
    }

    /// Apply `mutation` to a cached group through the authority.
    pub async fn mutate(
        &self,
        account: &Account,
        group_id: GroupId,
        mutation: Mutation,
    ) -> GroupResult<Group> {
        let guard = self.locks.acquire(account.id(), group_id).await;

        let group = self.group(account, &group_id).await?;
        let params = GroupSecretParams::derive_from_master_key(&group.master_key)?;
        let own_uuid = own_uuid(account)?;

        let credentials = self
            .collect_credentials(account, &mutation.credential_subjects(own_uuid))
            .await;
        let proposal =
            ChangeProposalBuilder::new(&params, &group, own_uuid).build(&mutation, &credentials)?;

        debug!(
            account = %account.id(),
            group = %group_id,
            mutation = mutation.name(),
            revision = group.revision,
            "committing mutation"
        );

        let committed = CommitCoordinator::new(self.authority.as_ref(), self.commit_timeout)
            .commit(&group, &params, &proposal)
            .await?;

        // Drop the group only once the authority no longer lists us.
        let retire = committed.state.member(&own_uuid).is_none()
            && committed.state.pending_member(&own_uuid).is_none();
        if mutation == Mutation::LeaveGroup && !retire {
            warn!(account = %account.id(), group = %group_id, "authority kept us in the group after leave");
        }
        let applied = apply_and_persist(account, group, committed, retire).await;
        drop(guard);

        self.finish(account, applied).await
    }

    /// Create a new group with ourselves as administrator.
    ///
    /// Members with a known credential join directly; the rest are invited.
    pub async fn create_group(
        &self,
        account: &Account,
        title: &str,
        members: &[Uuid],
        disappearing_timer: u32,
    ) -> GroupResult<Group> {
        let title_len = title.chars().count();
        if title_len == 0 || title_len > MAX_TITLE_LEN {
            return Err(GroupError::InvalidChange(format!(
                "title must be 1-{} characters",
                MAX_TITLE_LEN
            )));
        }

        let own_uuid = own_uuid(account)?;
        let mut others: Vec<Uuid> = Vec::with_capacity(members.len());
        for member in members {
            if *member != own_uuid && !others.contains(member) {
                others.push(*member);
            }
        }
        let credentials = self.collect_credentials(account, &others).await;

        let mut state = DecryptedGroup {
            title: title.to_string(),
            disappearing_timer,
            members: vec![DecryptedMember {
                uuid: own_uuid,
                role: Role::Administrator,
                joined_at_revision: 0,
            }],
            ..Default::default()
        };
        for member in others {
            if credentials.contains_key(&member) {
                state.members.push(DecryptedMember {
                    uuid: member,
                    role: Role::Default,
                    joined_at_revision: 0,
                });
            } else {
                state.pending_members.push(DecryptedPendingMember {
                    uuid: member,
                    role: Role::Default,
                    added_by: own_uuid,
                });
            }
        }

        let master_key = GroupMasterKey::generate();
        let params = GroupSecretParams::derive_from_master_key(&master_key)?;
        let encrypted = EncryptedGroupState::encrypt(&params, &state)?;
        let group_id = params.group_id();

        let guard = self.locks.acquire(account.id(), group_id).await;
        let create = self.authority.create_group(&group_id, &encrypted);
        let signed_change = match tokio::time::timeout(self.commit_timeout, create).await {
            Ok(result) => result.map_err(|e| authority_error(e, group_id))?,
            Err(_) => {
                return Err(GroupError::CommitUnavailable(
                    "group creation was not acknowledged in time".into(),
                ))
            }
        };

        let group = Group::new(master_key, state)?;
        let persisted = {
            let mut data = account.data().await;
            data.upsert_group(group.clone());
            account.persist(&data).await
        };
        drop(guard);

        info!(account = %account.id(), group = %group_id, "group created");
        self.finish(
            account,
            AppliedChange {
                group,
                signed_change,
                persisted,
            },
        )
        .await
    }

    /// Adopt the authority's state when it is ahead of the cache.
    ///
    /// This is how a caller re-syncs after `RevisionConflict` or an ambiguous
    /// `CommitUnavailable` before deciding whether to retry.
    pub async fn refresh(&self, account: &Account, group_id: GroupId) -> GroupResult<Group> {
        let _guard = self.locks.acquire(account.id(), group_id).await;

        let mut group = self.group(account, &group_id).await?;
        let params = GroupSecretParams::derive_from_master_key(&group.master_key)?;

        let fetch = self.authority.fetch_group(&group_id);
        let remote = match tokio::time::timeout(self.commit_timeout, fetch).await {
            Ok(result) => result.map_err(|e| authority_error(e, group_id))?,
            Err(_) => {
                return Err(GroupError::CommitUnavailable(
                    "authority did not answer in time".into(),
                ))
            }
        };

        if remote.revision <= group.revision {
            if remote.revision < group.revision {
                warn!(
                    group = %group_id,
                    cached = group.revision,
                    remote = remote.revision,
                    "authority reports an older revision than the cache"
                );
            }
            return Ok(group);
        }

        let state = remote.decrypt(&params)?;
        info!(
            account = %account.id(),
            group = %group_id,
            from = group.revision,
            to = remote.revision,
            "adopting authoritative revision"
        );
        group.revision = remote.revision;
        group.state = state;

        let mut data = account.data().await;
        data.upsert_group(group.clone());
        account
            .persist(&data)
            .await
            .map_err(|source| GroupError::Persistence {
                revision: group.revision,
                source,
            })?;
        Ok(group)
    }

    /// Cache a group learned from a master key (e.g. an incoming invite).
    pub async fn discover(&self, account: &Account, master_key: GroupMasterKey) -> GroupResult<Group> {
        let params = GroupSecretParams::derive_from_master_key(&master_key)?;
        let group_id = params.group_id();
        if self.group(account, &group_id).await.is_ok() {
            return self.refresh(account, group_id).await;
        }

        let _guard = self.locks.acquire(account.id(), group_id).await;
        let fetch = self.authority.fetch_group(&group_id);
        let remote = match tokio::time::timeout(self.commit_timeout, fetch).await {
            Ok(result) => result.map_err(|e| authority_error(e, group_id))?,
            Err(_) => {
                return Err(GroupError::CommitUnavailable(
                    "authority did not answer in time".into(),
                ))
            }
        };

        let group = Group::new(master_key, remote.decrypt(&params)?)?;
        let mut data = account.data().await;
        data.upsert_group(group.clone());
        account
            .persist(&data)
            .await
            .map_err(|source| GroupError::Persistence {
                revision: group.revision,
                source,
            })?;

        info!(account = %account.id(), group = %group_id, revision = group.revision, "group discovered");
        Ok(group)
    }

    async fn finish(&self, account: &Account, applied: AppliedChange) -> GroupResult<Group> {
        let delivery = ChangeBroadcaster::new(account.context(), self.delivery_timeout)
            .broadcast(&applied.group, &applied.signed_change)
            .await;

        if let Err(source) = applied.persisted {
            return Err(GroupError::Persistence {
                revision: applied.group.revision,
                source,
            });
        }
        delivery?;
        Ok(applied.group)
    }

    /// Credentials for `subjects`; whatever cannot be found is left out.
    async fn collect_credentials(&self, account: &Account, subjects: &[Uuid]) -> Credentials {
        let mut credentials = Credentials::new();
        let mut missing = Vec::new();
        {
            let data = account.data().await;
            for subject in subjects {
                match data.credential(subject) {
                    Some(credential) => {
                        credentials.insert(*subject, credential.clone());
                    }
                    None => missing.push(*subject),
                }
            }
        }

        let mut fetched = Vec::new();
        for subject in missing {
            let address = Address::from_uuid(subject);
            let lookup = account.context().profile_key_credential(&address);
            match tokio::time::timeout(self.commit_timeout, lookup).await {
                Ok(Some(credential)) => fetched.push((subject, credential)),
                Ok(None) => debug!(member = %subject, "no profile key credential"),
                Err(_) => warn!(member = %subject, "credential lookup timed out"),
            }
        }

        if !fetched.is_empty() {
            let mut data = account.data().await;
            for (subject, credential) in &fetched {
                data.credentials.insert(*subject, credential.clone());
            }
        }
        credentials.extend(fetched);
        credentials
    }
}

fn own_uuid(account: &Account) -> GroupResult<Uuid> {
    account
        .context()
        .own_address()
        .uuid
        .ok_or_else(|| GroupError::InvalidChange("account has no stable id".into()))
}
