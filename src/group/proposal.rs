//! Change proposals
//!
//! Pure construction: turns a requested [`Mutation`] into an unsigned
//! [`ActionSet`] for the cached group. No network, no persistence. Any
//! credential the mutation needs must already be in hand; a missing one is
//! reported as `CredentialUnavailable` instead of being papered over.

use super::actions::{ActionSet, GroupAction};
use super::error::{GroupError, GroupResult};
use super::model::{Group, Role};
use crate::address::Address;
use crate::crypto::{CredentialPresentation, GroupSecretParams, ProfileKeyCredential};
use std::collections::HashMap;
use uuid::Uuid;

/// Longest accepted title, in characters
pub const MAX_TITLE_LEN: usize = 32;

/// Longest accepted description, in characters
pub const MAX_DESCRIPTION_LEN: usize = 480;

/// Requested change to a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Join a group we were invited to (needs our own credential)
    AcceptInvitation,
    /// Leave, or decline a pending invitation
    LeaveGroup,
    /// Add members; those without a credential are invited instead
    AddMembers(Vec<Uuid>),
    RemoveMembers(Vec<Uuid>),
    UpdateTitle(String),
    UpdateDescription(String),
    UpdateTimer(u32),
    UpdateRole { member: Uuid, role: Role },
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::AcceptInvitation => "accept_invitation",
            Mutation::LeaveGroup => "leave_group",
            Mutation::AddMembers(_) => "add_members",
            Mutation::RemoveMembers(_) => "remove_members",
            Mutation::UpdateTitle(_) => "update_title",
            Mutation::UpdateDescription(_) => "update_description",
            Mutation::UpdateTimer(_) => "update_timer",
            Mutation::UpdateRole { .. } => "update_role",
        }
    }

    /// Members whose profile-key credentials the builder will look for.
    pub fn credential_subjects(&self, own_uuid: Uuid) -> Vec<Uuid> {
        match self {
            Mutation::AcceptInvitation => vec![own_uuid],
            Mutation::AddMembers(members) => members.clone(),
            _ => Vec::new(),
        }
    }
}

/// Credentials fetched by the caller before building
pub type Credentials = HashMap<Uuid, ProfileKeyCredential>;

/// A built action set bound to the revision it was built against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeProposal {
    pub actions: ActionSet,
    pub source: Uuid,
    /// Always cached revision + 1
    pub target_revision: u32,
}

pub struct ChangeProposalBuilder<'a> {
    params: &'a GroupSecretParams,
    group: &'a Group,
    source: Uuid,
}

impl<'a> ChangeProposalBuilder<'a> {
    pub fn new(params: &'a GroupSecretParams, group: &'a Group, source: Uuid) -> Self {
        Self {
            params,
            group,
            source,
        }
    }

    /// Build the proposal for `mutation` against the cached revision.
    pub fn build(&self, mutation: &Mutation, credentials: &Credentials) -> GroupResult<ChangeProposal> {
        let actions = match mutation {
            Mutation::AcceptInvitation => vec![self.accept_invitation(credentials)?],
            Mutation::LeaveGroup => vec![self.leave()?],
            Mutation::AddMembers(members) => self.add_members(members, credentials)?,
            Mutation::RemoveMembers(members) => self.remove_members(members)?,
            Mutation::UpdateTitle(title) => vec![self.update_title(title)?],
            Mutation::UpdateDescription(description) => {
                vec![self.update_description(description)?]
            }
            Mutation::UpdateTimer(seconds) => vec![GroupAction::ModifyDisappearingTimer {
                timer: self.params.encrypt_timer(*seconds)?,
            }],
            Mutation::UpdateRole { member, role } => vec![self.update_role(member, *role)?],
        };

        Ok(ChangeProposal {
            actions: ActionSet {
                source: self.params.encrypt_uuid(&self.source)?,
                actions,
            },
            source: self.source,
            target_revision: self.group.revision + 1,
        })
    }

    fn accept_invitation(&self, credentials: &Credentials) -> GroupResult<GroupAction> {
        let credential = credentials
            .get(&self.source)
            .ok_or_else(|| GroupError::CredentialUnavailable(Address::from_uuid(self.source)))?;

        let uid = self.params.encrypt_uuid(&self.source)?;
        let presentation = CredentialPresentation::present(self.params, credential, uid)?;
        Ok(GroupAction::PromotePendingMember { presentation })
    }

    fn leave(&self) -> GroupResult<GroupAction> {
        let uid = self.params.encrypt_uuid(&self.source)?;
        if self.group.is_member(&self.source) {
            Ok(GroupAction::DeleteMember { uid })
        } else if self.group.is_pending(&self.source) {
            Ok(GroupAction::DeletePendingMember { uid })
        } else {
            Err(GroupError::InvalidChange("not a member of this group".into()))
        }
    }

    fn add_members(&self, members: &[Uuid], credentials: &Credentials) -> GroupResult<Vec<GroupAction>> {
        if members.is_empty() {
            return Err(GroupError::InvalidChange("no members to add".into()));
        }

        let mut actions = Vec::with_capacity(members.len());
        for member in members {
            if self.group.is_member(member) {
                continue;
            }

            let uid = self.params.encrypt_uuid(member)?;
            match credentials.get(member) {
                Some(credential) => actions.push(GroupAction::AddMember {
                    role: Role::Default,
                    presentation: CredentialPresentation::present(self.params, credential, uid)?,
                }),
                None if self.group.is_pending(member) => {}
                None => actions.push(GroupAction::AddPendingMember {
                    uid,
                    role: Role::Default,
                }),
            }
        }

        if actions.is_empty() {
            return Err(GroupError::InvalidChange(
                "all requested members are already in the group".into(),
            ));
        }
        Ok(actions)
    }

    fn remove_members(&self, members: &[Uuid]) -> GroupResult<Vec<GroupAction>> {
        if members.is_empty() {
            return Err(GroupError::InvalidChange("no members to remove".into()));
        }

        members
            .iter()
            .map(|member| {
                let uid = self.params.encrypt_uuid(member)?;
                if self.group.is_member(member) {
                    Ok(GroupAction::DeleteMember { uid })
                } else if self.group.is_pending(member) {
                    Ok(GroupAction::DeletePendingMember { uid })
                } else {
                    Err(GroupError::InvalidChange(format!("{} is not in the group", member)))
                }
            })
            .collect()
    }

    fn update_title(&self, title: &str) -> GroupResult<GroupAction> {
        let len = title.chars().count();
        if len == 0 || len > MAX_TITLE_LEN {
            return Err(GroupError::InvalidChange(format!(
                "title must be 1-{} characters",
                MAX_TITLE_LEN
            )));
        }
        Ok(GroupAction::ModifyTitle {
            title: self.params.encrypt_title(title)?,
        })
    }

    fn update_description(&self, description: &str) -> GroupResult<GroupAction> {
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(GroupError::InvalidChange(format!(
                "description must be at most {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }
        Ok(GroupAction::ModifyDescription {
            description: self.params.encrypt_blob(description.as_bytes())?,
        })
    }

    fn update_role(&self, member: &Uuid, role: Role) -> GroupResult<GroupAction> {
        if !self.group.is_member(member) {
            return Err(GroupError::InvalidChange(format!("{} is not a member", member)));
        }
        Ok(GroupAction::ModifyMemberRole {
            uid: self.params.encrypt_uuid(member)?,
            role,
        })
    }
}
