use super::{parse_group_id, resolve_members};
use crate::account::Account;
use crate::daemon::Daemon;
use crate::group::{Group, GroupError, Mutation, Role};
use crate::protocol::error::{ErrorKind, ProtocolError};
use crate::protocol::registry::RequestType;
use crate::protocol::schema::{examples, FieldKind, FieldSchema, OperationSchema};
use crate::protocol::types::{GroupInfo, GroupList};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

async fn group_info(account: &Account, group: &Group) -> GroupInfo {
    let data = account.data().await;
    GroupInfo::new(group, &data.recipients)
}

#[derive(Debug, Deserialize)]
pub struct AcceptInvitationRequest {
    pub account: String,
    pub group_id: String,
}

#[async_trait]
impl RequestType for AcceptInvitationRequest {
    const NAME: &'static str = "accept_invitation";

    type Output = GroupInfo;

    fn schema() -> OperationSchema {
        OperationSchema {
            name: Self::NAME,
            description: "Join a group the account has been invited to",
            fields: vec![FieldSchema::account(), FieldSchema::group_id()],
            result: "GroupInfo",
            errors: ErrorKind::GROUP_MUTATION.to_vec(),
        }
    }

    async fn run(self, daemon: &Daemon) -> Result<GroupInfo, ProtocolError> {
        let account = daemon.account(&self.account)?;
        let group_id = parse_group_id(&self.group_id)?;
        let group = daemon
            .groups()
            .mutate(&account, group_id, Mutation::AcceptInvitation)
            .await?;
        Ok(group_info(&account, &group).await)
    }
}

#[derive(Debug, Deserialize)]
pub struct LeaveGroupRequest {
    pub account: String,
    pub group_id: String,
}

#[async_trait]
impl RequestType for LeaveGroupRequest {
    const NAME: &'static str = "leave_group";

    type Output = GroupInfo;

    fn schema() -> OperationSchema {
        OperationSchema {
            name: Self::NAME,
            description: "Leave a group, or decline a pending invitation",
            fields: vec![FieldSchema::account(), FieldSchema::group_id()],
            result: "GroupInfo",
            errors: ErrorKind::GROUP_MUTATION.to_vec(),
        }
    }

    async fn run(self, daemon: &Daemon) -> Result<GroupInfo, ProtocolError> {
        let account = daemon.account(&self.account)?;
        let group_id = parse_group_id(&self.group_id)?;
        let group = daemon
            .groups()
            .mutate(&account, group_id, Mutation::LeaveGroup)
            .await?;
        Ok(group_info(&account, &group).await)
    }
}

#[derive(Debug, Deserialize)]
pub struct RoleChange {
    pub member: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGroupRequest {
    pub account: String,
    pub group_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub timer: Option<u32>,
    #[serde(default)]
    pub add_members: Option<Vec<String>>,
    #[serde(default)]
    pub remove_members: Option<Vec<String>>,
    #[serde(default)]
    pub update_role: Option<RoleChange>,
}

impl UpdateGroupRequest {
    fn requested_changes(&self) -> Vec<&'static str> {
        [
            ("title", self.title.is_some()),
            ("description", self.description.is_some()),
            ("timer", self.timer.is_some()),
            ("add_members", self.add_members.is_some()),
            ("remove_members", self.remove_members.is_some()),
            ("update_role", self.update_role.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, present)| present.then_some(name))
        .collect()
    }

    async fn into_mutation(self, account: &Account) -> Result<Mutation, ProtocolError> {
        let requested = self.requested_changes();
        if requested.len() != 1 {
            return Err(ProtocolError::new(
                ErrorKind::ValidationError,
                format!(
                    "update_group takes exactly one change per request, got {}",
                    requested.len()
                ),
            )
            .with_details(json!({ "field": "update_group", "requested": requested })));
        }

        let mutation = if let Some(title) = self.title {
            Mutation::UpdateTitle(title)
        } else if let Some(description) = self.description {
            Mutation::UpdateDescription(description)
        } else if let Some(timer) = self.timer {
            Mutation::UpdateTimer(timer)
        } else if let Some(members) = self.add_members {
            Mutation::AddMembers(resolve_members(account, "add_members", &members).await?)
        } else if let Some(members) = self.remove_members {
            Mutation::RemoveMembers(resolve_members(account, "remove_members", &members).await?)
        } else if let Some(change) = self.update_role {
            let member = resolve_members(account, "update_role", &[change.member]).await?;
            Mutation::UpdateRole {
                member: member[0],
                role: change.role,
            }
        } else {
            return Err(ProtocolError::validation("update_group", "no change requested"));
        };
        Ok(mutation)
    }
}

#[async_trait]
impl RequestType for UpdateGroupRequest {
    const NAME: &'static str = "update_group";

    type Output = GroupInfo;

    fn schema() -> OperationSchema {
        OperationSchema {
            name: Self::NAME,
            description: "Change one property of a group: title, description, timer, membership or a member's role",
            fields: vec![
                FieldSchema::account(),
                FieldSchema::group_id(),
                FieldSchema::optional("title", FieldKind::String, "New title, 1-32 characters")
                    .example("Book club"),
                FieldSchema::optional("description", FieldKind::String, "New description")
                    .example("Second Tuesday of the month"),
                FieldSchema::optional(
                    "timer",
                    FieldKind::Integer,
                    "Disappearing-message timer in seconds, 0 to turn off",
                )
                .example("3600"),
                FieldSchema::optional(
                    "add_members",
                    FieldKind::StringList,
                    "Members to add; those without a profile key credential are invited",
                )
                .example(examples::UUID),
                FieldSchema::optional("remove_members", FieldKind::StringList, "Members to remove")
                    .example(examples::UUID),
                FieldSchema::optional(
                    "update_role",
                    FieldKind::Object,
                    "Role change for one member: {member, role}",
                )
                .example(r#"{"member":"aeed01f0-a234-478e-8cf7-261c283151e7","role":"ADMINISTRATOR"}"#),
            ],
            result: "GroupInfo",
            errors: ErrorKind::GROUP_MUTATION.to_vec(),
        }
    }

    async fn run(self, daemon: &Daemon) -> Result<GroupInfo, ProtocolError> {
        let account = daemon.account(&self.account)?;
        let group_id = parse_group_id(&self.group_id)?;
        let mutation = self.into_mutation(&account).await?;
        let group = daemon.groups().mutate(&account, group_id, mutation).await?;
        Ok(group_info(&account, &group).await)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub account: String,
    pub title: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub timer: u32,
}

#[async_trait]
impl RequestType for CreateGroupRequest {
    const NAME: &'static str = "create_group";

    type Output = GroupInfo;

    fn schema() -> OperationSchema {
        OperationSchema {
            name: Self::NAME,
            description: "Create a group with the account as its administrator",
            fields: vec![
                FieldSchema::account(),
                FieldSchema::required("title", FieldKind::String, "Group title, 1-32 characters")
                    .example("Book club"),
                FieldSchema::optional(
                    "members",
                    FieldKind::StringList,
                    "Initial members; those without a profile key credential are invited",
                )
                .example(examples::UUID),
                FieldSchema::optional(
                    "timer",
                    FieldKind::Integer,
                    "Disappearing-message timer in seconds",
                )
                .example("0"),
            ],
            result: "GroupInfo",
            errors: vec![
                ErrorKind::ValidationError,
                ErrorKind::AccountNotFound,
                ErrorKind::InvalidKeyMaterial,
                ErrorKind::CommitUnavailable,
                ErrorKind::PersistenceError,
                ErrorKind::PartialDeliveryFailure,
            ],
        }
    }

    async fn run(self, daemon: &Daemon) -> Result<GroupInfo, ProtocolError> {
        let account = daemon.account(&self.account)?;
        let members = resolve_members(&account, "members", &self.members).await?;
        let group = daemon
            .groups()
            .create_group(&account, &self.title, &members, self.timer)
            .await?;
        Ok(group_info(&account, &group).await)
    }
}

#[derive(Debug, Deserialize)]
pub struct GetGroupRequest {
    pub account: String,
    pub group_id: String,
}

#[async_trait]
impl RequestType for GetGroupRequest {
    const NAME: &'static str = "get_group";

    type Output = GroupInfo;

    fn schema() -> OperationSchema {
        OperationSchema {
            name: Self::NAME,
            description: "Show a group, catching up with the authority when it is ahead of the cache",
            fields: vec![FieldSchema::account(), FieldSchema::group_id()],
            result: "GroupInfo",
            errors: vec![
                ErrorKind::ValidationError,
                ErrorKind::AccountNotFound,
                ErrorKind::UnknownGroup,
                ErrorKind::InvalidKeyMaterial,
                ErrorKind::PersistenceError,
            ],
        }
    }

    async fn run(self, daemon: &Daemon) -> Result<GroupInfo, ProtocolError> {
        let account = daemon.account(&self.account)?;
        let group_id = parse_group_id(&self.group_id)?;
        let group = match daemon.groups().refresh(&account, group_id).await {
            Ok(group) => group,
            Err(GroupError::CommitUnavailable(reason)) => {
                warn!(account = %account.id(), group = %group_id, %reason, "authority unreachable, serving cached group");
                daemon.groups().group(&account, &group_id).await?
            }
            Err(e) => return Err(e.into()),
        };
        Ok(group_info(&account, &group).await)
    }
}

#[derive(Debug, Deserialize)]
pub struct ListGroupsRequest {
    pub account: String,
}

#[async_trait]
impl RequestType for ListGroupsRequest {
    const NAME: &'static str = "list_groups";

    type Output = GroupList;

    fn schema() -> OperationSchema {
        OperationSchema {
            name: Self::NAME,
            description: "List the account's cached groups",
            fields: vec![FieldSchema::account()],
            result: "GroupList",
            errors: vec![ErrorKind::ValidationError, ErrorKind::AccountNotFound],
        }
    }

    async fn run(self, daemon: &Daemon) -> Result<GroupList, ProtocolError> {
        let account = daemon.account(&self.account)?;
        let groups = daemon.groups().groups(&account).await;
        let data = account.data().await;
        Ok(GroupList {
            groups: groups
                .iter()
                .map(|group| GroupInfo::new(group, &data.recipients))
                .collect(),
        })
    }
}
