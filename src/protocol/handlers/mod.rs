//! Operation handlers
//!
//! One input struct per operation; each implements
//! [`RequestType`](super::registry::RequestType) and is registered in
//! [`Registry::new`](super::registry::Registry::new).

mod address;
mod groups;
mod identities;

pub use address::ResolveAddressRequest;
pub use groups::{
    AcceptInvitationRequest, CreateGroupRequest, GetGroupRequest, LeaveGroupRequest,
    ListGroupsRequest, RoleChange, UpdateGroupRequest,
};
pub use identities::{GetIdentitiesRequest, TrustRequest};

use super::error::ProtocolError;
use crate::account::Account;
use crate::address::Address;
use crate::group::GroupId;
use uuid::Uuid;

fn parse_group_id(group_id: &str) -> Result<GroupId, ProtocolError> {
    GroupId::from_hex(group_id).map_err(|e| ProtocolError::validation("group_id", e.to_string()))
}

/// Resolve client-supplied member identifiers to stable ids.
///
/// Number-only identifiers pick up a uuid through the account's address book;
/// an identifier with no known uuid is rejected as `field`. The book is only
/// updated, and persisted, once every identifier resolved.
async fn resolve_members(
    account: &Account,
    field: &str,
    identifiers: &[String],
) -> Result<Vec<Uuid>, ProtocolError> {
    let mut data = account.data().await;
    let mut book = data.recipients.clone();
    let mut uuids = Vec::with_capacity(identifiers.len());
    for identifier in identifiers {
        let partial = Address::from_identifier(identifier)
            .map_err(|e| ProtocolError::validation(field, e.to_string()))?;
        let resolved = book
            .resolve(&partial)
            .map_err(|e| ProtocolError::validation(field, e.to_string()))?;
        let uuid = resolved.uuid.ok_or_else(|| {
            ProtocolError::validation(field, format!("no stable id known for {}", identifier))
        })?;
        uuids.push(uuid);
    }

    if book != data.recipients {
        data.recipients = book;
        account.persist(&data).await?;
    }
    Ok(uuids)
}
