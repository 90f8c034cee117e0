//! Result payloads
//!
//! Member uuids are enriched with whatever the account's address book knows,
//! so clients see numbers alongside uuids when they have been learned.

use crate::address::{Address, AddressBook};
use crate::group::{Group, Role};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMemberInfo {
    pub address: Address,
    pub role: Role,
    pub joined_at_revision: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingMemberInfo {
    pub address: Address,
    pub role: Role,
    pub added_by: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupInfo {
    pub id: String,
    pub revision: u32,
    pub title: String,
    pub description: String,
    /// Disappearing-message timer in seconds, 0 = off
    pub timer: u32,
    pub members: Vec<GroupMemberInfo>,
    pub pending_members: Vec<PendingMemberInfo>,
}

impl GroupInfo {
    pub fn new(group: &Group, book: &AddressBook) -> Self {
        let known = |uuid| {
            let address = Address::from_uuid(uuid);
            book.lookup(&address).cloned().unwrap_or(address)
        };

        Self {
            id: group.id.to_hex(),
            revision: group.revision,
            title: group.state.title.clone(),
            description: group.state.description.clone(),
            timer: group.state.disappearing_timer,
            members: group
                .state
                .members
                .iter()
                .map(|m| GroupMemberInfo {
                    address: known(m.uuid),
                    role: m.role,
                    joined_at_revision: m.joined_at_revision,
                })
                .collect(),
            pending_members: group
                .state
                .pending_members
                .iter()
                .map(|p| PendingMemberInfo {
                    address: known(p.uuid),
                    role: p.role,
                    added_by: known(p.added_by),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupList {
    pub groups: Vec<GroupInfo>,
}

/// Success without a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Empty {}
