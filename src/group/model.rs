//! Cached group state
//!
//! A [`Group`] is the account's local copy of a revisioned group. It changes
//! only through a successful commit followed by [`crate::group::applier`].

use crate::address::Address;
use crate::crypto::{GroupMasterKey, GroupParamsError, GroupSecretParams};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// Public group identifier, derived from the master key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId([u8; 32]);

impl GroupId {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse the hex form used on the wire and in snapshot keys.
    pub fn from_hex(s: &str) -> Result<Self, GroupIdError> {
        let bytes = hex::decode(s.trim()).map_err(|_| GroupIdError::NotHex)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| GroupIdError::WrongLength(v.len()))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({})", self.to_hex())
    }
}

impl Serialize for GroupId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for GroupId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        GroupId::from_hex(&s).map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupIdError {
    #[error("group id is not hex")]
    NotHex,

    #[error("group id must be {len} bytes, got {0}", len = GroupId::LEN)]
    WrongLength(usize),
}

/// Member access level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    Default,
    Administrator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedMember {
    pub uuid: Uuid,
    pub role: Role,
    pub joined_at_revision: u32,
}

/// Invited but not yet joined
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedPendingMember {
    pub uuid: Uuid,
    pub role: Role,
    pub added_by: Uuid,
}

/// Plaintext membership/state snapshot as last acknowledged by the authority
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecryptedGroup {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub revision: u32,
    /// Seconds, 0 = off
    #[serde(default)]
    pub disappearing_timer: u32,
    pub members: Vec<DecryptedMember>,
    #[serde(default)]
    pub pending_members: Vec<DecryptedPendingMember>,
}

impl DecryptedGroup {
    pub fn member(&self, uuid: &Uuid) -> Option<&DecryptedMember> {
        self.members.iter().find(|m| &m.uuid == uuid)
    }

    pub fn pending_member(&self, uuid: &Uuid) -> Option<&DecryptedPendingMember> {
        self.pending_members.iter().find(|m| &m.uuid == uuid)
    }
}

/// Revisioned group as cached by one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub master_key: GroupMasterKey,
    /// Last revision acknowledged by the authority
    pub revision: u32,
    pub state: DecryptedGroup,
}

impl Group {
    /// Build a cache entry for a newly discovered group.
    pub fn new(master_key: GroupMasterKey, state: DecryptedGroup) -> Result<Self, GroupParamsError> {
        let params = GroupSecretParams::derive_from_master_key(&master_key)?;
        Ok(Self {
            id: params.group_id(),
            revision: state.revision,
            master_key,
            state,
        })
    }

    pub fn is_member(&self, uuid: &Uuid) -> bool {
        self.state.member(uuid).is_some()
    }

    pub fn is_pending(&self, uuid: &Uuid) -> bool {
        self.state.pending_member(uuid).is_some()
    }

    pub fn pending_invites(&self) -> &[DecryptedPendingMember] {
        &self.state.pending_members
    }

    /// Addresses of every full member, in roster order.
    pub fn member_addresses(&self) -> Vec<Address> {
        self.state
            .members
            .iter()
            .map(|m| Address::from_uuid(m.uuid))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_id_hex_roundtrip() {
        let id = GroupId::from_bytes([0xab; 32]);
        assert_eq!(GroupId::from_hex(&id.to_hex()).unwrap(), id);
        assert_eq!(format!("{}", id).len(), 64);
    }

    #[test]
    fn test_group_id_rejects_short_input() {
        assert_eq!(GroupId::from_hex("abcd"), Err(GroupIdError::WrongLength(2)));
        assert_eq!(GroupId::from_hex("zz"), Err(GroupIdError::NotHex));
        assert_eq!(
            GroupIdError::WrongLength(2).to_string(),
            "group id must be 32 bytes, got 2"
        );
    }

    #[test]
    fn test_group_id_serializes_as_string() {
        let id = GroupId::from_bytes([1; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(32)));
    }

    #[test]
    fn test_new_group_takes_state_revision() {
        let alice = Uuid::new_v4();
        let state = DecryptedGroup {
            title: "Book club".to_string(),
            revision: 5,
            members: vec![DecryptedMember {
                uuid: alice,
                role: Role::Administrator,
                joined_at_revision: 0,
            }],
            ..Default::default()
        };

        let key = GroupMasterKey::from_slice(&[7u8; 32]).unwrap();
        let group = Group::new(key, state).unwrap();

        assert_eq!(group.revision, 5);
        assert!(group.is_member(&alice));
        assert_eq!(group.member_addresses(), vec![Address::from_uuid(alice)]);
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(
            serde_json::to_string(&Role::Administrator).unwrap(),
            "\"ADMINISTRATOR\""
        );
    }
}
