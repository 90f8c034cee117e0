//! Per-account snapshot
//!
//! Everything the daemon knows about one account, saved and loaded as a
//! single unit so a write is atomic at account granularity.

use crate::address::{Address, AddressBook};
use crate::crypto::ProfileKeyCredential;
use crate::group::{Group, GroupId};
use crate::trust::{IdentityKey, IdentityKeyStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Bumped whenever the snapshot layout changes incompatibly.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountData {
    pub schema_version: u32,
    pub account_id: String,
    pub address: Address,
    pub identity_key: IdentityKey,
    /// Cached groups keyed by hex group id
    #[serde(default)]
    pub groups: BTreeMap<String, Group>,
    #[serde(default)]
    pub identity_keys: IdentityKeyStore,
    #[serde(default)]
    pub recipients: AddressBook,
    #[serde(default)]
    pub credentials: BTreeMap<Uuid, ProfileKeyCredential>,
}

impl AccountData {
    pub fn new(account_id: impl Into<String>, address: Address, identity_key: IdentityKey) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            account_id: account_id.into(),
            address,
            identity_key,
            groups: BTreeMap::new(),
            identity_keys: IdentityKeyStore::new(),
            recipients: AddressBook::new(),
            credentials: BTreeMap::new(),
        }
    }

    pub fn group(&self, id: &GroupId) -> Option<&Group> {
        self.groups.get(&id.to_hex())
    }

    /// Insert or replace the cached copy of a group.
    pub fn upsert_group(&mut self, group: Group) {
        self.groups.insert(group.id.to_hex(), group);
    }

    pub fn remove_group(&mut self, id: &GroupId) -> Option<Group> {
        self.groups.remove(&id.to_hex())
    }

    pub fn credential(&self, uuid: &Uuid) -> Option<&ProfileKeyCredential> {
        self.credentials.get(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::GroupMasterKey;
    use crate::group::DecryptedGroup;
    use crate::serialization::{from_cbor, to_cbor};

    fn identity_key() -> IdentityKey {
        let mut bytes = [7u8; 33];
        bytes[0] = crate::trust::identity_key::DJB_KEY_TYPE;
        IdentityKey::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn test_groups_keyed_by_hex_id() {
        let mut data = AccountData::new("alice", Address::from_uuid(Uuid::new_v4()), identity_key());
        let group = Group::new(
            GroupMasterKey::from_slice(&[1u8; 32]).unwrap(),
            DecryptedGroup {
                title: "Hikers".into(),
                ..Default::default()
            },
        )
        .unwrap();
        let id = group.id;

        data.upsert_group(group);
        assert!(data.groups.contains_key(&id.to_hex()));
        assert_eq!(data.group(&id).unwrap().state.title, "Hikers");
        assert!(data.remove_group(&id).is_some());
        assert!(data.group(&id).is_none());
    }

    #[test]
    fn test_snapshot_survives_cbor() {
        let uuid = Uuid::new_v4();
        let mut data = AccountData::new("alice", Address::from_uuid(uuid), identity_key());
        data.credentials
            .insert(uuid, ProfileKeyCredential::new(vec![9, 9, 9]));
        data.identity_keys
            .observe(&Address::from_number("+15550001"), &[5u8; 33], 1_000);

        let restored: AccountData = from_cbor(&to_cbor(&data).unwrap()).unwrap();
        assert_eq!(restored.schema_version, SCHEMA_VERSION);
        assert_eq!(restored.address, data.address);
        assert_eq!(restored.identity_keys, data.identity_keys);
        assert_eq!(restored.credential(&uuid).unwrap().as_bytes(), &[9, 9, 9]);
    }
}
