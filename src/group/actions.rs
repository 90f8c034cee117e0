//! Wire-level group structures exchanged with the authority
//!
//! The authority only ever sees ciphertexts: member uids are encrypted
//! deterministically, attributes with fresh nonces. Members decrypt with the
//! group's [`GroupSecretParams`].

use super::model::{DecryptedGroup, DecryptedMember, DecryptedPendingMember, Role};
use crate::crypto::{
    BlobCiphertext, CredentialPresentation, GroupParamsError, GroupSecretParams, UuidCiphertext,
};
use serde::{Deserialize, Serialize};

/// One unsigned change to a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupAction {
    AddMember {
        role: Role,
        presentation: CredentialPresentation,
    },
    AddPendingMember {
        uid: UuidCiphertext,
        role: Role,
    },
    DeleteMember {
        uid: UuidCiphertext,
    },
    DeletePendingMember {
        uid: UuidCiphertext,
    },
    PromotePendingMember {
        presentation: CredentialPresentation,
    },
    ModifyMemberRole {
        uid: UuidCiphertext,
        role: Role,
    },
    ModifyTitle {
        title: BlobCiphertext,
    },
    ModifyDescription {
        description: BlobCiphertext,
    },
    ModifyDisappearingTimer {
        timer: BlobCiphertext,
    },
}

/// Unsigned action set tagged with the acting member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSet {
    pub source: UuidCiphertext,
    pub actions: Vec<GroupAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMember {
    pub uid: UuidCiphertext,
    pub role: Role,
    pub joined_at_revision: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPendingMember {
    pub uid: UuidCiphertext,
    pub role: Role,
    pub added_by: UuidCiphertext,
}

/// Group state as stored by the authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedGroupState {
    pub revision: u32,
    pub title: BlobCiphertext,
    #[serde(default)]
    pub description: Option<BlobCiphertext>,
    #[serde(default)]
    pub disappearing_timer: Option<BlobCiphertext>,
    pub members: Vec<EncryptedMember>,
    #[serde(default)]
    pub pending_members: Vec<EncryptedPendingMember>,
}

impl EncryptedGroupState {
    pub fn encrypt(
        params: &GroupSecretParams,
        group: &DecryptedGroup,
    ) -> Result<Self, GroupParamsError> {
        let members = group
            .members
            .iter()
            .map(|m| {
                Ok(EncryptedMember {
                    uid: params.encrypt_uuid(&m.uuid)?,
                    role: m.role,
                    joined_at_revision: m.joined_at_revision,
                })
            })
            .collect::<Result<Vec<_>, GroupParamsError>>()?;

        let pending_members = group
            .pending_members
            .iter()
            .map(|m| {
                Ok(EncryptedPendingMember {
                    uid: params.encrypt_uuid(&m.uuid)?,
                    role: m.role,
                    added_by: params.encrypt_uuid(&m.added_by)?,
                })
            })
            .collect::<Result<Vec<_>, GroupParamsError>>()?;

        let description = if group.description.is_empty() {
            None
        } else {
            Some(params.encrypt_blob(group.description.as_bytes())?)
        };

        let disappearing_timer = if group.disappearing_timer == 0 {
            None
        } else {
            Some(params.encrypt_timer(group.disappearing_timer)?)
        };

        Ok(Self {
            revision: group.revision,
            title: params.encrypt_title(&group.title)?,
            description,
            disappearing_timer,
            members,
            pending_members,
        })
    }

    pub fn decrypt(&self, params: &GroupSecretParams) -> Result<DecryptedGroup, GroupParamsError> {
        let members = self
            .members
            .iter()
            .map(|m| {
                Ok(DecryptedMember {
                    uuid: params.decrypt_uuid(&m.uid)?,
                    role: m.role,
                    joined_at_revision: m.joined_at_revision,
                })
            })
            .collect::<Result<Vec<_>, GroupParamsError>>()?;

        let pending_members = self
            .pending_members
            .iter()
            .map(|m| {
                Ok(DecryptedPendingMember {
                    uuid: params.decrypt_uuid(&m.uid)?,
                    role: m.role,
                    added_by: params.decrypt_uuid(&m.added_by)?,
                })
            })
            .collect::<Result<Vec<_>, GroupParamsError>>()?;

        Ok(DecryptedGroup {
            title: params.decrypt_string(&self.title)?,
            description: match &self.description {
                Some(blob) => params.decrypt_string(blob)?,
                None => String::new(),
            },
            revision: self.revision,
            disappearing_timer: match &self.disappearing_timer {
                Some(blob) => params.decrypt_timer(blob)?,
                None => 0,
            },
            members,
            pending_members,
        })
    }

    pub fn member(&self, uid: &UuidCiphertext) -> Option<&EncryptedMember> {
        self.members.iter().find(|m| &m.uid == uid)
    }

    pub fn is_admin(&self, uid: &UuidCiphertext) -> bool {
        self.member(uid)
            .is_some_and(|m| m.role == Role::Administrator)
    }
}

/// Authority-countersigned proof that a change was applied.
///
/// Opaque to this crate: embedded verbatim in broadcasts, never rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedChangeRecord(Vec<u8>);

impl SignedChangeRecord {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::GroupMasterKey;
    use uuid::Uuid;

    fn params() -> GroupSecretParams {
        GroupSecretParams::derive_from_master_key(&GroupMasterKey::from_slice(&[2u8; 32]).unwrap())
            .unwrap()
    }

    #[test]
    fn test_state_encrypt_decrypt() {
        let params = params();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let group = DecryptedGroup {
            title: "Garden".to_string(),
            description: "Plot 7".to_string(),
            revision: 3,
            disappearing_timer: 3600,
            members: vec![DecryptedMember {
                uuid: alice,
                role: Role::Administrator,
                joined_at_revision: 0,
            }],
            pending_members: vec![DecryptedPendingMember {
                uuid: bob,
                role: Role::Default,
                added_by: alice,
            }],
        };

        let encrypted = EncryptedGroupState::encrypt(&params, &group).unwrap();
        assert!(encrypted.is_admin(&params.encrypt_uuid(&alice).unwrap()));
        assert_eq!(encrypted.decrypt(&params).unwrap(), group);
    }

    #[test]
    fn test_empty_attributes_are_omitted() {
        let params = params();
        let group = DecryptedGroup {
            title: "Garden".to_string(),
            ..Default::default()
        };
        let encrypted = EncryptedGroupState::encrypt(&params, &group).unwrap();
        assert!(encrypted.description.is_none());
        assert!(encrypted.disappearing_timer.is_none());
    }

    #[test]
    fn test_decrypt_with_wrong_params_fails() {
        let group = DecryptedGroup {
            title: "Garden".to_string(),
            ..Default::default()
        };
        let encrypted = EncryptedGroupState::encrypt(&params(), &group).unwrap();

        let other = GroupSecretParams::derive_from_master_key(
            &GroupMasterKey::from_slice(&[3u8; 32]).unwrap(),
        )
        .unwrap();
        assert!(encrypted.decrypt(&other).is_err());
    }
}
