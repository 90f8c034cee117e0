//! Change broadcaster
//!
//! Tells the other members about a committed change. The envelope carries
//! the master key, the new revision and the authority's signed record
//! verbatim. Delivery problems are reported but never undo the change.

use super::actions::SignedChangeRecord;
use super::error::{GroupError, GroupResult};
use super::model::Group;
use crate::account::AccountContext;
use crate::address::Address;
use crate::crypto::GroupMasterKey;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Group context attached to an outbound group update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupContextEnvelope {
    pub master_key: GroupMasterKey,
    pub revision: u32,
    pub signed_change: SignedChangeRecord,
}

pub struct ChangeBroadcaster<'a> {
    context: &'a dyn AccountContext,
    timeout: Duration,
}

impl<'a> ChangeBroadcaster<'a> {
    pub fn new(context: &'a dyn AccountContext, timeout: Duration) -> Self {
        Self { context, timeout }
    }

    /// Recipients: every full member (ourselves included, so our other
    /// devices follow along) and every pending invitee.
    pub fn recipients(group: &Group) -> Vec<Address> {
        let mut recipients = group.member_addresses();
        recipients.extend(
            group
                .pending_invites()
                .iter()
                .map(|p| Address::from_uuid(p.uuid)),
        );
        recipients
    }

    /// Deliver the change; returns the number of recipients reached.
    pub async fn broadcast(
        &self,
        group: &Group,
        signed_change: &SignedChangeRecord,
    ) -> GroupResult<usize> {
        let recipients = Self::recipients(group);
        if recipients.is_empty() {
            return Ok(0);
        }

        let envelope = GroupContextEnvelope {
            master_key: group.master_key.clone(),
            revision: group.revision,
            signed_change: signed_change.clone(),
        };

        let attempted = recipients.len();
        let send = self.context.send_group_message(&envelope, &recipients);
        let result = match tokio::time::timeout(self.timeout, send).await {
            Ok(result) => result,
            Err(_) => {
                warn!(group = %group.id, revision = group.revision, "broadcast timed out");
                return Err(GroupError::PartialDelivery {
                    revision: group.revision,
                    attempted,
                    delivered: 0,
                    failed: recipients
                        .into_iter()
                        .map(|r| (r, "delivery timed out".to_string()))
                        .collect(),
                });
            }
        };

        if !result.is_complete() {
            warn!(
                group = %group.id,
                revision = group.revision,
                failed = result.failed.len(),
                "broadcast incomplete"
            );
            return Err(GroupError::PartialDelivery {
                revision: group.revision,
                attempted,
                delivered: result.delivered.len(),
                failed: result.failed,
            });
        }

        info!(group = %group.id, revision = group.revision, recipients = attempted, "change broadcast");
        Ok(result.delivered.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::LoopbackAccount;
    use crate::group::model::{DecryptedGroup, DecryptedMember, DecryptedPendingMember, Role};
    use crate::trust::IdentityKey;
    use uuid::Uuid;

    fn loopback(own: Uuid) -> LoopbackAccount {
        let mut key = [2u8; 33];
        key[0] = crate::trust::identity_key::DJB_KEY_TYPE;
        LoopbackAccount::new(Address::from_uuid(own), IdentityKey::from_bytes(&key).unwrap())
    }

    fn group(members: &[Uuid], pending: &[Uuid]) -> Group {
        let state = DecryptedGroup {
            title: "Cyclists".into(),
            revision: 6,
            members: members
                .iter()
                .map(|uuid| DecryptedMember {
                    uuid: *uuid,
                    role: Role::Default,
                    joined_at_revision: 0,
                })
                .collect(),
            pending_members: pending
                .iter()
                .map(|uuid| DecryptedPendingMember {
                    uuid: *uuid,
                    role: Role::Default,
                    added_by: members[0],
                })
                .collect(),
            ..Default::default()
        };
        Group::new(GroupMasterKey::from_slice(&[5u8; 32]).unwrap(), state).unwrap()
    }

    #[tokio::test]
    async fn test_broadcast_reaches_members_and_invitees() {
        let own = Uuid::new_v4();
        let other = Uuid::new_v4();
        let invitee = Uuid::new_v4();
        let context = loopback(own);
        let g = group(&[own, other], &[invitee]);
        let record = SignedChangeRecord::from_bytes(vec![1, 2, 3]);

        let delivered = ChangeBroadcaster::new(&context, Duration::from_secs(5))
            .broadcast(&g, &record)
            .await
            .unwrap();

        assert_eq!(delivered, 3);
        assert_eq!(
            context.outbox_recipients(),
            vec![
                Address::from_uuid(own),
                Address::from_uuid(other),
                Address::from_uuid(invitee)
            ]
        );
        let sent = &context.outbox()[0].envelope;
        assert_eq!(sent.revision, 6);
        assert_eq!(sent.signed_change, record);
    }

    #[tokio::test]
    async fn test_broadcast_reports_partial_failure() {
        let own = Uuid::new_v4();
        let other = Uuid::new_v4();
        let context = loopback(own);
        context.set_unreachable(Address::from_uuid(other));
        let g = group(&[own, other], &[]);

        let result = ChangeBroadcaster::new(&context, Duration::from_secs(5))
            .broadcast(&g, &SignedChangeRecord::from_bytes(vec![1]))
            .await;

        match result {
            Err(GroupError::PartialDelivery {
                revision,
                attempted,
                delivered,
                failed,
            }) => {
                assert_eq!(revision, 6);
                assert_eq!(attempted, 2);
                assert_eq!(delivered, 1);
                assert_eq!(failed[0].0, Address::from_uuid(other));
            }
            unexpected => panic!("expected PartialDelivery, got {:?}", unexpected),
        }
    }

    #[tokio::test]
    async fn test_broadcast_timeout() {
        let own = Uuid::new_v4();
        let context = loopback(own);
        context.set_send_latency(Duration::from_secs(10));
        let g = group(&[own], &[]);

        let result = ChangeBroadcaster::new(&context, Duration::from_millis(50))
            .broadcast(&g, &SignedChangeRecord::from_bytes(vec![1]))
            .await;
        assert!(matches!(
            result,
            Err(GroupError::PartialDelivery { delivered: 0, .. })
        ));
    }
}
