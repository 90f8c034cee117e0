//! Account collaborators the group core consumes
//!
//! The messaging network (sessions, ratchets, delivery) lives outside this
//! crate; an [`AccountContext`] is the narrow door to it.

use crate::address::Address;
use crate::crypto::ProfileKeyCredential;
use crate::group::GroupContextEnvelope;
use crate::trust::IdentityKey;
use async_trait::async_trait;

/// Per-recipient outcome of a group message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryResult {
    pub delivered: Vec<Address>,
    pub failed: Vec<(Address, String)>,
}

impl DeliveryResult {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[async_trait]
pub trait AccountContext: Send + Sync {
    fn own_address(&self) -> Address;

    fn own_identity_key(&self) -> IdentityKey;

    /// Fetch the profile-key credential for `address`; `None` when unavailable.
    async fn profile_key_credential(&self, address: &Address) -> Option<ProfileKeyCredential>;

    /// Deliver a group update to each recipient individually.
    async fn send_group_message(
        &self,
        envelope: &GroupContextEnvelope,
        recipients: &[Address],
    ) -> DeliveryResult;
}
