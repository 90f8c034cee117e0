//! In-process account context
//!
//! Stands in for a connected messaging account: hands out credentials it was
//! given and records every group message in an outbox instead of sending it.

use super::context::*;
use crate::address::Address;
use crate::crypto::ProfileKeyCredential;
use crate::group::GroupContextEnvelope;
use crate::trust::IdentityKey;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use uuid::Uuid;

/// One recorded delivery
#[derive(Debug, Clone)]
pub struct SentEnvelope {
    pub recipient: Address,
    pub envelope: GroupContextEnvelope,
}

#[derive(Default)]
struct LoopbackAccountState {
    credentials: HashMap<Uuid, ProfileKeyCredential>,
    unreachable: HashSet<Address>,
    outbox: Vec<SentEnvelope>,
    credential_lookups: usize,
    send_latency: Option<Duration>,
}

#[derive(Clone)]
pub struct LoopbackAccount {
    address: Address,
    identity_key: IdentityKey,
    state: Arc<Mutex<LoopbackAccountState>>,
}

impl LoopbackAccount {
    pub fn new(address: Address, identity_key: IdentityKey) -> Self {
        Self {
            address,
            identity_key,
            state: Arc::new(Mutex::new(LoopbackAccountState::default())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LoopbackAccountState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_credential(&self, uuid: Uuid, credential: ProfileKeyCredential) {
        self.lock().credentials.insert(uuid, credential);
    }

    /// Deliveries to `address` fail from now on.
    pub fn set_unreachable(&self, address: Address) {
        self.lock().unreachable.insert(address);
    }

    /// Delay each send by `latency` before anything is delivered.
    pub fn set_send_latency(&self, latency: Duration) {
        self.lock().send_latency = Some(latency);
    }

    pub fn outbox(&self) -> Vec<SentEnvelope> {
        self.lock().outbox.clone()
    }

    /// Recipients of every recorded delivery, in send order.
    pub fn outbox_recipients(&self) -> Vec<Address> {
        self.lock()
            .outbox
            .iter()
            .map(|sent| sent.recipient.clone())
            .collect()
    }

    pub fn credential_lookups(&self) -> usize {
        self.lock().credential_lookups
    }
}

#[async_trait]
impl AccountContext for LoopbackAccount {
    fn own_address(&self) -> Address {
        self.address.clone()
    }

    fn own_identity_key(&self) -> IdentityKey {
        self.identity_key
    }

    async fn profile_key_credential(&self, address: &Address) -> Option<ProfileKeyCredential> {
        let mut state = self.lock();
        state.credential_lookups += 1;
        address
            .uuid
            .and_then(|uuid| state.credentials.get(&uuid).cloned())
    }

    async fn send_group_message(
        &self,
        envelope: &GroupContextEnvelope,
        recipients: &[Address],
    ) -> DeliveryResult {
        let latency = self.lock().send_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        let mut result = DeliveryResult::default();
        for recipient in recipients {
            if state.unreachable.contains(recipient) {
                result
                    .failed
                    .push((recipient.clone(), "recipient unreachable".to_string()));
                continue;
            }
            state.outbox.push(SentEnvelope {
                recipient: recipient.clone(),
                envelope: envelope.clone(),
            });
            result.delivered.push(recipient.clone());
        }
        result
    }
}
