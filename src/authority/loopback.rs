//! In-process group authority
//!
//! Holds encrypted group state in memory and applies action sets at the
//! ciphertext level, the same way the remote service does: it never sees a
//! plaintext uid. Sub-actions the source is not allowed to perform are
//! dropped while the rest of the change still lands.
//!
//! Used by `groupd run` and by tests, which can inject conflicts, outages
//! and latency and inspect the call log.

use super::traits::*;
use crate::group::{
    ActionSet, EncryptedGroupState, EncryptedMember, EncryptedPendingMember, GroupAction, GroupId,
    Role, SignedChangeRecord,
};
use crate::crypto::UuidCiphertext;
use crate::serialization::{from_cbor, to_cbor};
use async_trait::async_trait;
use rand::RngCore;
use ring::hmac;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Recorded authority interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityCall {
    Create { group_id: GroupId },
    Fetch { group_id: GroupId },
    SubmitStarted { group_id: GroupId, target_revision: u32 },
    SubmitFinished { group_id: GroupId, target_revision: u32 },
}

/// Failure to inject into the next `submit_change`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Report a conflict at the given revision; nothing is applied.
    Conflict(u32),
    /// Fail before applying anything.
    Unavailable,
    /// Apply the change, then report a failure (lost acknowledgment).
    UnavailableAfterApply,
    /// Acknowledge the revision but skip every sub-action.
    DropActions,
}

#[derive(Default)]
struct LoopbackState {
    groups: HashMap<GroupId, EncryptedGroupState>,
    calls: Vec<AuthorityCall>,
    faults: VecDeque<Fault>,
    latency: Option<Duration>,
}

#[derive(Serialize, Deserialize)]
struct ChangePayload {
    group_id: GroupId,
    revision: u32,
    actions: ActionSet,
}

#[derive(Serialize, Deserialize)]
struct SignedEnvelope {
    payload: Vec<u8>,
    signature: Vec<u8>,
}

#[derive(Clone)]
pub struct LoopbackAuthority {
    state: Arc<Mutex<LoopbackState>>,
    signing_key: Arc<hmac::Key>,
}

impl Default for LoopbackAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackAuthority {
    pub fn new() -> Self {
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self {
            state: Arc::new(Mutex::new(LoopbackState::default())),
            signing_key: Arc::new(hmac::Key::new(hmac::HMAC_SHA256, &key)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a group directly (as if created by another client).
    pub fn insert_group(&self, group_id: GroupId, state: EncryptedGroupState) {
        self.lock().groups.insert(group_id, state);
    }

    pub fn group_state(&self, group_id: &GroupId) -> Option<EncryptedGroupState> {
        self.lock().groups.get(group_id).cloned()
    }

    pub fn inject_fault(&self, fault: Fault) {
        self.lock().faults.push_back(fault);
    }

    /// Delay every submit by `latency` before it is processed.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    pub fn calls(&self) -> Vec<AuthorityCall> {
        self.lock().calls.clone()
    }

    pub fn submit_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, AuthorityCall::SubmitStarted { .. }))
            .count()
    }

    /// Check that `record` was signed by this authority.
    pub fn verify_signed_change(&self, record: &SignedChangeRecord) -> bool {
        from_cbor::<SignedEnvelope>(record.as_bytes())
            .map(|envelope| {
                hmac::verify(&self.signing_key, &envelope.payload, &envelope.signature).is_ok()
            })
            .unwrap_or(false)
    }

    fn sign(&self, payload: &ChangePayload) -> AuthorityResult<SignedChangeRecord> {
        let payload = to_cbor(payload).map_err(|e| AuthorityError::Unavailable(e.to_string()))?;
        let signature = hmac::sign(&self.signing_key, &payload).as_ref().to_vec();
        let envelope = to_cbor(&SignedEnvelope { payload, signature })
            .map_err(|e| AuthorityError::Unavailable(e.to_string()))?;
        Ok(SignedChangeRecord::from_bytes(envelope))
    }
}

/// Apply `actions` to `state`, skipping sub-actions the source may not perform.
fn apply_actions(state: &mut EncryptedGroupState, actions: &ActionSet, new_revision: u32) -> AuthorityResult<()> {
    let source = &actions.source;
    let source_is_member = state.member(source).is_some();
    let source_is_pending = state.pending_members.iter().any(|p| &p.uid == source);

    if !source_is_member && !source_is_pending {
        return Err(AuthorityError::Rejected("source is not in the group".into()));
    }

    for action in &actions.actions {
        let source_is_member = state.member(source).is_some();
        let source_is_admin = state.is_admin(source);

        match action {
            GroupAction::PromotePendingMember { presentation } => {
                let uid = &presentation.uid;
                let pending = state.pending_members.iter().position(|p| &p.uid == uid);
                match pending {
                    Some(idx) if uid == source && !presentation.proof.is_empty() => {
                        let invite = state.pending_members.remove(idx);
                        state.members.push(EncryptedMember {
                            uid: invite.uid,
                            role: invite.role,
                            joined_at_revision: new_revision,
                        });
                    }
                    _ => debug!("dropping promote: not the invited member"),
                }
            }
            GroupAction::AddMember { role, presentation } => {
                let uid = &presentation.uid;
                if source_is_member && state.member(uid).is_none() && !presentation.proof.is_empty() {
                    state.pending_members.retain(|p| &p.uid != uid);
                    state.members.push(EncryptedMember {
                        uid: uid.clone(),
                        role: *role,
                        joined_at_revision: new_revision,
                    });
                } else {
                    debug!("dropping add member");
                }
            }
            GroupAction::AddPendingMember { uid, role } => {
                let known = state.member(uid).is_some()
                    || state.pending_members.iter().any(|p| &p.uid == uid);
                if source_is_member && !known {
                    state.pending_members.push(EncryptedPendingMember {
                        uid: uid.clone(),
                        role: *role,
                        added_by: source.clone(),
                    });
                } else {
                    debug!("dropping add pending member");
                }
            }
            GroupAction::DeleteMember { uid } => {
                if uid == source || source_is_admin {
                    state.members.retain(|m| &m.uid != uid);
                } else {
                    debug!("dropping delete member: source is not an administrator");
                }
            }
            GroupAction::DeletePendingMember { uid } => {
                if uid == source || source_is_member {
                    state.pending_members.retain(|p| &p.uid != uid);
                }
            }
            GroupAction::ModifyMemberRole { uid, role } => {
                if source_is_admin {
                    if let Some(member) = state.members.iter_mut().find(|m| &m.uid == uid) {
                        member.role = *role;
                    }
                }
            }
            GroupAction::ModifyTitle { title } => {
                if source_is_member {
                    state.title = title.clone();
                }
            }
            GroupAction::ModifyDescription { description } => {
                if source_is_member {
                    state.description = Some(description.clone());
                }
            }
            GroupAction::ModifyDisappearingTimer { timer } => {
                if source_is_member {
                    state.disappearing_timer = Some(timer.clone());
                }
            }
        }
    }

    // A group must keep at least one administrator while it has members.
    if !state.members.is_empty() && !state.members.iter().any(|m| m.role == Role::Administrator) {
        state.members[0].role = Role::Administrator;
    }

    state.revision = new_revision;
    Ok(())
}

#[async_trait]
impl GroupAuthority for LoopbackAuthority {
    async fn create_group(
        &self,
        group_id: &GroupId,
        state: &EncryptedGroupState,
    ) -> AuthorityResult<SignedChangeRecord> {
        {
            let mut inner = self.lock();
            inner.calls.push(AuthorityCall::Create {
                group_id: *group_id,
            });
            if inner.groups.contains_key(group_id) {
                return Err(AuthorityError::AlreadyExists);
            }
            inner.groups.insert(*group_id, state.clone());
        }

        self.sign(&ChangePayload {
            group_id: *group_id,
            revision: state.revision,
            actions: ActionSet {
                source: state
                    .members
                    .first()
                    .map(|m| m.uid.clone())
                    .unwrap_or_else(|| UuidCiphertext(Vec::new())),
                actions: Vec::new(),
            },
        })
    }

    async fn fetch_group(&self, group_id: &GroupId) -> AuthorityResult<EncryptedGroupState> {
        let mut inner = self.lock();
        inner.calls.push(AuthorityCall::Fetch {
            group_id: *group_id,
        });
        inner
            .groups
            .get(group_id)
            .cloned()
            .ok_or(AuthorityError::GroupNotFound)
    }

    async fn submit_change(
        &self,
        group_id: &GroupId,
        target_revision: u32,
        actions: &ActionSet,
    ) -> AuthorityResult<CommitResponse> {
        let latency = {
            let mut inner = self.lock();
            inner.calls.push(AuthorityCall::SubmitStarted {
                group_id: *group_id,
                target_revision,
            });
            inner.latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.lock();
        inner.calls.push(AuthorityCall::SubmitFinished {
            group_id: *group_id,
            target_revision,
        });

        let fault = inner.faults.pop_front();
        match fault {
            Some(Fault::Conflict(current_revision)) => {
                return Err(AuthorityError::Conflict { current_revision })
            }
            Some(Fault::Unavailable) => {
                return Err(AuthorityError::Unavailable("injected outage".into()))
            }
            _ => {}
        }

        let current = inner
            .groups
            .get(group_id)
            .ok_or(AuthorityError::GroupNotFound)?;
        if target_revision != current.revision + 1 {
            return Err(AuthorityError::Conflict {
                current_revision: current.revision,
            });
        }

        let mut next = current.clone();
        if fault == Some(Fault::DropActions) {
            next.revision = target_revision;
        } else {
            apply_actions(&mut next, actions, target_revision)?;
        }
        inner.groups.insert(*group_id, next.clone());
        drop(inner);

        if fault == Some(Fault::UnavailableAfterApply) {
            return Err(AuthorityError::Unavailable(
                "acknowledgment lost after apply".into(),
            ));
        }

        let signed_change = self.sign(&ChangePayload {
            group_id: *group_id,
            revision: target_revision,
            actions: actions.clone(),
        })?;

        Ok(CommitResponse {
            state: next,
            signed_change,
        })
    }
}
