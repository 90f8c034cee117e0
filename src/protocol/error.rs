//! Wire error envelope
//!
//! Every failed request is answered with `{kind, message, details}`; `kind`
//! is drawn from a closed set so clients can branch on it.

use crate::account::{AccountNotFound, StoreError};
use crate::address::AddressError;
use crate::group::GroupError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ValidationError,
    UnknownOperation,
    UnknownGroup,
    AccountNotFound,
    InvalidKeyMaterial,
    CredentialUnavailable,
    RevisionConflict,
    CommitUnavailable,
    PersistenceError,
    PartialDeliveryFailure,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 10] = [
        ErrorKind::ValidationError,
        ErrorKind::UnknownOperation,
        ErrorKind::UnknownGroup,
        ErrorKind::AccountNotFound,
        ErrorKind::InvalidKeyMaterial,
        ErrorKind::CredentialUnavailable,
        ErrorKind::RevisionConflict,
        ErrorKind::CommitUnavailable,
        ErrorKind::PersistenceError,
        ErrorKind::PartialDeliveryFailure,
    ];

    /// Failures every mutating group operation can produce.
    pub const GROUP_MUTATION: &'static [ErrorKind] = &[
        ErrorKind::ValidationError,
        ErrorKind::AccountNotFound,
        ErrorKind::UnknownGroup,
        ErrorKind::InvalidKeyMaterial,
        ErrorKind::CredentialUnavailable,
        ErrorKind::RevisionConflict,
        ErrorKind::CommitUnavailable,
        ErrorKind::PersistenceError,
        ErrorKind::PartialDeliveryFailure,
    ];

    /// True when the group change is known to have landed at the authority.
    pub fn is_post_commit(self) -> bool {
        matches!(
            self,
            ErrorKind::PersistenceError | ErrorKind::PartialDeliveryFailure
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("{kind}: {message}")]
pub struct ProtocolError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ProtocolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Missing or malformed input field.
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message).with_details(json!({ "field": field }))
    }

    pub fn unknown_operation(name: &str) -> Self {
        Self::new(
            ErrorKind::UnknownOperation,
            format!("unknown operation: {}", name),
        )
        .with_details(json!({ "type": name }))
    }
}

impl From<GroupError> for ProtocolError {
    fn from(e: GroupError) -> Self {
        let message = e.to_string();
        match e {
            GroupError::UnknownGroup(id) => ProtocolError::new(ErrorKind::UnknownGroup, message)
                .with_details(json!({ "group_id": id.to_hex() })),
            GroupError::InvalidKeyMaterial(_) => {
                ProtocolError::new(ErrorKind::InvalidKeyMaterial, message)
            }
            GroupError::CredentialUnavailable(address) => {
                ProtocolError::new(ErrorKind::CredentialUnavailable, message)
                    .with_details(json!({ "address": address }))
            }
            GroupError::InvalidChange(_) => ProtocolError::new(ErrorKind::ValidationError, message),
            GroupError::RevisionConflict { current_revision } => {
                ProtocolError::new(ErrorKind::RevisionConflict, message)
                    .with_details(json!({ "current_revision": current_revision }))
            }
            GroupError::CommitUnavailable(_) => {
                ProtocolError::new(ErrorKind::CommitUnavailable, message)
            }
            GroupError::Persistence { revision, .. } => {
                ProtocolError::new(ErrorKind::PersistenceError, message)
                    .with_details(json!({ "revision": revision }))
            }
            GroupError::PartialDelivery {
                revision,
                attempted,
                delivered,
                failed,
            } => {
                let failed: Vec<Value> = failed
                    .into_iter()
                    .map(|(address, reason)| json!({ "address": address, "reason": reason }))
                    .collect();
                ProtocolError::new(ErrorKind::PartialDeliveryFailure, message).with_details(json!({
                    "revision": revision,
                    "attempted": attempted,
                    "delivered": delivered,
                    "failed": failed,
                }))
            }
        }
    }
}

impl From<AccountNotFound> for ProtocolError {
    fn from(e: AccountNotFound) -> Self {
        let account = e.0.clone();
        ProtocolError::new(ErrorKind::AccountNotFound, e.to_string())
            .with_details(json!({ "account": account }))
    }
}

impl From<StoreError> for ProtocolError {
    fn from(e: StoreError) -> Self {
        ProtocolError::new(ErrorKind::PersistenceError, e.to_string())
    }
}

impl From<AddressError> for ProtocolError {
    fn from(e: AddressError) -> Self {
        ProtocolError::validation("address", e.to_string())
    }
}
