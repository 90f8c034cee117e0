//! Logical addresses for accounts and peers
//!
//! An address names a messaging identity by a stable uuid, a legacy
//! identifier (phone number), or both. Two values are only merged through
//! [`Address::reconcile`]; structural equality never treats a uuid-only and a
//! number-only value as the same identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Address errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Address has neither a uuid nor a number")]
    Empty,

    #[error("Addresses do not refer to the same identity: {0} vs {1}")]
    Mismatch(String, String),
}

/// Canonical logical identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
}

impl Address {
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self {
            uuid: Some(uuid),
            number: None,
        }
    }

    pub fn from_number(number: impl Into<String>) -> Self {
        Self {
            uuid: None,
            number: Some(number.into()),
        }
    }

    /// Build an address from a user-supplied identifier.
    ///
    /// Anything that parses as a uuid becomes a uuid-only address; every
    /// other non-empty string is kept as a legacy identifier.
    pub fn from_identifier(identifier: &str) -> Result<Self, AddressError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(AddressError::Empty);
        }

        match Uuid::parse_str(identifier) {
            Ok(uuid) => Ok(Self::from_uuid(uuid)),
            Err(_) => Ok(Self::from_number(identifier)),
        }
    }

    /// Reject addresses carrying neither part (e.g. `{}` from a client).
    pub fn validate(&self) -> Result<(), AddressError> {
        let has_number = self.number.as_deref().is_some_and(|n| !n.is_empty());
        if self.uuid.is_none() && !has_number {
            return Err(AddressError::Empty);
        }
        Ok(())
    }

    /// True when both values share a uuid or share a number.
    pub fn matches(&self, other: &Address) -> bool {
        let same_uuid = matches!((self.uuid, other.uuid), (Some(a), Some(b)) if a == b);
        let same_number = matches!(
            (self.number.as_deref(), other.number.as_deref()),
            (Some(a), Some(b)) if a == b
        );
        same_uuid || same_number
    }

    /// Merge a partial update into this record.
    ///
    /// Parts present in `update` override; absent parts are kept. The two
    /// values must [`match`](Address::matches) first.
    pub fn reconcile(&self, update: &Address) -> Result<Address, AddressError> {
        if !self.matches(update) {
            return Err(AddressError::Mismatch(self.to_string(), update.to_string()));
        }

        Ok(Address {
            uuid: update.uuid.or(self.uuid),
            number: update.number.clone().or_else(|| self.number.clone()),
        })
    }

    /// The most stable identifier available (uuid first).
    pub fn identifier(&self) -> String {
        match (&self.uuid, &self.number) {
            (Some(uuid), _) => uuid.to_string(),
            (None, Some(number)) => number.clone(),
            (None, None) => String::new(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// Known addresses for one account.
///
/// Partial addresses arriving from clients are resolved against this book so
/// that a number-only reference picks up the uuid learned earlier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBook {
    entries: Vec<Address>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve `partial` against the book, remembering the merged record.
    pub fn resolve(&mut self, partial: &Address) -> Result<Address, AddressError> {
        partial.validate()?;

        match self.entries.iter().position(|known| known.matches(partial)) {
            Some(idx) => {
                let merged = self.entries[idx].reconcile(partial)?;
                self.entries[idx] = merged.clone();
                Ok(merged)
            }
            None => {
                self.entries.push(partial.clone());
                Ok(partial.clone())
            }
        }
    }

    /// Look up without recording anything.
    pub fn lookup(&self, partial: &Address) -> Option<&Address> {
        self.entries.iter().find(|known| known.matches(partial))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const UUID: &str = "a1b2c3d4-5678-90ab-cdef-1234567890ab";

    #[test]
    fn test_from_identifier_uuid() {
        let address = Address::from_identifier(UUID).unwrap();
        assert_eq!(address.uuid, Some(Uuid::parse_str(UUID).unwrap()));
        assert!(address.number.is_none());
    }

    #[test]
    fn test_from_identifier_number() {
        let address = Address::from_identifier("+16137827274").unwrap();
        assert!(address.uuid.is_none());
        assert_eq!(address.number.as_deref(), Some("+16137827274"));
    }

    #[test]
    fn test_from_identifier_empty() {
        assert_eq!(Address::from_identifier("  "), Err(AddressError::Empty));
    }

    #[test]
    fn test_representations_are_distinct_until_reconciled() {
        let by_uuid = Address::from_identifier(UUID).unwrap();
        let by_number = Address::from_identifier("+16137827274").unwrap();

        assert_ne!(by_uuid, by_number);
        assert!(!by_uuid.matches(&by_number));
        assert!(by_uuid.reconcile(&by_number).is_err());
    }

    #[test]
    fn test_reconcile_merges_parts() {
        let full = Address {
            uuid: Some(Uuid::parse_str(UUID).unwrap()),
            number: Some("+16137827274".to_string()),
        };
        let new_number = Address {
            uuid: Some(Uuid::parse_str(UUID).unwrap()),
            number: Some("+447911123456".to_string()),
        };

        let merged = full.reconcile(&new_number).unwrap();
        assert_eq!(merged.number.as_deref(), Some("+447911123456"));
        assert_eq!(merged.uuid, full.uuid);
    }

    #[test]
    fn test_address_book_learns_uuid() {
        let mut book = AddressBook::new();
        book.resolve(&Address::from_number("+16137827274")).unwrap();

        let learned = Address {
            uuid: Some(Uuid::parse_str(UUID).unwrap()),
            number: Some("+16137827274".to_string()),
        };
        book.resolve(&learned).unwrap();

        let resolved = book.resolve(&Address::from_number("+16137827274")).unwrap();
        assert_eq!(resolved, learned);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_address_book_rejects_empty() {
        let mut book = AddressBook::new();
        let empty = Address {
            uuid: None,
            number: None,
        };
        assert_eq!(book.resolve(&empty), Err(AddressError::Empty));
        assert!(book.is_empty());
    }

    #[test]
    fn test_serialization_skips_missing_parts() {
        let address = Address::from_number("+16137827274");
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, r#"{"number":"+16137827274"}"#);
    }

    proptest! {
        #[test]
        fn prop_reconcile_with_self_is_identity(number in "\\+[0-9]{10,15}", bytes in any::<[u8; 16]>()) {
            let address = Address {
                uuid: Some(Uuid::from_bytes(bytes)),
                number: Some(number),
            };
            prop_assert_eq!(address.reconcile(&address).unwrap(), address);
        }

        #[test]
        fn prop_uuid_only_never_equals_number_only(number in "\\+[0-9]{10,15}", bytes in any::<[u8; 16]>()) {
            let by_uuid = Address::from_uuid(Uuid::from_bytes(bytes));
            let by_number = Address::from_number(number);
            prop_assert_ne!(&by_uuid, &by_number);
            prop_assert!(!by_uuid.matches(&by_number));
        }
    }
}
