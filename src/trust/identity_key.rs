//! Identity keys and their per-address history
//!
//! Keys are appended the first time they are observed for an address and are
//! never overwritten, so prior keys stay visible next to the current one.

use crate::address::Address;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Type byte prefixed to serialized Curve25519 public keys
pub const DJB_KEY_TYPE: u8 = 0x05;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityKeyError {
    #[error("identity key must be 33 bytes, got {0}")]
    WrongLength(usize),

    #[error("unknown identity key type 0x{0:02x}")]
    UnknownType(u8),

    #[error("identity key is not hex")]
    NotHex,
}

/// Serialized public identity key (type byte + 32-byte point)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityKey([u8; 33]);

impl IdentityKey {
    pub const LEN: usize = 33;

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityKeyError> {
        let key: [u8; 33] = bytes
            .try_into()
            .map_err(|_| IdentityKeyError::WrongLength(bytes.len()))?;
        if key[0] != DJB_KEY_TYPE {
            return Err(IdentityKeyError::UnknownType(key[0]));
        }
        Ok(Self(key))
    }

    pub fn from_hex(s: &str) -> Result<Self, IdentityKeyError> {
        let bytes = hex::decode(s.trim()).map_err(|_| IdentityKeyError::NotHex)?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityKey({})", hex::encode(self.0))
    }
}

impl Serialize for IdentityKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for IdentityKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        IdentityKey::from_hex(&s).map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustLevel {
    #[default]
    TrustedUnverified,
    TrustedVerified,
    Untrusted,
}

/// One observed key for one address.
///
/// `key` holds the bytes exactly as observed; they are parsed only when a
/// fingerprint is computed, so a corrupt entry cannot poison the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityKeyRecord {
    pub address: Address,
    pub key: Vec<u8>,
    pub trust_level: TrustLevel,
    /// Unix millis of first observation
    pub added: u64,
}

/// Append-only identity key history for one account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKeyStore {
    records: Vec<IdentityKeyRecord>,
}

impl IdentityKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key` for `address`; returns false when already known.
    pub fn observe(&mut self, address: &Address, key: &[u8], now_millis: u64) -> bool {
        let known = self
            .records
            .iter()
            .any(|r| r.address.matches(address) && r.key == key);
        if known {
            return false;
        }

        self.records.push(IdentityKeyRecord {
            address: address.clone(),
            key: key.to_vec(),
            trust_level: TrustLevel::TrustedUnverified,
            added: now_millis,
        });
        true
    }

    /// All keys for `address`, oldest first.
    pub fn history(&self, address: &Address) -> Vec<IdentityKeyRecord> {
        self.records
            .iter()
            .filter(|r| r.address.matches(address))
            .cloned()
            .collect()
    }

    /// Change the trust level of one known key; returns false if unknown.
    pub fn set_trust(&mut self, address: &Address, key: &[u8], level: TrustLevel) -> bool {
        match self
            .records
            .iter_mut()
            .find(|r| r.address.matches(address) && r.key == key)
        {
            Some(record) => {
                record.trust_level = level;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
