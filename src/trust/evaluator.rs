//! Trust view over a peer's identity key history
//!
//! One entry per historical key, in history order. A key that fails to parse
//! is skipped on its own; the remaining keys still get fingerprints.

use super::fingerprint::safety_number;
use super::identity_key::{IdentityKey, IdentityKeyRecord, TrustLevel};
use crate::address::Address;
use serde::Serialize;
use tracing::debug;

/// Fingerprint record for one historical key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityKeyEntry {
    pub trust_level: TrustLevel,
    pub added: u64,
    pub safety_number: String,
    /// Hex of the scannable fingerprint bytes
    pub qr_code_data: String,
}

/// Identity keys associated with one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityKeyList {
    pub address: Address,
    pub identities: Vec<IdentityKeyEntry>,
}

/// Compute fingerprints for every usable key in `history`.
pub fn evaluate(
    own_address: &Address,
    own_key: &IdentityKey,
    peer: &Address,
    history: &[IdentityKeyRecord],
) -> IdentityKeyList {
    let identities = history
        .iter()
        .filter_map(|record| {
            let key = match IdentityKey::from_bytes(&record.key) {
                Ok(key) => key,
                Err(e) => {
                    debug!(peer = %peer, added = record.added, error = %e, "skipping malformed identity key");
                    return None;
                }
            };

            let fingerprint = safety_number(own_address, own_key, peer, &key)?;
            Some(IdentityKeyEntry {
                trust_level: record.trust_level,
                added: record.added,
                safety_number: fingerprint.display_text(),
                qr_code_data: hex::encode(fingerprint.scannable_bytes()),
            })
        })
        .collect();

    IdentityKeyList {
        address: peer.clone(),
        identities,
    }
}

/// Find the key in `history` whose safety number equals `safety_number`.
pub fn find_by_safety_number(
    own_address: &Address,
    own_key: &IdentityKey,
    peer: &Address,
    history: &[IdentityKeyRecord],
    safety_number_text: &str,
) -> Option<IdentityKeyRecord> {
    let wanted: String = safety_number_text
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    history
        .iter()
        .find(|record| {
            IdentityKey::from_bytes(&record.key)
                .ok()
                .and_then(|key| safety_number(own_address, own_key, peer, &key))
                .is_some_and(|fp| fp.display_text() == wanted)
        })
        .cloned()
}
