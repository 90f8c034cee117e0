//! Safety numbers
//!
//! Each side's half is an iterated SHA-512 over (version, key, stable
//! identifier), then re-hashed with the key 5200 times. The first 30 bytes
//! become six 5-digit groups.
//!
//! The displayable form sorts the two halves, so both parties see the same
//! 60 digits regardless of who computes it. The scannable form keeps the
//! (local, remote) order and is therefore NOT symmetric under role swap;
//! the peer compares it against its own reversed form when scanning.

use super::identity_key::IdentityKey;
use crate::address::Address;
use serde::Serialize;
use sha2::{Digest, Sha512};

/// Version prefix hashed into every half
const FINGERPRINT_VERSION: u16 = 0;

const ITERATIONS: usize = 5200;

/// Bytes of each half encoded as digits (6 chunks × 5 bytes)
const DISPLAY_BYTES: usize = 30;

/// Bytes of each half carried in the scannable form
const SCANNABLE_BYTES: usize = 32;

/// Which stable identifier the fingerprint was computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FingerprintVersion {
    /// Legacy identifiers (phone numbers)
    V1 = 1,
    /// Stable uuids
    V2 = 2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub version: FingerprintVersion,
    local_digits: String,
    remote_digits: String,
    local_scannable: [u8; SCANNABLE_BYTES],
    remote_scannable: [u8; SCANNABLE_BYTES],
}

impl Fingerprint {
    pub fn compute(
        version: FingerprintVersion,
        local_identifier: &[u8],
        local_key: &IdentityKey,
        remote_identifier: &[u8],
        remote_key: &IdentityKey,
    ) -> Self {
        let local = iterated_hash(local_identifier, local_key);
        let remote = iterated_hash(remote_identifier, remote_key);

        let mut local_scannable = [0u8; SCANNABLE_BYTES];
        local_scannable.copy_from_slice(&local[..SCANNABLE_BYTES]);
        let mut remote_scannable = [0u8; SCANNABLE_BYTES];
        remote_scannable.copy_from_slice(&remote[..SCANNABLE_BYTES]);

        Self {
            version,
            local_digits: encode_digits(&local),
            remote_digits: encode_digits(&remote),
            local_scannable,
            remote_scannable,
        }
    }

    /// 60 digits, smaller half first.
    pub fn display_text(&self) -> String {
        if self.local_digits <= self.remote_digits {
            format!("{}{}", self.local_digits, self.remote_digits)
        } else {
            format!("{}{}", self.remote_digits, self.local_digits)
        }
    }

    /// version (4 bytes, big endian) || local (32) || remote (32)
    pub fn scannable_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + 2 * SCANNABLE_BYTES);
        bytes.extend_from_slice(&(self.version as u32).to_be_bytes());
        bytes.extend_from_slice(&self.local_scannable);
        bytes.extend_from_slice(&self.remote_scannable);
        bytes
    }
}

/// Safety number between our identity and a peer's key.
///
/// Uses uuids when both sides have one, else phone numbers; returns `None`
/// when the two addresses share no identifier kind.
pub fn safety_number(
    own_address: &Address,
    own_key: &IdentityKey,
    peer_address: &Address,
    peer_key: &IdentityKey,
) -> Option<Fingerprint> {
    if let (Some(own), Some(peer)) = (own_address.uuid, peer_address.uuid) {
        return Some(Fingerprint::compute(
            FingerprintVersion::V2,
            own.as_bytes(),
            own_key,
            peer.as_bytes(),
            peer_key,
        ));
    }

    if let (Some(own), Some(peer)) = (&own_address.number, &peer_address.number) {
        return Some(Fingerprint::compute(
            FingerprintVersion::V1,
            own.as_bytes(),
            own_key,
            peer.as_bytes(),
            peer_key,
        ));
    }

    None
}

fn iterated_hash(identifier: &[u8], key: &IdentityKey) -> [u8; 64] {
    let key = key.as_bytes();

    let mut hash = Vec::with_capacity(2 + key.len() + identifier.len());
    hash.extend_from_slice(&FINGERPRINT_VERSION.to_be_bytes());
    hash.extend_from_slice(key);
    hash.extend_from_slice(identifier);

    for _ in 0..ITERATIONS {
        let mut digest = Sha512::new();
        digest.update(&hash);
        digest.update(key);
        hash = digest.finalize().to_vec();
    }

    let mut out = [0u8; 64];
    out.copy_from_slice(&hash);
    out
}

fn encode_digits(hash: &[u8]) -> String {
    hash[..DISPLAY_BYTES]
        .chunks(5)
        .map(|chunk| {
            let value = chunk.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
            format!("{:05}", value % 100_000)
        })
        .collect()
}
