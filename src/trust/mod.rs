//! Identity trust
//!
//! Safety-number fingerprints over identity keys, and the per-account key
//! history they are computed from.

pub mod evaluator;
pub mod fingerprint;
pub mod identity_key;

pub use evaluator::{evaluate, find_by_safety_number, IdentityKeyEntry, IdentityKeyList};
pub use fingerprint::{safety_number, Fingerprint, FingerprintVersion};
pub use identity_key::{
    IdentityKey, IdentityKeyError, IdentityKeyRecord, IdentityKeyStore, TrustLevel,
};
