//! Group operation parameters derived from a group master key
//!
//! ## Key Hierarchy
//!
//! ```text
//! GroupMasterKey (32 bytes)
//!         │
//!         ▼
//! HKDF-SHA256(salt="groupd-group-params-v1", master_key)
//!         │
//!         ├─► HKDF expand("group-id")          → public group id
//!         ├─► HKDF expand("uid-encryption")    → AES-256-GCM key for member uids
//!         ├─► HKDF expand("uid-nonce")         → HMAC key for synthetic uid nonces
//!         ├─► HKDF expand("blob-encryption")   → AES-256-GCM key for title/description/timer
//!         └─► HKDF expand("credential-binding")→ HMAC key for credential presentations
//! ```
//!
//! Derivation is deterministic and side-effect free: every member holding the
//! master key derives the same parameters. Member uids are encrypted with a
//! synthetic nonce so equal uids produce equal ciphertexts; the authority
//! relies on that to match pending members without learning who they are.

use crate::group::GroupId;
use hkdf::Hkdf;
use rand::RngCore;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Domain separation salt for parameter derivation (versioned for rotation)
const PARAMS_SALT: &[u8] = b"groupd-group-params-v1";

mod purposes {
    pub const GROUP_ID: &[u8] = b"group-id";
    pub const UID_ENCRYPTION: &[u8] = b"uid-encryption";
    pub const UID_NONCE: &[u8] = b"uid-nonce";
    pub const BLOB_ENCRYPTION: &[u8] = b"blob-encryption";
    pub const CREDENTIAL_BINDING: &[u8] = b"credential-binding";
}

/// AAD labels keep uid and blob ciphertexts from being swapped.
const UID_AAD: &[u8] = b"uid";
const BLOB_AAD: &[u8] = b"blob";

/// Errors from parameter derivation and group-scoped encryption
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupParamsError {
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Encryption failed")]
    Encryption,

    #[error("Decryption failed: {0}")]
    Decryption(String),
}

/// Group-scoped root secret
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct GroupMasterKey([u8; 32]);

impl GroupMasterKey {
    pub const LEN: usize = 32;

    /// Accept exactly 32 bytes of non-degenerate key material.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, GroupParamsError> {
        let key: [u8; 32] = bytes.try_into().map_err(|_| {
            GroupParamsError::InvalidKeyMaterial(format!(
                "master key must be {} bytes, got {}",
                Self::LEN,
                bytes.len()
            ))
        })?;
        let key = Self(key);
        key.validate()?;
        Ok(key)
    }

    pub fn from_hex(s: &str) -> Result<Self, GroupParamsError> {
        let mut bytes = hex::decode(s.trim())
            .map_err(|_| GroupParamsError::InvalidKeyMaterial("master key is not hex".into()))?;
        let key = Self::from_slice(&bytes);
        bytes.zeroize();
        key
    }

    /// Fresh random master key for a new group.
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        loop {
            rand::rngs::OsRng.fill_bytes(&mut key);
            if key != [0u8; 32] {
                return Self(key);
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// An all-zero key is what an uninitialised buffer looks like; never use it.
    pub fn validate(&self) -> Result<(), GroupParamsError> {
        if self.0 == [0u8; 32] {
            return Err(GroupParamsError::InvalidKeyMaterial(
                "master key is all zeros".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for GroupMasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GroupMasterKey(<redacted>)")
    }
}

impl Serialize for GroupMasterKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for GroupMasterKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut s = String::deserialize(deserializer)?;
        let key = GroupMasterKey::from_hex(&s).map_err(de::Error::custom);
        s.zeroize();
        key
    }
}

/// Encrypted member uid (deterministic per group)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UuidCiphertext(pub Vec<u8>);

/// Encrypted group attribute (title, description, timer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobCiphertext(pub Vec<u8>);

/// Per-group operation parameters.
///
/// Key material is zeroized on drop. Construct only through
/// [`GroupSecretParams::derive_from_master_key`].
pub struct GroupSecretParams {
    group_id: GroupId,
    uid_encryption_key: [u8; 32],
    uid_nonce_key: [u8; 32],
    blob_encryption_key: [u8; 32],
    credential_binding_key: [u8; 32],
}

impl Drop for GroupSecretParams {
    fn drop(&mut self) {
        self.uid_encryption_key.zeroize();
        self.uid_nonce_key.zeroize();
        self.blob_encryption_key.zeroize();
        self.credential_binding_key.zeroize();
    }
}

impl GroupSecretParams {
    /// Derive all parameters for the group owning `master_key`.
    ///
    /// The key is validated before any derivation runs.
    pub fn derive_from_master_key(master_key: &GroupMasterKey) -> Result<Self, GroupParamsError> {
        master_key.validate()?;

        let hkdf = Hkdf::<Sha256>::new(Some(PARAMS_SALT), master_key.as_bytes());

        Ok(Self {
            group_id: GroupId::from_bytes(Self::derive_key(&hkdf, purposes::GROUP_ID)?),
            uid_encryption_key: Self::derive_key(&hkdf, purposes::UID_ENCRYPTION)?,
            uid_nonce_key: Self::derive_key(&hkdf, purposes::UID_NONCE)?,
            blob_encryption_key: Self::derive_key(&hkdf, purposes::BLOB_ENCRYPTION)?,
            credential_binding_key: Self::derive_key(&hkdf, purposes::CREDENTIAL_BINDING)?,
        })
    }

    fn derive_key(hkdf: &Hkdf<Sha256>, info: &[u8]) -> Result<[u8; 32], GroupParamsError> {
        let mut key = [0u8; 32];
        hkdf.expand(info, &mut key)
            .map_err(|e| GroupParamsError::InvalidKeyMaterial(format!("{:?}", e)))?;
        Ok(key)
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub(crate) fn credential_binding_key(&self) -> &[u8; 32] {
        &self.credential_binding_key
    }

    pub fn encrypt_uuid(&self, uuid: &Uuid) -> Result<UuidCiphertext, GroupParamsError> {
        let tag = hmac::sign(
            &hmac::Key::new(hmac::HMAC_SHA256, &self.uid_nonce_key),
            uuid.as_bytes(),
        );
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&tag.as_ref()[..NONCE_LEN]);

        seal(&self.uid_encryption_key, nonce, UID_AAD, uuid.as_bytes()).map(UuidCiphertext)
    }

    pub fn decrypt_uuid(&self, ciphertext: &UuidCiphertext) -> Result<Uuid, GroupParamsError> {
        let plaintext = open(&self.uid_encryption_key, UID_AAD, &ciphertext.0)?;
        Uuid::from_slice(&plaintext)
            .map_err(|_| GroupParamsError::Decryption("uid plaintext is not 16 bytes".into()))
    }

    pub fn encrypt_blob(&self, plaintext: &[u8]) -> Result<BlobCiphertext, GroupParamsError> {
        let mut nonce = [0u8; NONCE_LEN];
        SystemRandom::new()
            .fill(&mut nonce)
            .map_err(|_| GroupParamsError::Encryption)?;
        seal(&self.blob_encryption_key, nonce, BLOB_AAD, plaintext).map(BlobCiphertext)
    }

    pub fn decrypt_blob(&self, ciphertext: &BlobCiphertext) -> Result<Vec<u8>, GroupParamsError> {
        open(&self.blob_encryption_key, BLOB_AAD, &ciphertext.0)
    }

    pub fn encrypt_title(&self, title: &str) -> Result<BlobCiphertext, GroupParamsError> {
        self.encrypt_blob(title.as_bytes())
    }

    pub fn decrypt_string(&self, ciphertext: &BlobCiphertext) -> Result<String, GroupParamsError> {
        String::from_utf8(self.decrypt_blob(ciphertext)?)
            .map_err(|_| GroupParamsError::Decryption("blob is not utf-8".into()))
    }

    pub fn encrypt_timer(&self, seconds: u32) -> Result<BlobCiphertext, GroupParamsError> {
        self.encrypt_blob(&seconds.to_be_bytes())
    }

    pub fn decrypt_timer(&self, ciphertext: &BlobCiphertext) -> Result<u32, GroupParamsError> {
        let bytes: [u8; 4] = self
            .decrypt_blob(ciphertext)?
            .try_into()
            .map_err(|_| GroupParamsError::Decryption("timer blob is not 4 bytes".into()))?;
        Ok(u32::from_be_bytes(bytes))
    }
}

/// Output layout: nonce || ciphertext || tag
fn seal(
    key: &[u8; 32],
    nonce: [u8; NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, GroupParamsError> {
    let key = LessSafeKey::new(
        UnboundKey::new(&AES_256_GCM, key).map_err(|_| GroupParamsError::Encryption)?,
    );

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce),
        Aad::from(aad),
        &mut in_out,
    )
    .map_err(|_| GroupParamsError::Encryption)?;

    let mut output = Vec::with_capacity(NONCE_LEN + in_out.len());
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&in_out);
    Ok(output)
}

fn open(key: &[u8; 32], aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>, GroupParamsError> {
    if sealed.len() < NONCE_LEN + AES_256_GCM.tag_len() {
        return Err(GroupParamsError::Decryption("ciphertext too short".into()));
    }

    let key = LessSafeKey::new(
        UnboundKey::new(&AES_256_GCM, key)
            .map_err(|_| GroupParamsError::Decryption("bad key".into()))?,
    );
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce)
        .map_err(|_| GroupParamsError::Decryption("bad nonce".into()))?;

    let mut in_out = ciphertext.to_vec();
    let plaintext = key
        .open_in_place(nonce, Aad::from(aad), &mut in_out)
        .map_err(|_| GroupParamsError::Decryption("authentication failed".into()))?;
    Ok(plaintext.to_vec())
}
