//! Profile-key credentials and their group-bound presentations
//!
//! A credential is obtained out of band (from the profile service) and is
//! opaque here. Joining a group never sends the credential itself; it sends a
//! presentation bound to the member's uid ciphertext for that one group.

use super::group_params::{GroupParamsError, GroupSecretParams, UuidCiphertext};
use ring::hmac;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Opaque proof of profile-key possession
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ProfileKeyCredential(Vec<u8>);

impl ProfileKeyCredential {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ProfileKeyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProfileKeyCredential({} bytes)", self.0.len())
    }
}

/// Credential presentation scoped to one group and one member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPresentation {
    pub uid: UuidCiphertext,
    pub proof: Vec<u8>,
}

impl CredentialPresentation {
    /// Bind `credential` to `uid` under the group's binding key.
    pub fn present(
        params: &GroupSecretParams,
        credential: &ProfileKeyCredential,
        uid: UuidCiphertext,
    ) -> Result<Self, GroupParamsError> {
        if credential.as_bytes().is_empty() {
            return Err(GroupParamsError::InvalidKeyMaterial(
                "profile key credential is empty".into(),
            ));
        }

        let key = hmac::Key::new(hmac::HMAC_SHA256, params.credential_binding_key());
        let mut ctx = hmac::Context::with_key(&key);
        ctx.update(&uid.0);
        ctx.update(credential.as_bytes());
        let proof = ctx.sign().as_ref().to_vec();

        Ok(Self { uid, proof })
    }

    /// Check the binding; only holders of the master key can do this.
    pub fn verify(&self, params: &GroupSecretParams, credential: &ProfileKeyCredential) -> bool {
        let key = hmac::Key::new(hmac::HMAC_SHA256, params.credential_binding_key());
        let mut message = self.uid.0.clone();
        message.extend_from_slice(credential.as_bytes());
        hmac::verify(&key, &message, &self.proof).is_ok()
    }
}
