/// Group-scoped cryptography
///
/// - Parameter derivation from a group master key (HKDF-SHA256)
/// - Deterministic uid encryption and randomized blob encryption (AES-256-GCM)
/// - Profile-key credential presentations bound to a group
pub mod credential;
pub mod group_params;

pub use credential::{CredentialPresentation, ProfileKeyCredential};
pub use group_params::{
    BlobCiphertext, GroupMasterKey, GroupParamsError, GroupSecretParams, UuidCiphertext,
};
