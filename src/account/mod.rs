//! Accounts: snapshot, storage, collaborators and the loaded-account registry

pub mod context;
pub mod data;
pub mod loopback;
pub mod registry;
pub mod store;

pub use context::{AccountContext, DeliveryResult};
pub use data::{AccountData, SCHEMA_VERSION};
pub use loopback::{LoopbackAccount, SentEnvelope};
pub use registry::{Account, AccountNotFound, AccountRegistry};
pub use store::{
    validate_account_id, AccountStore, FileAccountStore, MemoryAccountStore, StoreError,
    StoreResult,
};
