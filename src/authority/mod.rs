//! Remote group authority
//!
//! `traits` defines the transport the core consumes; `loopback` is an
//! in-process implementation for local runs and tests.

pub mod loopback;
pub mod traits;

pub use loopback::{AuthorityCall, Fault, LoopbackAuthority};
pub use traits::{AuthorityError, AuthorityResult, CommitResponse, GroupAuthority};
