//! groupd - group management and identity trust daemon
//!
//! Exposes a messaging account's group and trust operations over a typed
//! request/response protocol.
//!
//! Key pieces:
//! - `group`: proposal, commit, apply and broadcast of group changes, one
//!   writer per group at a time
//! - `trust`: safety numbers over identity key history
//! - `protocol`: static operation table, schemas and the error envelope
//! - `daemon`: concurrent request loop over newline-delimited JSON
//!
//! The group authority and the messaging account are reached only through
//! the [`authority::GroupAuthority`] and [`account::AccountContext`] traits.

pub mod account;
pub mod address;
pub mod authority;
pub mod crypto;
pub mod daemon;
pub mod group;
pub mod protocol;
pub mod serialization;
pub mod trust;
