//! Request/response protocol
//!
//! Newline-delimited JSON requests are parsed into a [`Request`], routed by
//! the static [`Registry`] to a typed handler and answered with a
//! [`Response`] carrying either the result or a [`ProtocolError`] envelope.

pub mod docs;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod schema;
pub mod types;

pub use envelope::{Request, Response};
pub use error::{ErrorKind, ProtocolError};
pub use registry::{Registry, RequestType};
pub use schema::{FieldKind, FieldSchema, OperationSchema};
pub use types::{Empty, GroupInfo, GroupList, GroupMemberInfo, PendingMemberInfo};
