//! Request dispatch registry
//!
//! A table of operation name to (schema, handler) built once at startup.
//! Each entry comes from a [`RequestType`] implementation: its input struct
//! is deserialized from the request fields after the schema's required
//! fields have been checked, and its output is serialized back to JSON.

use super::error::{ErrorKind, ProtocolError};
use super::handlers::{
    AcceptInvitationRequest, CreateGroupRequest, GetGroupRequest, GetIdentitiesRequest,
    LeaveGroupRequest, ListGroupsRequest, ResolveAddressRequest, TrustRequest, UpdateGroupRequest,
};
use super::schema::OperationSchema;
use crate::daemon::Daemon;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::error;

/// One operation of the protocol
#[async_trait]
pub trait RequestType: DeserializeOwned + Send + 'static {
    const NAME: &'static str;

    type Output: Serialize + Send;

    fn schema() -> OperationSchema;

    async fn run(self, daemon: &Daemon) -> Result<Self::Output, ProtocolError>;
}

type Handler = for<'a> fn(&'a Daemon, Map<String, Value>) -> BoxFuture<'a, Result<Value, ProtocolError>>;

struct Operation {
    schema: OperationSchema,
    handler: Handler,
}

pub struct Registry {
    operations: BTreeMap<&'static str, Operation>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let mut registry = Self {
            operations: BTreeMap::new(),
        };
        registry.register::<AcceptInvitationRequest>();
        registry.register::<LeaveGroupRequest>();
        registry.register::<UpdateGroupRequest>();
        registry.register::<CreateGroupRequest>();
        registry.register::<GetGroupRequest>();
        registry.register::<ListGroupsRequest>();
        registry.register::<GetIdentitiesRequest>();
        registry.register::<TrustRequest>();
        registry.register::<ResolveAddressRequest>();
        registry
    }

    fn register<T: RequestType>(&mut self) {
        let schema = T::schema();
        debug_assert_eq!(schema.name, T::NAME);
        let previous = self.operations.insert(
            T::NAME,
            Operation {
                schema,
                handler: run_handler::<T>,
            },
        );
        debug_assert!(previous.is_none(), "operation {} registered twice", T::NAME);
    }

    pub fn schema(&self, name: &str) -> Option<&OperationSchema> {
        self.operations.get(name).map(|op| &op.schema)
    }

    /// All schemas, ordered by operation name.
    pub fn schemas(&self) -> impl Iterator<Item = &OperationSchema> {
        self.operations.values().map(|op| &op.schema)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.operations.keys().copied().collect()
    }

    pub async fn dispatch(
        &self,
        daemon: &Daemon,
        name: &str,
        fields: Map<String, Value>,
    ) -> Result<Value, ProtocolError> {
        let operation = self
            .operations
            .get(name)
            .ok_or_else(|| ProtocolError::unknown_operation(name))?;

        validate_required(&operation.schema, &fields)?;

        let result = (operation.handler)(daemon, fields).await;
        if let Err(e) = &result {
            if !operation.schema.declares(e.kind) {
                error!(operation = name, kind = %e.kind, "handler failed with an undeclared error kind");
            }
        }
        result
    }
}

/// Reject requests missing a required field (absent or null).
pub fn validate_required(
    schema: &OperationSchema,
    fields: &Map<String, Value>,
) -> Result<(), ProtocolError> {
    for field in schema.required_fields() {
        if fields.get(field.name).map_or(true, Value::is_null) {
            return Err(ProtocolError::validation(
                field.name,
                format!("missing required field: {}", field.name),
            ));
        }
    }
    Ok(())
}

fn run_handler<T: RequestType>(
    daemon: &Daemon,
    fields: Map<String, Value>,
) -> BoxFuture<'_, Result<Value, ProtocolError>> {
    Box::pin(async move {
        let input: T = serde_json::from_value(Value::Object(fields)).map_err(|e| {
            ProtocolError::new(
                ErrorKind::ValidationError,
                format!("invalid input for {}: {}", T::NAME, e),
            )
        })?;

        let output = input.run(daemon).await?;
        serde_json::to_value(output).map_err(|e| {
            error!(operation = T::NAME, error = %e, "failed to serialize result");
            ProtocolError::new(
                ErrorKind::ValidationError,
                format!("result of {} could not be encoded: {}", T::NAME, e),
            )
        })
    })
}
