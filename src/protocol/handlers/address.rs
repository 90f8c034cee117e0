use crate::address::Address;
use crate::daemon::Daemon;
use crate::protocol::error::{ErrorKind, ProtocolError};
use crate::protocol::registry::RequestType;
use crate::protocol::schema::{FieldKind, FieldSchema, OperationSchema};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ResolveAddressRequest {
    pub account: String,
    pub partial: Address,
}

#[async_trait]
impl RequestType for ResolveAddressRequest {
    const NAME: &'static str = "resolve_address";

    type Output = Address;

    fn schema() -> OperationSchema {
        OperationSchema {
            name: Self::NAME,
            description: "Complete a partial address from what the account knows, remembering the result",
            fields: vec![
                FieldSchema::account(),
                FieldSchema::required("partial", FieldKind::Address, "Address with a uuid, a number or both")
                    .example(r#"{"number":"+13215551234"}"#),
            ],
            result: "Address",
            errors: vec![
                ErrorKind::ValidationError,
                ErrorKind::AccountNotFound,
                ErrorKind::PersistenceError,
            ],
        }
    }

    async fn run(self, daemon: &Daemon) -> Result<Address, ProtocolError> {
        let account = daemon.account(&self.account)?;

        let mut data = account.data().await;
        let resolved = data
            .recipients
            .resolve(&self.partial)
            .map_err(|e| ProtocolError::validation("partial", e.to_string()))?;
        account.persist(&data).await?;
        Ok(resolved)
    }
}
