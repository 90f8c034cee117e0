use crate::address::Address;
use crate::daemon::Daemon;
use crate::protocol::error::{ErrorKind, ProtocolError};
use crate::protocol::registry::RequestType;
use crate::protocol::schema::{examples, FieldKind, FieldSchema, OperationSchema};
use crate::protocol::types::Empty;
use crate::trust::{evaluate, find_by_safety_number, IdentityKeyList, TrustLevel};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

fn address_field() -> FieldSchema {
    FieldSchema::required("address", FieldKind::Address, "The peer whose identity keys to use")
        .example(examples::ADDRESS)
}

#[derive(Debug, Deserialize)]
pub struct GetIdentitiesRequest {
    pub account: String,
    pub address: Address,
}

#[async_trait]
impl RequestType for GetIdentitiesRequest {
    const NAME: &'static str = "get_identities";

    type Output = IdentityKeyList;

    fn schema() -> OperationSchema {
        OperationSchema {
            name: Self::NAME,
            description: "List a peer's identity keys with their safety numbers and trust levels",
            fields: vec![FieldSchema::account(), address_field()],
            result: "IdentityKeyList",
            errors: vec![ErrorKind::ValidationError, ErrorKind::AccountNotFound],
        }
    }

    async fn run(self, daemon: &Daemon) -> Result<IdentityKeyList, ProtocolError> {
        let account = daemon.account(&self.account)?;
        self.address.validate()?;

        let own_address = account.context().own_address();
        let own_key = account.context().own_identity_key();

        let data = account.data().await;
        let peer = data
            .recipients
            .lookup(&self.address)
            .cloned()
            .unwrap_or(self.address);
        let history = data.identity_keys.history(&peer);
        Ok(evaluate(&own_address, &own_key, &peer, &history))
    }
}

#[derive(Debug, Deserialize)]
pub struct TrustRequest {
    pub account: String,
    pub address: Address,
    pub safety_number: String,
    #[serde(default)]
    pub trust_level: Option<TrustLevel>,
}

#[async_trait]
impl RequestType for TrustRequest {
    const NAME: &'static str = "trust";

    type Output = Empty;

    fn schema() -> OperationSchema {
        OperationSchema {
            name: Self::NAME,
            description: "Set the trust level of the peer identity key matching a safety number",
            fields: vec![
                FieldSchema::account(),
                address_field(),
                FieldSchema::required(
                    "safety_number",
                    FieldKind::String,
                    "Safety number as displayed, spaces optional",
                )
                .example(examples::SAFETY_NUMBER),
                FieldSchema::optional(
                    "trust_level",
                    FieldKind::String,
                    "TRUSTED_VERIFIED (default), TRUSTED_UNVERIFIED or UNTRUSTED",
                )
                .example("TRUSTED_VERIFIED"),
            ],
            result: "Empty",
            errors: vec![
                ErrorKind::ValidationError,
                ErrorKind::AccountNotFound,
                ErrorKind::PersistenceError,
            ],
        }
    }

    async fn run(self, daemon: &Daemon) -> Result<Empty, ProtocolError> {
        let account = daemon.account(&self.account)?;
        self.address.validate()?;
        let level = self.trust_level.unwrap_or(TrustLevel::TrustedVerified);

        let own_address = account.context().own_address();
        let own_key = account.context().own_identity_key();

        let mut data = account.data().await;
        let peer = data
            .recipients
            .lookup(&self.address)
            .cloned()
            .unwrap_or(self.address);
        let history = data.identity_keys.history(&peer);
        let record = find_by_safety_number(
            &own_address,
            &own_key,
            &peer,
            &history,
            &self.safety_number,
        )
        .ok_or_else(|| {
            ProtocolError::validation(
                "safety_number",
                format!("no identity key of {} matches the safety number", peer),
            )
        })?;

        data.identity_keys
            .set_trust(&record.address, &record.key, level);
        account.persist(&data).await?;

        info!(account = %account.id(), peer = %peer, ?level, "identity trust updated");
        Ok(Empty {})
    }
}
