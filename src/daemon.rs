//! Control daemon
//!
//! Owns the loaded accounts, the group engine and the dispatch table. Each
//! request line runs as its own task, so a slow commit on one group never
//! holds up requests for other groups or accounts. Responses are written in
//! completion order; clients match them to requests by `id`.
//!
//! A task keeps running when its client goes away: a commit that reached the
//! authority still gets applied, persisted and broadcast.

use crate::account::{Account, AccountRegistry};
use crate::group::GroupsManager;
use crate::protocol::{ProtocolError, Registry, Request, Response};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info_span, warn, Instrument};

pub struct Daemon {
    accounts: AccountRegistry,
    groups: GroupsManager,
    registry: Registry,
}

impl Daemon {
    pub fn new(accounts: AccountRegistry, groups: GroupsManager) -> Self {
        Self {
            accounts,
            groups,
            registry: Registry::new(),
        }
    }

    pub fn accounts(&self) -> &AccountRegistry {
        &self.accounts
    }

    pub fn groups(&self) -> &GroupsManager {
        &self.groups
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn account(&self, account_id: &str) -> Result<Arc<Account>, ProtocolError> {
        Ok(self.accounts.get(account_id)?)
    }

    /// Run one parsed request to completion.
    pub async fn handle(&self, request: Request) -> Response {
        let Request {
            id,
            operation,
            fields,
        } = request;

        let span = info_span!("request", op = %operation);
        let result = self
            .registry
            .dispatch(self, &operation, fields)
            .instrument(span)
            .await;

        match result {
            Ok(data) => Response::success(id, operation, data),
            Err(e) => {
                if e.kind.is_post_commit() {
                    warn!(op = %operation, kind = %e.kind, message = %e.message, "change committed with a follow-up failure");
                } else {
                    debug!(op = %operation, kind = %e.kind, message = %e.message, "request failed");
                }
                Response::failure(id, Some(operation), e)
            }
        }
    }

    /// Parse and run one protocol line.
    pub async fn handle_line(&self, line: &str) -> Response {
        match Request::parse(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => Response::failure(None, None, e),
        }
    }

    /// Serve newline-delimited JSON until `reader` reaches end of input and
    /// every in-flight request has been answered.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Response>();

        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(response) = rx.recv().await {
                let mut line = match serde_json::to_string(&response) {
                    Ok(line) => line,
                    Err(e) => {
                        error!(error = %e, "failed to encode response");
                        continue;
                    }
                };
                line.push('\n');
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await?;
            }
            Ok::<_, io::Error>(())
        });

        let mut tasks = JoinSet::new();
        let mut lines = reader.lines();
        let read = loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };
            if line.trim().is_empty() {
                continue;
            }
            let daemon = Arc::clone(&self);
            let tx = tx.clone();
            tasks.spawn(async move {
                let response = daemon.handle_line(&line).await;
                // Writer gone means the client hung up; the work is still done.
                let _ = tx.send(response);
            });
        };

        // Dropping the set would abort commits already sent to the authority.
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "request task failed");
            }
        }
        drop(tx);

        writer_task.await.map_err(io::Error::other)??;
        read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountData, LoopbackAccount, MemoryAccountStore};
    use crate::address::Address;
    use crate::authority::LoopbackAuthority;
    use crate::protocol::ErrorKind;
    use crate::trust::identity_key::DJB_KEY_TYPE;
    use crate::trust::IdentityKey;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, BufReader};
    use uuid::Uuid;

    const ACCOUNT: &str = "+15550001000";

    fn daemon() -> Daemon {
        let address = Address {
            uuid: Some(Uuid::new_v4()),
            number: Some(ACCOUNT.into()),
        };
        let mut key = [3u8; 33];
        key[0] = DJB_KEY_TYPE;
        let key = IdentityKey::from_bytes(&key).unwrap();

        let accounts = AccountRegistry::new();
        accounts.register(Account::new(
            AccountData::new(ACCOUNT, address.clone(), key),
            Arc::new(LoopbackAccount::new(address, key)),
            Arc::new(MemoryAccountStore::new()),
        ));
        let groups = GroupsManager::new(
            Arc::new(LoopbackAuthority::new()),
            Duration::from_secs(5),
            Duration::from_secs(5),
        );
        Daemon::new(accounts, groups)
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let response = daemon()
            .handle_line(r#"{"type":"shred_group","id":3,"account":"+15550001000"}"#)
            .await;
        let error = response.error.unwrap();
        assert_eq!(error.kind, ErrorKind::UnknownOperation);
        assert_eq!(response.id, Some(json!(3)));
    }

    #[tokio::test]
    async fn test_missing_required_field() {
        let response = daemon()
            .handle_line(r#"{"type":"accept_invitation","account":"+15550001000"}"#)
            .await;
        let error = response.error.unwrap();
        assert_eq!(error.kind, ErrorKind::ValidationError);
        assert_eq!(error.details, Some(json!({"field": "group_id"})));
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let response = daemon()
            .handle_line(r#"{"type":"list_groups","account":"+15559999999"}"#)
            .await;
        assert_eq!(response.error.unwrap().kind, ErrorKind::AccountNotFound);
    }

    #[tokio::test]
    async fn test_serve_answers_every_line() {
        let input = concat!(
            r#"{"type":"list_groups","id":1,"account":"+15550001000"}"#,
            "\n\n",
            r#"{"type":"create_group","id":2,"account":"+15550001000","title":"Chess"}"#,
            "\n",
            "garbage\n",
        );
        let (mut client, server) = tokio::io::duplex(64 * 1024);

        Arc::new(daemon())
            .serve(BufReader::new(input.as_bytes()), server)
            .await
            .unwrap();

        let mut output = String::new();
        client.read_to_string(&mut output).await.unwrap();
        let responses: Vec<Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(responses.len(), 3);

        let by_id = |id: i64| {
            responses
                .iter()
                .find(|r| r["id"] == json!(id))
                .cloned()
                .unwrap()
        };
        assert_eq!(by_id(1)["data"]["groups"], json!([]));
        assert_eq!(by_id(2)["data"]["title"], json!("Chess"));
        assert_eq!(by_id(2)["data"]["revision"], json!(0));
        assert!(responses
            .iter()
            .any(|r| r["error"]["kind"] == json!("ValidationError") && r.get("id").is_none()));
    }
}
