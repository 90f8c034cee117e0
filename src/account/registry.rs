//! Loaded accounts
//!
//! Handlers receive an explicit `Arc<Account>` from the registry; there is
//! no global account lookup. Each account's snapshot sits behind its own
//! async mutex. That mutex covers in-memory edits and the local snapshot
//! write, and is never held across a call to the authority or the network.

use super::context::AccountContext;
use super::data::AccountData;
use super::store::{AccountStore, StoreResult};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Account not found: {0}")]
pub struct AccountNotFound(pub String);

pub struct Account {
    id: String,
    data: Mutex<AccountData>,
    context: Arc<dyn AccountContext>,
    store: Arc<dyn AccountStore>,
}

impl Account {
    pub fn new(
        data: AccountData,
        context: Arc<dyn AccountContext>,
        store: Arc<dyn AccountStore>,
    ) -> Self {
        Self {
            id: data.account_id.clone(),
            data: Mutex::new(data),
            context,
            store,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn context(&self) -> &dyn AccountContext {
        self.context.as_ref()
    }

    /// Exclusive access to the account snapshot.
    pub async fn data(&self) -> MutexGuard<'_, AccountData> {
        self.data.lock().await
    }

    /// Write `data` as the account's full snapshot. Call with the data guard held.
    pub async fn persist(&self, data: &AccountData) -> StoreResult<()> {
        self.store.save(data).await
    }
}

#[derive(Default)]
pub struct AccountRegistry {
    accounts: RwLock<BTreeMap<String, Arc<Account>>>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an account and return its handle.
    pub fn register(&self, account: Account) -> Arc<Account> {
        let account = Arc::new(account);
        self.accounts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(account.id.clone(), Arc::clone(&account));
        account
    }

    pub fn get(&self, account_id: &str) -> Result<Arc<Account>, AccountNotFound> {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(account_id)
            .cloned()
            .ok_or_else(|| AccountNotFound(account_id.to_string()))
    }

    pub fn ids(&self) -> Vec<String> {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
