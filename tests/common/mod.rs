//! Shared fixture: one daemon, one account, in-process collaborators.

#![allow(dead_code)]

use groupd::account::{Account, AccountData, AccountRegistry, LoopbackAccount, MemoryAccountStore};
use groupd::address::Address;
use groupd::authority::LoopbackAuthority;
use groupd::crypto::{GroupMasterKey, GroupSecretParams};
use groupd::daemon::Daemon;
use groupd::group::{
    DecryptedGroup, DecryptedMember, DecryptedPendingMember, EncryptedGroupState, Group,
    GroupsManager, Role,
};
use groupd::protocol::Response;
use groupd::trust::identity_key::DJB_KEY_TYPE;
use groupd::trust::IdentityKey;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const ACCOUNT: &str = "+12024561414";

pub fn identity_key(fill: u8) -> IdentityKey {
    let mut key = [fill; 33];
    key[0] = DJB_KEY_TYPE;
    IdentityKey::from_bytes(&key).unwrap()
}

pub struct Harness {
    pub daemon: Arc<Daemon>,
    pub authority: LoopbackAuthority,
    pub context: LoopbackAccount,
    pub store: MemoryAccountStore,
    pub account: Arc<Account>,
    pub me: Uuid,
    pub address: Address,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_timeouts(Duration::from_secs(5), Duration::from_secs(5))
    }

    pub fn with_timeouts(commit_timeout: Duration, delivery_timeout: Duration) -> Self {
        let me = Uuid::new_v4();
        let address = Address {
            uuid: Some(me),
            number: Some(ACCOUNT.to_string()),
        };
        let key = identity_key(0x11);

        let authority = LoopbackAuthority::new();
        let context = LoopbackAccount::new(address.clone(), key);
        let store = MemoryAccountStore::new();

        let accounts = AccountRegistry::new();
        let account = accounts.register(Account::new(
            AccountData::new(ACCOUNT, address.clone(), key),
            Arc::new(context.clone()),
            Arc::new(store.clone()),
        ));
        let groups = GroupsManager::new(
            Arc::new(authority.clone()),
            commit_timeout,
            delivery_timeout,
        );

        Self {
            daemon: Arc::new(Daemon::new(accounts, groups)),
            authority,
            context,
            store,
            account,
            me,
            address,
        }
    }

    /// Put a group at `revision` into both the authority and the cache.
    ///
    /// The first of `members` is the administrator; `pending` are invited by it.
    pub async fn seed_group(&self, revision: u32, members: &[Uuid], pending: &[Uuid]) -> Group {
        let admin = members[0];
        let state = DecryptedGroup {
            title: "Book club".to_string(),
            description: String::new(),
            revision,
            disappearing_timer: 0,
            members: members
                .iter()
                .map(|uuid| DecryptedMember {
                    uuid: *uuid,
                    role: if *uuid == admin {
                        Role::Administrator
                    } else {
                        Role::Default
                    },
                    joined_at_revision: 0,
                })
                .collect(),
            pending_members: pending
                .iter()
                .map(|uuid| DecryptedPendingMember {
                    uuid: *uuid,
                    role: Role::Default,
                    added_by: admin,
                })
                .collect(),
        };

        let group = Group::new(GroupMasterKey::generate(), state).unwrap();
        let params = GroupSecretParams::derive_from_master_key(&group.master_key).unwrap();
        self.authority.insert_group(
            group.id,
            EncryptedGroupState::encrypt(&params, &group.state).unwrap(),
        );
        self.account.data().await.upsert_group(group.clone());
        group
    }

    pub async fn cached(&self, group: &Group) -> Option<Group> {
        self.account.data().await.group(&group.id).cloned()
    }

    pub async fn call(&self, request: Value) -> Response {
        self.daemon.handle_line(&request.to_string()).await
    }

    pub async fn update_title(&self, group: &Group, title: &str) -> Response {
        self.call(json!({
            "type": "update_group",
            "account": ACCOUNT,
            "group_id": group.id.to_hex(),
            "title": title,
        }))
        .await
    }
}

pub fn ok(response: &Response) -> &Value {
    match (&response.data, &response.error) {
        (Some(data), None) => data,
        _ => panic!("expected success, got {:?}", response.error),
    }
}
