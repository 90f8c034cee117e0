//! Per-group single-writer locks
//!
//! One async mutex per (account, group id). Holding the guard serializes the
//! whole proposal, commit and apply sequence for that group; other groups and
//! other accounts never wait on it. Idle entries are pruned on acquire.

use super::model::GroupId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockKey = (String, GroupId);

#[derive(Default)]
pub struct GroupLocks {
    locks: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

impl GroupLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, account_id: &str, group_id: GroupId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Only the map holds an idle entry's Arc.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                locks
                    .entry((account_id.to_string(), group_id))
                    .or_default(),
            )
        };
        lock.lock_owned().await
    }

    /// Number of entries currently held or awaited.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_group_waits() {
        let locks = Arc::new(GroupLocks::new());
        let id = GroupId::from_bytes([1; 32]);

        let guard = locks.acquire("alice", id).await;
        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("alice", id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_other_group_and_account_do_not_wait() {
        let locks = GroupLocks::new();
        let a = GroupId::from_bytes([1; 32]);
        let b = GroupId::from_bytes([2; 32]);

        let _held = locks.acquire("alice", a).await;
        let other_group = tokio::time::timeout(Duration::from_secs(1), locks.acquire("alice", b)).await;
        let other_account = tokio::time::timeout(Duration::from_secs(1), locks.acquire("bob", a)).await;

        assert!(other_group.is_ok());
        assert!(other_account.is_ok());
    }

    #[tokio::test]
    async fn test_idle_entries_pruned() {
        let locks = GroupLocks::new();
        for i in 0..10u8 {
            let _guard = locks.acquire("alice", GroupId::from_bytes([i; 32])).await;
        }
        let _last = locks.acquire("alice", GroupId::from_bytes([99; 32])).await;
        assert_eq!(locks.len(), 1);
    }
}
