//! Local state applier
//!
//! Folds an acknowledged commit into the cached group and writes the
//! account snapshot. The in-memory cache changes first; a failed write
//! leaves the cache authoritative and is reported separately, since the
//! authority already holds the change.

use super::actions::SignedChangeRecord;
use super::coordinator::CommittedChange;
use super::model::Group;
use crate::account::{Account, StoreError};
use tracing::{info, warn};

/// Result of applying one commit
#[derive(Debug)]
pub struct AppliedChange {
    /// The group after the commit (also when it was retired from the cache)
    pub group: Group,
    pub signed_change: SignedChangeRecord,
    /// Outcome of the snapshot write
    pub persisted: Result<(), StoreError>,
}

/// Set the authoritative state and advance the revision by exactly one.
pub fn apply_committed(group: &mut Group, committed: CommittedChange) -> SignedChangeRecord {
    let next = group.revision + 1;
    if committed.state.revision != next {
        warn!(
            group = %group.id,
            expected = next,
            reported = committed.state.revision,
            "authoritative state revision differs from acknowledged revision"
        );
    }

    group.state = committed.state;
    group.state.revision = next;
    group.revision = next;
    committed.signed_change
}

/// Apply `committed` to `group`, store it (or drop it from the cache when
/// `retire` is set) and persist the account snapshot.
///
/// The caller must hold the group's lock so nothing else touched the cached
/// copy since `group` was cloned from it.
pub async fn apply_and_persist(
    account: &Account,
    mut group: Group,
    committed: CommittedChange,
    retire: bool,
) -> AppliedChange {
    let signed_change = apply_committed(&mut group, committed);

    let mut data = account.data().await;
    if retire {
        data.remove_group(&group.id);
    } else {
        data.upsert_group(group.clone());
    }
    let persisted = account.persist(&data).await;
    drop(data);

    match &persisted {
        Ok(()) => info!(
            account = %account.id(),
            group = %group.id,
            revision = group.revision,
            "group change applied"
        ),
        Err(e) => warn!(
            account = %account.id(),
            group = %group.id,
            revision = group.revision,
            error = %e,
            "group change applied but snapshot write failed"
        ),
    }

    AppliedChange {
        group,
        signed_change,
        persisted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::GroupMasterKey;
    use crate::group::model::{DecryptedGroup, DecryptedMember, Role};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn group(revision: u32) -> Group {
        Group::new(
            GroupMasterKey::from_slice(&[6u8; 32]).unwrap(),
            DecryptedGroup {
                title: "Runners".into(),
                revision,
                members: vec![DecryptedMember {
                    uuid: Uuid::new_v4(),
                    role: Role::Administrator,
                    joined_at_revision: 0,
                }],
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn committed(state: DecryptedGroup) -> CommittedChange {
        CommittedChange {
            state,
            signed_change: SignedChangeRecord::from_bytes(vec![0xAA; 16]),
        }
    }

    #[test]
    fn test_apply_takes_authoritative_state() {
        let mut g = group(5);
        let mut authoritative = g.state.clone();
        authoritative.title = "Runners Club".into();
        authoritative.revision = 6;

        let record = apply_committed(&mut g, committed(authoritative));

        assert_eq!(g.revision, 6);
        assert_eq!(g.state.revision, 6);
        assert_eq!(g.state.title, "Runners Club");
        assert_eq!(record.as_bytes(), &[0xAA; 16]);
    }

    #[test]
    fn test_apply_advances_exactly_one_despite_reported_revision() {
        let mut g = group(5);
        let mut authoritative = g.state.clone();
        authoritative.revision = 9;

        apply_committed(&mut g, committed(authoritative));
        assert_eq!(g.revision, 6);
    }

    proptest! {
        #[test]
        fn prop_n_commits_advance_n_revisions(start in 0u32..1000, n in 1usize..20) {
            let mut g = group(start);
            for _ in 0..n {
                let mut next = g.state.clone();
                next.revision = g.revision + 1;
                let before = g.revision;
                apply_committed(&mut g, committed(next));
                prop_assert_eq!(g.revision, before + 1);
            }
            prop_assert_eq!(g.revision, start + n as u32);
        }
    }
}
