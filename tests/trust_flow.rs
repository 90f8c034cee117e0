//! Identity trust and address resolution through the daemon

mod common;

use common::{identity_key, ok, Harness, ACCOUNT};
use groupd::address::Address;
use groupd::protocol::ErrorKind;
use groupd::trust::TrustLevel;
use serde_json::json;
use uuid::Uuid;

const BOB_NUMBER: &str = "+13215551234";

async fn with_bob_keys(h: &Harness) -> Address {
    let bob = Address {
        uuid: Some(Uuid::new_v4()),
        number: Some(BOB_NUMBER.to_string()),
    };
    let mut data = h.account.data().await;
    data.recipients.resolve(&bob).unwrap();
    data.identity_keys
        .observe(&bob, identity_key(0x21).as_bytes(), 1_000);
    data.identity_keys.observe(&bob, &[1, 2, 3], 2_000);
    data.identity_keys
        .observe(&bob, identity_key(0x22).as_bytes(), 3_000);
    bob
}

#[tokio::test]
async fn test_malformed_keys_are_skipped() {
    let h = Harness::new();
    let bob = with_bob_keys(&h).await;

    let response = h
        .call(json!({
            "type": "get_identities",
            "account": ACCOUNT,
            "address": { "number": BOB_NUMBER },
        }))
        .await;
    let data = ok(&response);

    assert_eq!(data["address"]["uuid"], json!(bob.uuid.unwrap()));
    let identities = data["identities"].as_array().unwrap();
    assert_eq!(identities.len(), 2);
    assert_eq!(identities[0]["added"], json!(1_000));
    assert_eq!(identities[1]["added"], json!(3_000));
    assert_ne!(identities[0]["safety_number"], identities[1]["safety_number"]);
    assert_eq!(identities[0]["trust_level"], json!("TRUSTED_UNVERIFIED"));
}

#[tokio::test]
async fn test_trust_by_safety_number() {
    let h = Harness::new();
    let bob = with_bob_keys(&h).await;
    let request = json!({
        "type": "get_identities",
        "account": ACCOUNT,
        "address": { "uuid": bob.uuid.unwrap() },
    });

    let response = h.call(request.clone()).await;
    let safety_number = ok(&response)["identities"][1]["safety_number"]
        .as_str()
        .unwrap()
        .to_string();

    let response = h
        .call(json!({
            "type": "trust",
            "account": ACCOUNT,
            "address": { "uuid": bob.uuid.unwrap() },
            "safety_number": safety_number,
        }))
        .await;
    assert_eq!(ok(&response), &json!({}));
    assert_eq!(h.store.save_count(), 1);

    let history = h.account.data().await.identity_keys.history(&bob);
    assert_eq!(history[0].trust_level, TrustLevel::TrustedUnverified);
    assert_eq!(history[2].trust_level, TrustLevel::TrustedVerified);

    let response = h.call(request).await;
    assert_eq!(
        ok(&response)["identities"][1]["trust_level"],
        json!("TRUSTED_VERIFIED")
    );
}

#[tokio::test]
async fn test_trust_rejects_unknown_safety_number() {
    let h = Harness::new();
    with_bob_keys(&h).await;

    let response = h
        .call(json!({
            "type": "trust",
            "account": ACCOUNT,
            "address": { "number": BOB_NUMBER },
            "safety_number": "0".repeat(60),
            "trust_level": "UNTRUSTED",
        }))
        .await;

    let error = response.error.unwrap();
    assert_eq!(error.kind, ErrorKind::ValidationError);
    assert_eq!(error.details, Some(json!({ "field": "safety_number" })));
    assert_eq!(h.store.save_count(), 0);
}

#[tokio::test]
async fn test_resolve_address_merges_and_remembers() {
    let h = Harness::new();
    let uuid = Uuid::new_v4();

    let response = h
        .call(json!({
            "type": "resolve_address",
            "account": ACCOUNT,
            "partial": { "number": BOB_NUMBER },
        }))
        .await;
    assert_eq!(ok(&response), &json!({ "number": BOB_NUMBER }));

    let response = h
        .call(json!({
            "type": "resolve_address",
            "account": ACCOUNT,
            "partial": { "uuid": uuid, "number": BOB_NUMBER },
        }))
        .await;
    assert_eq!(ok(&response), &json!({ "uuid": uuid, "number": BOB_NUMBER }));

    let response = h
        .call(json!({
            "type": "resolve_address",
            "account": ACCOUNT,
            "partial": { "number": BOB_NUMBER },
        }))
        .await;
    assert_eq!(ok(&response)["uuid"], json!(uuid));
    assert_eq!(h.store.save_count(), 3);
}

#[tokio::test]
async fn test_resolve_address_rejects_empty() {
    let h = Harness::new();
    let response = h
        .call(json!({
            "type": "resolve_address",
            "account": ACCOUNT,
            "partial": {},
        }))
        .await;
    let error = response.error.unwrap();
    assert_eq!(error.kind, ErrorKind::ValidationError);
    assert_eq!(error.details, Some(json!({ "field": "partial" })));
}

#[tokio::test]
async fn test_members_by_number_need_a_known_uuid() {
    let h = Harness::new();

    let response = h
        .call(json!({
            "type": "create_group",
            "account": ACCOUNT,
            "title": "Hikers",
            "members": [BOB_NUMBER],
        }))
        .await;
    let error = response.error.unwrap();
    assert_eq!(error.kind, ErrorKind::ValidationError);
    assert_eq!(error.details, Some(json!({ "field": "members" })));

    let bob = Uuid::new_v4();
    h.call(json!({
        "type": "resolve_address",
        "account": ACCOUNT,
        "partial": { "uuid": bob, "number": BOB_NUMBER },
    }))
    .await;

    let response = h
        .call(json!({
            "type": "create_group",
            "account": ACCOUNT,
            "title": "Hikers",
            "members": [BOB_NUMBER],
        }))
        .await;
    let data = ok(&response);
    // No credential for Bob, so he is invited.
    assert_eq!(data["pending_members"][0]["address"]["uuid"], json!(bob));
    assert_eq!(
        data["pending_members"][0]["address"]["number"],
        json!(BOB_NUMBER)
    );
}

#[tokio::test]
async fn test_rejected_members_leave_address_book_untouched() {
    let h = Harness::new();
    let carol = Uuid::new_v4();

    let response = h
        .call(json!({
            "type": "create_group",
            "account": ACCOUNT,
            "title": "Hikers",
            "members": [carol.to_string(), BOB_NUMBER],
        }))
        .await;
    assert_eq!(response.error.unwrap().kind, ErrorKind::ValidationError);
    assert!(h.account.data().await.recipients.is_empty());
    assert_eq!(h.store.save_count(), 0);

    let response = h
        .call(json!({
            "type": "create_group",
            "account": ACCOUNT,
            "title": "Hikers",
            "members": [carol.to_string()],
        }))
        .await;
    ok(&response);
    let data = h.account.data().await;
    assert_eq!(
        data.recipients.lookup(&Address::from_uuid(carol)),
        Some(&Address::from_uuid(carol))
    );
    drop(data);
    // Address book write, then the group snapshot.
    assert_eq!(h.store.save_count(), 2);
}
