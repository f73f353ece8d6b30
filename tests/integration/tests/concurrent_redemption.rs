//! Integration test: a pre-authorized code yields credentials exactly once,
//! however many wallets race to redeem it.

use std::sync::Arc;

use credence_core::TenantType;
use credence_credentials::{OfferRequest, TemplateRequest};
use credence_integration_tests::*;
use serde_json::json;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_redemptions_issue_once() {
    let state = local_state();
    let org = provision(&state, "Acme", TenantType::Org).await;
    let offer = state
        .issuance
        .create_offer(
            &context(&org),
            OfferRequest {
                credentials: vec![TemplateRequest {
                    credential_definition_id: Some("MembershipCredential".into()),
                    claim_template: Some(json!({"memberName": "Alice"})),
                    ..Default::default()
                }],
                issuer_did: None,
                expires_in: None,
            },
        )
        .unwrap();
    let code = Arc::new(offer.pre_authorized_code);

    let mut handles = Vec::new();
    for i in 0..16 {
        let state = state.clone();
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            state
                .issuance
                .redeem(&code, &format!("did:example:wallet-{i}"))
                .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert_eq!(e.reason(), "invalid_or_expired_code"),
        }
    }
    assert_eq!(successes, 1);

    let issued = state
        .issuance
        .list_credentials(&org.id, None, None)
        .unwrap();
    assert_eq!(issued.len(), 1);
}

#[tokio::test]
async fn test_racing_redemptions_over_http() {
    let node = TestNode::spawn().await;
    let org = node.create_org("Acme").await;
    let (_, offer) = node
        .send(
            reqwest::Method::POST,
            "/issuer/credential-offers",
            org["token"].as_str(),
            Some(membership_offer("Alice")),
        )
        .await;
    let body = json!({
        "grant_type": "urn:ietf:params:oauth:grant-type:pre-authorized_code",
        "pre_authorized_code": offer["preAuthorizedCode"],
        "subject_did": "did:example:alice",
    });

    let (a, b) = tokio::join!(
        node.send(reqwest::Method::POST, "/token", None, Some(body.clone())),
        node.send(reqwest::Method::POST, "/token", None, Some(body.clone())),
    );
    let mut statuses = [a.0, b.0];
    statuses.sort();
    assert_eq!(statuses, [200, 400]);

    node.shutdown().await;
}
