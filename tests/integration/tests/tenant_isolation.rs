//! Integration test: one tenant's records are invisible to another.

use credence_core::TenantType;
use credence_integration_tests::*;
use reqwest::Method;
use serde_json::json;

#[tokio::test]
async fn test_schemas_and_credentials_stay_in_their_tenant() {
    let node = TestNode::spawn().await;
    let a = node.create_org("Acme").await;
    let b = node.create_org("Globex").await;
    let token_a = a["token"].as_str();
    let token_b = b["token"].as_str();

    let (status, schema) = node
        .send(
            Method::POST,
            "/schemas",
            token_a,
            Some(json!({
                "name": "Badge",
                "version": "1.0.0",
                "jsonSchema": {"type": "object", "properties": {"level": {"type": "integer"}}}
            })),
        )
        .await;
    assert_eq!(status, 201, "{schema}");
    let schema_path = format!("/schemas/{}", schema["schemaId"].as_str().unwrap());

    let (status, _) = node.send(Method::GET, &schema_path, token_a, None).await;
    assert_eq!(status, 200);
    let (status, _) = node.send(Method::GET, &schema_path, token_b, None).await;
    assert_eq!(status, 404);

    // The same name and version is free in another namespace.
    let (status, _) = node
        .send(
            Method::POST,
            "/schemas",
            token_b,
            Some(json!({"name": "Badge", "version": "1.0.0", "jsonSchema": {"type": "object"}})),
        )
        .await;
    assert_eq!(status, 201);

    let (_, offer) = node
        .send(
            Method::POST,
            "/issuer/credential-offers",
            token_a,
            Some(membership_offer("Alice")),
        )
        .await;
    let (_, redeemed) = node
        .send(
            Method::POST,
            "/token",
            None,
            Some(json!({
                "grant_type": "urn:ietf:params:oauth:grant-type:pre-authorized_code",
                "pre_authorized_code": offer["preAuthorizedCode"],
                "subject_did": "did:example:alice",
            })),
        )
        .await;
    let credential_path = format!(
        "/issuer/credentials/{}",
        redeemed["credentialId"].as_str().unwrap()
    );
    let (status, _) = node.send(Method::GET, &credential_path, token_b, None).await;
    assert_eq!(status, 404);
    let (status, listed) = node
        .send(Method::GET, "/issuer/credentials", token_b, None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(listed, json!([]));

    let (status, _) = node
        .send(Method::POST, &format!("{credential_path}/revoke"), token_b, None)
        .await;
    assert_eq!(status, 404);

    node.shutdown().await;
}

#[tokio::test]
async fn test_definitions_listing_is_scoped() {
    let node = TestNode::spawn().await;
    let a = node.create_org("Acme").await;
    let b = node.create_org("Globex").await;
    let a_id = a["tenantId"].as_str().unwrap();

    let (status, own) = node
        .send(Method::GET, "/credential-definitions", a["token"].as_str(), None)
        .await;
    assert_eq!(status, 200);
    assert!(!own.as_array().unwrap().is_empty());
    assert!(own
        .as_array()
        .unwrap()
        .iter()
        .all(|d| d["tenantId"] == a["tenantId"]));

    let (status, body) = node
        .send(
            Method::GET,
            &format!("/credential-definitions?tenant={a_id}"),
            b["token"].as_str(),
            None,
        )
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["reason"], "insufficient_scope");

    let (status, via_root) = node
        .send(
            Method::GET,
            &format!("/credential-definitions?tenant={a_id}"),
            Some(API_KEY),
            None,
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(via_root, own);

    node.shutdown().await;
}

#[tokio::test]
async fn test_user_tenant_cannot_issue() {
    let state = local_state();
    let user = provision(&state, "Alice", TenantType::User).await;
    assert!(user.issuer_did().is_none());
    assert!(user.holder_did().is_some());
    assert_eq!(user.discovery_metadata.issuer, json!({}));

    let offer = state.issuance.create_offer(
        &context(&user),
        credence_credentials::OfferRequest {
            credentials: vec![credence_credentials::TemplateRequest {
                types: vec!["Badge".into()],
                ..Default::default()
            }],
            issuer_did: None,
            expires_in: None,
        },
    );
    assert!(offer.is_err());
}
