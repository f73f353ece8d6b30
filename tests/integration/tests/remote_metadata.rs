//! Integration test: a verifier pins a trusted issuer by base URL, and the
//! issuer's DID is resolved from discovery metadata on another node.

use credence_integration_tests::*;
use reqwest::Method;
use serde_json::json;

const GRANT: &str = "urn:ietf:params:oauth:grant-type:pre-authorized_code";

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cross_node_issuer_url_resolution() {
    let issuer_node = TestNode::spawn().await;
    let verifier_node = TestNode::spawn().await;

    let issuer = issuer_node.create_org("Issuer Co").await;
    let verifier = verifier_node.create_org("Verifier Co").await;
    let base_url = issuer["tenant"]["baseUrl"].as_str().unwrap().to_string();
    assert!(base_url.starts_with(&issuer_node.base));

    let (status, discovered) = issuer_node
        .send(
            Method::GET,
            &format!(
                "/tenants/{}/.well-known/openid-credential-issuer",
                issuer["tenantId"].as_str().unwrap()
            ),
            None,
            None,
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(discovered["issuer_did"], issuer["issuerDid"]);

    let (_, offer) = issuer_node
        .send(
            Method::POST,
            "/issuer/credential-offers",
            issuer["token"].as_str(),
            Some(membership_offer("Alice")),
        )
        .await;
    let (_, redeemed) = issuer_node
        .send(
            Method::POST,
            "/token",
            None,
            Some(json!({
                "grant_type": GRANT,
                "pre_authorized_code": offer["preAuthorizedCode"],
                "subject_did": "did:example:alice",
            })),
        )
        .await;

    let (status, request) = verifier_node
        .send(
            Method::POST,
            "/verifier/presentation-requests",
            verifier["token"].as_str(),
            Some(json!({"issuerUrl": format!("{base_url}/")})),
        )
        .await;
    assert_eq!(status, 201, "{request}");
    assert_eq!(request["trustedIssuer"], issuer["issuerDid"]);

    let (status, outcome) = verifier_node
        .send(
            Method::POST,
            "/verifier/verify",
            verifier["token"].as_str(),
            Some(json!({
                "requestId": request["requestId"],
                "verifiablePresentation": redeemed["verifiableCredential"],
            })),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(outcome["verified"], true, "{outcome}");

    issuer_node.shutdown().await;
    verifier_node.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_issuer_url() {
    let node = TestNode::spawn().await;
    let org = node.create_org("Verifier Co").await;
    let (status, body) = node
        .send(
            Method::POST,
            "/verifier/presentation-requests",
            org["token"].as_str(),
            Some(json!({"issuerUrl": "http://127.0.0.1:1/tenants/nobody"})),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["reason"], "metadata_unavailable");
    node.shutdown().await;
}
