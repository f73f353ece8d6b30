//! Integration test: offer, redemption and verification across crates.
//!
//! Exercises the provisioner, issuance engine and verification engine
//! in-process, then the same flow over HTTP against a running node.

use credence_core::TenantType;
use credence_credentials::{NewDefinition, OfferRequest, TemplateRequest};
use credence_integration_tests::*;
use credence_node::provisioner::CreateTenant;
use reqwest::Method;
use serde_json::json;

fn membership_request(member: &str) -> OfferRequest {
    OfferRequest {
        credentials: vec![TemplateRequest {
            credential_definition_id: Some("MembershipCredential".into()),
            claim_template: Some(json!({"memberName": member})),
            ..Default::default()
        }],
        issuer_did: None,
        expires_in: None,
    }
}

// =========================================================================
// In-process
// =========================================================================

#[tokio::test]
async fn test_issue_then_verify_in_process() {
    let state = local_state();
    let org = provision(&state, "Acme", TenantType::Org).await;
    let holder = provision(&state, "Alice", TenantType::User).await;
    let ctx = context(&org);
    let holder_did = holder.holder_did().unwrap().to_string();

    let offer = state
        .issuance
        .create_offer(&ctx, membership_request("Alice"))
        .unwrap();
    assert!(offer
        .credential_offer_url
        .starts_with("openid-credential-offer://"));

    let redemption = state
        .issuance
        .redeem(&offer.pre_authorized_code, &holder_did)
        .await
        .unwrap();
    assert_eq!(redemption.credentials.len(), 1);
    assert_eq!(redemption.credentials[0].subject_id, holder_did);
    assert_eq!(redemption.credentials[0].issuer, org.issuer_did().unwrap());

    let request = state
        .verification
        .create_request(&ctx, Some("MembershipCredential"), None)
        .unwrap();
    let outcome = state
        .verification
        .verify(
            &ctx,
            &request.request_id,
            &json!({"verifiableCredential": [redemption.verifiable_credential]}),
        )
        .await
        .unwrap();
    assert!(outcome.verified, "{:?}", outcome.reason);
    assert_eq!(outcome.subject.as_deref(), Some(holder_did.as_str()));
}

#[tokio::test]
async fn test_payment_receipt_scenario() {
    let state = local_state_with(|c| c.provisioning.seed_default_definitions = false);
    let org = state
        .provisioner
        .create_tenant(CreateTenant {
            label: "Payments Inc".into(),
            tenant_type: TenantType::Org,
            base_url: None,
            issuer_did: Some("did:example:issuer1".into()),
            verifier_did: None,
        })
        .await
        .unwrap();
    let ctx = context(&org);

    let schema = state
        .schemas
        .register(
            &ctx.namespace(),
            "PaymentReceipt",
            "1.0.0",
            json!({
                "type": "object",
                "properties": {
                    "amount": {"type": "number"},
                    "currency": {"type": "string"}
                },
                "required": ["amount", "currency"]
            }),
        )
        .unwrap();
    let definition = state
        .definitions
        .register(
            &org.id,
            NewDefinition {
                name: "PaymentReceiptDef".into(),
                version: "1.0.0".into(),
                schema_id: schema.schema_id.clone(),
                issuer_did: "did:example:issuer1".into(),
                credential_type: vec!["PaymentReceipt".into()],
                claim_template: json!({"currency": "EUR"}),
                wire_format: Default::default(),
            },
        )
        .unwrap();

    let offer = state
        .issuance
        .create_offer(
            &ctx,
            OfferRequest {
                credentials: vec![TemplateRequest {
                    credential_definition_id: Some(definition.definition_id.clone()),
                    claim_template: Some(json!({"amount": 42.5, "currency": "EUR"})),
                    ..Default::default()
                }],
                issuer_did: None,
                expires_in: None,
            },
        )
        .unwrap();
    let redemption = state
        .issuance
        .redeem(&offer.pre_authorized_code, "did:example:holder1")
        .await
        .unwrap();
    let issued = &redemption.credentials[0];
    assert_eq!(issued.issuer, "did:example:issuer1");
    assert_eq!(issued.subject_id, "did:example:holder1");
    assert_eq!(issued.schema_id.as_deref(), Some(schema.schema_id.as_str()));

    let request = state
        .verification
        .create_request(&ctx, Some("PaymentReceiptDef"), None)
        .unwrap();
    let outcome = state
        .verification
        .verify(&ctx, &request.request_id, &json!(redemption.verifiable_credential))
        .await
        .unwrap();
    assert!(outcome.verified, "{:?}", outcome.reason);
    assert!(outcome.schema_validation.unwrap().valid);
}

#[tokio::test]
async fn test_revoked_credential_fails_verification() {
    let state = local_state();
    let org = provision(&state, "Acme", TenantType::Org).await;
    let ctx = context(&org);

    let offer = state
        .issuance
        .create_offer(&ctx, membership_request("Bob"))
        .unwrap();
    let redemption = state
        .issuance
        .redeem(&offer.pre_authorized_code, "did:example:bob")
        .await
        .unwrap();
    state
        .issuance
        .revoke(&org.id, &redemption.credential_id)
        .unwrap();

    let request = state.verification.create_request(&ctx, None, None).unwrap();
    let outcome = state
        .verification
        .verify(&ctx, &request.request_id, &json!(redemption.verifiable_credential))
        .await
        .unwrap();
    assert!(!outcome.verified);
    assert_eq!(outcome.reason.as_deref(), Some("revoked"));
}

#[tokio::test]
async fn test_expired_offer_is_purged() {
    let state = local_state();
    let org = provision(&state, "Acme", TenantType::Org).await;
    let mut request = membership_request("Carol");
    request.expires_in = Some(0);
    let offer = state.issuance.create_offer(&context(&org), request).unwrap();

    assert_eq!(state.issuance.purge_expired().unwrap(), 1);
    let err = state
        .issuance
        .redeem(&offer.pre_authorized_code, "did:example:carol")
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "invalid_or_expired_code");
}

// =========================================================================
// Over HTTP
// =========================================================================

#[tokio::test]
async fn test_issue_then_verify_over_http() {
    let node = TestNode::spawn().await;
    let org = node.create_org("Acme").await;
    let token = org["token"].as_str().unwrap();

    let (status, offer) = node
        .send(
            Method::POST,
            "/issuer/credential-offers",
            Some(token),
            Some(membership_offer("Alice")),
        )
        .await;
    assert_eq!(status, 201, "{offer}");

    // The token endpoint is public.
    let (status, redeemed) = node
        .send(
            Method::POST,
            "/token",
            None,
            Some(json!({
                "grant_type": "urn:ietf:params:oauth:grant-type:pre-authorized_code",
                "pre-authorized_code": offer["preAuthorizedCode"],
                "subject_did": "did:example:alice",
            })),
        )
        .await;
    assert_eq!(status, 200, "{redeemed}");

    let (status, request) = node
        .send(
            Method::POST,
            "/verifier/presentation-requests",
            Some(token),
            Some(json!({"definition": "MembershipCredential"})),
        )
        .await;
    assert_eq!(status, 201);

    let (status, outcome) = node
        .send(
            Method::POST,
            "/verifier/verify",
            Some(token),
            Some(json!({
                "requestId": request["requestId"],
                "verifiablePresentation": redeemed["verifiableCredential"],
            })),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(outcome["verified"], true, "{outcome}");
    assert_eq!(outcome["issuer"], org["issuerDid"]);

    node.shutdown().await;
}

#[tokio::test]
async fn test_missing_credentials_over_http() {
    let node = TestNode::spawn().await;
    let (status, body) = node
        .send(Method::POST, "/issuer/credential-offers", None, Some(json!({})))
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert_eq!(body["error"]["reason"], "missing_credentials");
    node.shutdown().await;
}
