//! Verifier routes: presentation requests and presentation verification.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use credence_credentials::{PresentationRequest, VerificationOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::json_body;
use crate::auth::TenantAccess;
use crate::error::ApiError;
use crate::state::NodeState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePresentationRequest {
    /// Definition id, type or name the presented credential must match.
    #[serde(default)]
    pub definition: Option<String>,
    /// Issuer DID the presented credential must come from.
    #[serde(default)]
    pub trusted_issuer: Option<String>,
    /// Issuer base URL, resolved through discovery metadata to a DID.
    #[serde(default)]
    pub issuer_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub request_id: String,
    pub verifiable_presentation: Value,
}

/// What a wallet sees when it dereferences a request. Omits the owning tenant.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPresentationRequest {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted_issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier_did: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "presentation_request_url")]
    pub request_url: String,
}

impl From<PresentationRequest> for PublicPresentationRequest {
    fn from(request: PresentationRequest) -> Self {
        Self {
            request_id: request.request_id,
            definition: request.definition,
            definition_id: request.definition_id,
            trusted_issuer: request.trusted_issuer,
            verifier_did: request.verifier_did,
            created_at: request.created_at,
            request_url: request.request_url,
        }
    }
}

async fn create_request(
    State(state): State<Arc<NodeState>>,
    TenantAccess(ctx): TenantAccess,
    body: Result<Json<CreatePresentationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PresentationRequest>), ApiError> {
    let req = json_body(body)?;
    let trusted_issuer = match (req.trusted_issuer, req.issuer_url) {
        (Some(_), Some(_)) => {
            return Err(ApiError::bad_request(
                "conflicting_issuer_constraints",
                "give either trustedIssuer or issuerUrl, not both",
            ))
        }
        (Some(did), None) => Some(did),
        (None, Some(url)) => Some(state.metadata.trusted_issuer_did(&url).await?),
        (None, None) => None,
    };

    let _session = state.sessions.acquire(&ctx.tenant_id).await?;
    let request =
        state
            .verification
            .create_request(&ctx, req.definition.as_deref(), trusted_issuer)?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Public: wallets dereference the `request_uri` without credentials.
async fn get_request(
    State(state): State<Arc<NodeState>>,
    Path(request_id): Path<String>,
) -> Result<Json<PublicPresentationRequest>, ApiError> {
    let request = state.verification.get_request(&request_id)?;
    Ok(Json(request.into()))
}

async fn verify_presentation(
    State(state): State<Arc<NodeState>>,
    TenantAccess(ctx): TenantAccess,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerificationOutcome>, ApiError> {
    let req = json_body(body)?;
    let outcome = state
        .verification
        .verify(&ctx, &req.request_id, &req.verifiable_presentation)
        .await?;
    Ok(Json(outcome))
}

pub fn routes() -> Router<Arc<NodeState>> {
    Router::new()
        .route("/verifier/presentation-requests", post(create_request))
        .route("/verifier/presentation-requests/{id}", get(get_request))
        .route("/verifier/verify", post(verify_presentation))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{Method, StatusCode};
    use credence_credentials::issuance::PRE_AUTHORIZED_GRANT;
    use serde_json::{json, Value};

    use super::super::test_support::*;
    use crate::state::NodeState;

    struct Org {
        id: String,
        auth: String,
        issuer_did: String,
    }

    async fn org(state: &Arc<NodeState>) -> Org {
        let (status, body) = call(
            state,
            Method::POST,
            "/tenants",
            Some(API_KEY),
            Some(json!({"label": "Acme", "type": "ORG"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        Org {
            id: body["tenantId"].as_str().unwrap().to_string(),
            auth: bearer(body["token"].as_str().unwrap()),
            issuer_did: body["issuerDid"].as_str().unwrap().to_string(),
        }
    }

    async fn issue_membership(state: &Arc<NodeState>, org: &Org) -> String {
        let (_, created) = call(
            state,
            Method::POST,
            "/issuer/credential-offers",
            Some(&org.auth),
            Some(json!({
                "credentials": [{
                    "credentialDefinitionId": "MembershipCredential",
                    "claimTemplate": {"memberName": "Alice"}
                }]
            })),
        )
        .await;
        let (status, token) = call(
            state,
            Method::POST,
            "/token",
            None,
            Some(json!({
                "grant_type": PRE_AUTHORIZED_GRANT,
                "pre_authorized_code": created["preAuthorizedCode"],
                "subject_did": "did:example:alice",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        token["verifiableCredential"].as_str().unwrap().to_string()
    }

    async fn request(state: &Arc<NodeState>, org: &Org, body: Value) -> (StatusCode, Value) {
        call(
            state,
            Method::POST,
            "/verifier/presentation-requests",
            Some(&org.auth),
            Some(body),
        )
        .await
    }

    async fn verify(state: &Arc<NodeState>, org: &Org, request_id: &str, vp: Value) -> Value {
        let (status, body) = call(
            state,
            Method::POST,
            "/verifier/verify",
            Some(&org.auth),
            Some(json!({"requestId": request_id, "verifiablePresentation": vp})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body
    }

    #[tokio::test]
    async fn test_request_then_verify() {
        let state = test_state();
        let org = org(&state).await;
        let vc = issue_membership(&state, &org).await;

        let (status, created) =
            request(&state, &org, json!({"definition": "MembershipCredential"})).await;
        assert_eq!(status, StatusCode::CREATED);
        let request_id = created["requestId"].as_str().unwrap();
        assert!(created["presentation_request_url"]
            .as_str()
            .unwrap()
            .starts_with("openid4vp://"));

        // Wallets fetch the request without credentials.
        let (status, fetched) = call(
            &state,
            Method::GET,
            &format!("/verifier/presentation-requests/{request_id}"),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["requestId"], request_id);
        assert_eq!(fetched["definition"], "MembershipCredential");
        assert_eq!(
            fetched["presentation_request_url"],
            created["presentation_request_url"]
        );
        assert!(created.get("tenantId").is_some());
        assert!(fetched.get("tenantId").is_none());

        let outcome = verify(
            &state,
            &org,
            request_id,
            json!({"verifiableCredential": [vc]}),
        )
        .await;
        assert_eq!(outcome["verified"], true);
        assert_eq!(outcome["issuer"], org.issuer_did);
        assert_eq!(outcome["schemaValidation"]["valid"], true);
    }

    #[tokio::test]
    async fn test_garbage_presentation_is_unverified() {
        let state = test_state();
        let org = org(&state).await;
        let (_, created) = request(&state, &org, json!({})).await;
        let outcome = verify(
            &state,
            &org,
            created["requestId"].as_str().unwrap(),
            json!("definitely not a presentation"),
        )
        .await;
        assert_eq!(outcome["verified"], false);
        assert_eq!(outcome["reason"], "malformed_presentation");
    }

    #[tokio::test]
    async fn test_issuer_url_pins_trusted_issuer() {
        let state = test_state();
        let issuer_org = org(&state).await;
        let verifier_org = org(&state).await;
        let vc = issue_membership(&state, &issuer_org).await;

        let (_, issuer_record) = call(
            &state,
            Method::GET,
            &format!("/tenants/{}", issuer_org.id),
            Some(API_KEY),
            None,
        )
        .await;
        let base_url = issuer_record["baseUrl"].as_str().unwrap();

        let (status, created) =
            request(&state, &verifier_org, json!({"issuerUrl": base_url})).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["trustedIssuer"], issuer_org.issuer_did);

        let outcome = verify(
            &state,
            &verifier_org,
            created["requestId"].as_str().unwrap(),
            json!(vc),
        )
        .await;
        assert_eq!(outcome["verified"], true);

        // A request pinned to the verifier's own issuer rejects it.
        let (_, pinned) = request(
            &state,
            &verifier_org,
            json!({"trustedIssuer": verifier_org.issuer_did}),
        )
        .await;
        let outcome = verify(
            &state,
            &verifier_org,
            pinned["requestId"].as_str().unwrap(),
            json!(vc),
        )
        .await;
        assert_eq!(outcome["verified"], false);
        assert_eq!(outcome["reason"], "untrusted_issuer");
    }

    #[tokio::test]
    async fn test_conflicting_issuer_constraints() {
        let state = test_state();
        let org = org(&state).await;
        let (status, body) = request(
            &state,
            &org,
            json!({"trustedIssuer": "did:example:a", "issuerUrl": "https://a.example.com"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["reason"], "conflicting_issuer_constraints");
    }

    #[tokio::test]
    async fn test_other_tenants_request_not_found() {
        let state = test_state();
        let a = org(&state).await;
        let b = org(&state).await;
        let (_, created) = request(&state, &a, json!({})).await;

        let (status, body) = call(
            &state,
            Method::POST,
            "/verifier/verify",
            Some(&b.auth),
            Some(json!({
                "requestId": created["requestId"],
                "verifiablePresentation": "x.y.z"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["reason"], "presentation_request_not_found");
    }
}
