//! Issuer routes: offer creation, pre-authorized code redemption and the
//! issued-credential ledger.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use credence_credentials::issuance::PRE_AUTHORIZED_GRANT;
use credence_credentials::{IssuedCredential, OfferCreated, OfferRequest, Redemption};
use serde::Deserialize;

use super::json_body;
use crate::auth::TenantAccess;
use crate::error::ApiError;
use crate::state::NodeState;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    #[serde(alias = "pre-authorized_code")]
    pub pre_authorized_code: String,
    pub subject_did: String,
}

#[derive(Debug, Deserialize)]
pub struct CredentialQuery {
    pub subject: Option<String>,
    pub issuer: Option<String>,
}

async fn create_offer(
    State(state): State<Arc<NodeState>>,
    TenantAccess(ctx): TenantAccess,
    body: Result<Json<OfferRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OfferCreated>), ApiError> {
    let req = json_body(body)?;
    let _session = state.sessions.acquire(&ctx.tenant_id).await?;
    let created = state.issuance.create_offer(&ctx, req)?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Public: the pre-authorized code is the credential.
async fn redeem_token(
    State(state): State<Arc<NodeState>>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<Redemption>, ApiError> {
    let req = json_body(body)?;
    if req.grant_type != PRE_AUTHORIZED_GRANT {
        return Err(ApiError::bad_request(
            "unsupported_grant_type",
            format!("unsupported grant_type {}", req.grant_type),
        ));
    }
    let redemption = state
        .issuance
        .redeem(&req.pre_authorized_code, &req.subject_did)
        .await?;
    Ok(Json(redemption))
}

async fn list_credentials(
    State(state): State<Arc<NodeState>>,
    TenantAccess(ctx): TenantAccess,
    Query(query): Query<CredentialQuery>,
) -> Result<Json<Vec<IssuedCredential>>, ApiError> {
    let credentials = state.issuance.list_credentials(
        &ctx.tenant_id,
        query.subject.as_deref(),
        query.issuer.as_deref(),
    )?;
    Ok(Json(credentials))
}

async fn get_credential(
    State(state): State<Arc<NodeState>>,
    TenantAccess(ctx): TenantAccess,
    Path(credential_id): Path<String>,
) -> Result<Json<IssuedCredential>, ApiError> {
    Ok(Json(
        state.issuance.get_credential(&ctx.tenant_id, &credential_id)?,
    ))
}

async fn revoke_credential(
    State(state): State<Arc<NodeState>>,
    TenantAccess(ctx): TenantAccess,
    Path(credential_id): Path<String>,
) -> Result<Json<IssuedCredential>, ApiError> {
    Ok(Json(state.issuance.revoke(&ctx.tenant_id, &credential_id)?))
}

pub fn routes() -> Router<Arc<NodeState>> {
    Router::new()
        .route("/issuer/credential-offers", post(create_offer))
        .route("/token", post(redeem_token))
        .route("/issuer/credentials", get(list_credentials))
        .route("/issuer/credentials/{id}", get(get_credential))
        .route("/issuer/credentials/{id}/revoke", post(revoke_credential))
}
