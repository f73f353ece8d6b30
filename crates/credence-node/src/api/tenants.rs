//! Tenant management, token minting and public discovery metadata routes.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use credence_core::TenantId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::json_body;
use crate::auth::{IssuedToken, ManagementAccess, Role, RootAccess};
use crate::error::ApiError;
use crate::provisioner::CreateTenant;
use crate::state::NodeState;
use crate::tenants::{ProvisioningStatus, TenantRecord};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantCreated {
    pub tenant_id: TenantId,
    pub token: String,
    pub token_expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_did: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier_did: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder_did: Option<String>,
    pub provisioning: ProvisioningStatus,
    pub tenant: TenantRecord,
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub token: String,
}

async fn create_tenant(
    State(state): State<Arc<NodeState>>,
    _access: ManagementAccess,
    body: Result<Json<CreateTenant>, JsonRejection>,
) -> Result<(StatusCode, Json<TenantCreated>), ApiError> {
    let req = json_body(body)?;
    let record = state.provisioner.create_tenant(req).await?;
    let issued = state.gateway.mint(&Role::TenantAgent(record.id.clone()))?;

    Ok((
        StatusCode::CREATED,
        Json(TenantCreated {
            tenant_id: record.id.clone(),
            token: issued.token,
            token_expires_at: issued.expires_at,
            issuer_did: record.issuer_did().map(str::to_string),
            verifier_did: record.verifier_did().map(str::to_string),
            holder_did: record.holder_did().map(str::to_string),
            provisioning: record.provisioning.clone(),
            tenant: record,
        }),
    ))
}

async fn list_tenants(
    State(state): State<Arc<NodeState>>,
    _access: ManagementAccess,
) -> Result<Json<Vec<TenantRecord>>, ApiError> {
    Ok(Json(state.tenants.list()?))
}

async fn get_tenant(
    State(state): State<Arc<NodeState>>,
    _access: ManagementAccess,
    Path(tenant_id): Path<String>,
) -> Result<Json<TenantRecord>, ApiError> {
    Ok(Json(state.tenants.get(&tenant_id)?))
}

async fn delete_tenant(
    State(state): State<Arc<NodeState>>,
    _access: ManagementAccess,
    Path(tenant_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.tenants.delete(&tenant_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mint_tenant_token(
    State(state): State<Arc<NodeState>>,
    _access: ManagementAccess,
    Path(tenant_id): Path<String>,
) -> Result<Json<IssuedToken>, ApiError> {
    let record = state.tenants.get(&tenant_id)?;
    Ok(Json(state.gateway.mint(&Role::TenantAgent(record.id))?))
}

async fn mint_management_token(
    State(state): State<Arc<NodeState>>,
    _access: RootAccess,
) -> Result<Json<IssuedToken>, ApiError> {
    Ok(Json(state.gateway.mint(&Role::RootWithTenants)?))
}

/// Exchange a bearer token for the browser session cookie.
async fn open_session(
    State(state): State<Arc<NodeState>>,
    jar: CookieJar,
    body: Result<Json<SessionRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<Value>), ApiError> {
    let req = json_body(body)?;
    let role = state.gateway.decode(&req.token)?;
    let cookie = Cookie::build((state.gateway.cookie_name().to_string(), req.token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict);
    Ok((jar.add(cookie), Json(json!({"role": role.name()}))))
}

async fn tenant_metadata(
    State(state): State<Arc<NodeState>>,
    Path(tenant_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = state.tenants.get(&tenant_id)?;
    Ok(Json(json!({
        "issuer": record.discovery_metadata.issuer,
        "verifier": record.discovery_metadata.verifier,
    })))
}

async fn issuer_metadata(
    State(state): State<Arc<NodeState>>,
    Path(tenant_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.tenants.get(&tenant_id)?.discovery_metadata.issuer))
}

async fn verifier_metadata(
    State(state): State<Arc<NodeState>>,
    Path(tenant_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.tenants.get(&tenant_id)?.discovery_metadata.verifier))
}

pub fn routes() -> Router<Arc<NodeState>> {
    Router::new()
        .route("/tenants", post(create_tenant).get(list_tenants))
        .route("/tenants/{id}", get(get_tenant).delete(delete_tenant))
        .route("/tenants/{id}/token", post(mint_tenant_token))
        .route("/tenants/{id}/metadata", get(tenant_metadata))
        .route("/tenants/{id}/metadata/issuer", get(issuer_metadata))
        .route("/tenants/{id}/metadata/verifier", get(verifier_metadata))
        .route(
            "/tenants/{id}/.well-known/openid-credential-issuer",
            get(issuer_metadata),
        )
        .route("/auth/management-token", post(mint_management_token))
        .route("/auth/session", post(open_session))
}
