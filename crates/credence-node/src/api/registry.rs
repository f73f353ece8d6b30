//! Schema and credential-definition registry routes.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use credence_core::{TenantId, WireFormat};
use credence_credentials::{CredentialDefinition, CredentialError, NewDefinition, SchemaRecord};
use serde::Deserialize;
use serde_json::Value;

use super::json_body;
use crate::auth::{AuthError, Caller, RegistryAccess, Scope, TenantAccess};
use crate::error::ApiError;
use crate::state::NodeState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSchemaRequest {
    pub name: String,
    pub version: String,
    #[serde(alias = "schema")]
    pub json_schema: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDefinitionRequest {
    pub name: String,
    pub version: String,
    pub schema_id: String,
    /// Defaults to the tenant's issuer identity.
    #[serde(default)]
    pub issuer_did: Option<String>,
    #[serde(default)]
    pub credential_type: Vec<String>,
    #[serde(default)]
    pub claim_template: Value,
    #[serde(default)]
    pub wire_format: WireFormat,
}

#[derive(Debug, Deserialize)]
pub struct DefinitionQuery {
    pub tenant: Option<String>,
}

async fn register_schema(
    State(state): State<Arc<NodeState>>,
    RegistryAccess(caller): RegistryAccess,
    body: Result<Json<RegisterSchemaRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SchemaRecord>), ApiError> {
    let req = json_body(body)?;
    let record = state
        .schemas
        .register(&caller.namespace(), &req.name, &req.version, req.json_schema)?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_schemas(
    State(state): State<Arc<NodeState>>,
    RegistryAccess(caller): RegistryAccess,
) -> Result<Json<Vec<SchemaRecord>>, ApiError> {
    Ok(Json(state.schemas.list(&caller.namespace())?))
}

async fn get_schema(
    State(state): State<Arc<NodeState>>,
    RegistryAccess(caller): RegistryAccess,
    Path(schema_id): Path<String>,
) -> Result<Json<SchemaRecord>, ApiError> {
    let record = match caller {
        Caller::Tenant(ctx) => state.schemas.get(&ctx.namespace(), &schema_id)?,
        Caller::Root | Caller::TenantManager => state
            .schemas
            .find(&schema_id)?
            .ok_or(CredentialError::SchemaNotFound(schema_id))?,
    };
    Ok(Json(record))
}

async fn register_definition(
    State(state): State<Arc<NodeState>>,
    TenantAccess(ctx): TenantAccess,
    body: Result<Json<RegisterDefinitionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CredentialDefinition>), ApiError> {
    let req = json_body(body)?;
    let issuer_did = match (req.issuer_did, ctx.issuer_did.as_deref()) {
        (Some(requested), Some(own)) if requested == own => requested,
        (Some(requested), _) => return Err(CredentialError::IssuerNotOwned(requested).into()),
        (None, Some(own)) => own.to_string(),
        (None, None) => {
            return Err(ApiError::bad_request(
                "issuer_required",
                "tenant has no issuer identity",
            ))
        }
    };

    let definition = state.definitions.register(
        &ctx.tenant_id,
        NewDefinition {
            name: req.name,
            version: req.version,
            schema_id: req.schema_id,
            issuer_did,
            credential_type: req.credential_type,
            claim_template: req.claim_template,
            wire_format: req.wire_format,
        },
    )?;

    if let Err(e) = state.provisioner.refresh_metadata(&ctx.tenant_id) {
        tracing::warn!(tenant = %ctx.tenant_id, error = %e, "issuer metadata refresh failed");
    }
    Ok((StatusCode::CREATED, Json(definition)))
}

/// The tenant whose definitions a caller reads. Tenants read their own;
/// root names one with `?tenant=`.
fn definition_scope(
    state: &NodeState,
    caller: Caller,
    query: DefinitionQuery,
) -> Result<TenantId, ApiError> {
    match (caller, query.tenant) {
        (Caller::Tenant(ctx), None) => Ok(ctx.tenant_id),
        (Caller::Tenant(ctx), Some(requested)) if requested == ctx.tenant_id.as_str() => {
            Ok(ctx.tenant_id)
        }
        (Caller::Tenant(_), Some(_)) => Err(AuthError::ScopeDenied {
            role: "TENANT_AGENT",
            scope: Scope::Registry,
        }
        .into()),
        (_, Some(requested)) => Ok(state.tenants.get(&requested)?.id),
        (_, None) => Err(ApiError::bad_request(
            "tenant_required",
            "the tenant query parameter is required for installation callers",
        )),
    }
}

async fn list_definitions(
    State(state): State<Arc<NodeState>>,
    RegistryAccess(caller): RegistryAccess,
    Query(query): Query<DefinitionQuery>,
) -> Result<Json<Vec<CredentialDefinition>>, ApiError> {
    let tenant_id = definition_scope(&state, caller, query)?;
    Ok(Json(state.definitions.list(&tenant_id)?))
}

async fn get_definition(
    State(state): State<Arc<NodeState>>,
    RegistryAccess(caller): RegistryAccess,
    Path(reference): Path<String>,
    Query(query): Query<DefinitionQuery>,
) -> Result<Json<CredentialDefinition>, ApiError> {
    let tenant_id = definition_scope(&state, caller, query)?;
    Ok(Json(state.definitions.resolve(&tenant_id, &reference)?))
}

pub fn routes() -> Router<Arc<NodeState>> {
    Router::new()
        .route("/schemas", post(register_schema).get(list_schemas))
        .route("/schemas/{id}", get(get_schema))
        .route(
            "/credential-definitions",
            post(register_definition).get(list_definitions),
        )
        .route("/credential-definitions/{reference}", get(get_definition))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use super::super::test_support::*;

    async fn org_tenant(state: &std::sync::Arc<crate::state::NodeState>) -> (String, String) {
        let (status, body) = call(
            state,
            Method::POST,
            "/tenants",
            Some(API_KEY),
            Some(json!({"label": "Acme", "type": "ORG"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        (
            body["tenantId"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    fn receipt_schema() -> serde_json::Value {
        json!({
            "name": "Receipt",
            "version": "1.0",
            "jsonSchema": {
                "type": "object",
                "properties": {"amount": {"type": "number"}},
                "required": ["amount"]
            }
        })
    }

    #[tokio::test]
    async fn test_root_registers_global_schema() {
        let state = test_state();
        let (status, body) = call(
            &state,
            Method::POST,
            "/schemas",
            Some(API_KEY),
            Some(receipt_schema()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["tenantId"], "global");
        let id = body["schemaId"].as_str().unwrap().to_string();

        let (status, again) = call(
            &state,
            Method::POST,
            "/schemas",
            Some(API_KEY),
            Some(receipt_schema()),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(again["error"]["reason"], "schema_conflict");

        // Global schemas are visible to tenants.
        let (_, token) = org_tenant(&state).await;
        let (status, fetched) = call(
            &state,
            Method::GET,
            &format!("/schemas/{id}"),
            Some(&bearer(&token)),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["name"], "Receipt");
    }

    #[tokio::test]
    async fn test_tenant_schemas_are_isolated() {
        let state = test_state();
        let (_, token_a) = org_tenant(&state).await;
        let (_, token_b) = org_tenant(&state).await;

        let (status, body) = call(
            &state,
            Method::POST,
            "/schemas",
            Some(&bearer(&token_a)),
            Some(receipt_schema()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["schemaId"].as_str().unwrap();

        // Same name/version in another namespace is fine.
        let (status, _) = call(
            &state,
            Method::POST,
            "/schemas",
            Some(&bearer(&token_b)),
            Some(receipt_schema()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = call(
            &state,
            Method::GET,
            &format!("/schemas/{id}"),
            Some(&bearer(&token_b)),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_registry_requires_credentials() {
        let state = test_state();
        let (status, body) = call(&state, Method::GET, "/schemas", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["reason"], "missing_credentials");
    }

    #[tokio::test]
    async fn test_definition_register_and_resolve() {
        let state = test_state();
        let (tenant_id, token) = org_tenant(&state).await;
        let auth = bearer(&token);

        let (_, schema) = call(
            &state,
            Method::POST,
            "/schemas",
            Some(&auth),
            Some(receipt_schema()),
        )
        .await;
        let (status, def) = call(
            &state,
            Method::POST,
            "/credential-definitions",
            Some(&auth),
            Some(json!({
                "name": "Receipt",
                "version": "1.0",
                "schemaId": schema["schemaId"],
                "credentialType": ["ReceiptCredential"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let def_id = def["definitionId"].as_str().unwrap();

        let (status, by_type) = call(
            &state,
            Method::GET,
            "/credential-definitions/ReceiptCredential_jwt_vc_json",
            Some(&auth),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(by_type["definitionId"], def_id);

        // Root must name the tenant.
        let (status, _) = call(
            &state,
            Method::GET,
            "/credential-definitions",
            Some(API_KEY),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, listed) = call(
            &state,
            Method::GET,
            &format!("/credential-definitions?tenant={tenant_id}"),
            Some(API_KEY),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(listed
            .as_array()
            .unwrap()
            .iter()
            .any(|d| d["definitionId"] == def_id));

        // The new configuration shows up in discovery metadata.
        let (_, metadata) = call(
            &state,
            Method::GET,
            &format!("/tenants/{tenant_id}/metadata/issuer"),
            None,
            None,
        )
        .await;
        assert!(metadata["credential_configurations_supported"]
            .as_array()
            .unwrap()
            .iter()
            .any(|c| c["id"] == "ReceiptCredential_jwt_vc_json"));
    }

    #[tokio::test]
    async fn test_definition_with_foreign_issuer_rejected() {
        let state = test_state();
        let (_, token) = org_tenant(&state).await;
        let auth = bearer(&token);
        let (_, schema) = call(
            &state,
            Method::POST,
            "/schemas",
            Some(&auth),
            Some(receipt_schema()),
        )
        .await;
        let (status, body) = call(
            &state,
            Method::POST,
            "/credential-definitions",
            Some(&auth),
            Some(json!({
                "name": "Receipt",
                "version": "1.0",
                "schemaId": schema["schemaId"],
                "issuerDid": "did:example:someone-else"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["reason"], "issuer_not_owned");
    }

    #[tokio::test]
    async fn test_unknown_definition_is_not_found() {
        let state = test_state();
        let (_, token) = org_tenant(&state).await;
        let (status, body) = call(
            &state,
            Method::GET,
            "/credential-definitions/NoSuchThing",
            Some(&bearer(&token)),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["reason"], "definition_not_found");
    }
}
