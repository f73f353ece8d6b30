//! OIDC discovery documents: building them for local tenants and resolving
//! them for arbitrary issuer URLs.

use std::sync::Arc;
use std::time::Duration;

use credence_credentials::CredentialDefinition;
use serde_json::{json, Value};

use crate::tenants::{normalize_base_url, TenantError, TenantRegistry};

pub const WELL_KNOWN_ISSUER: &str = "/.well-known/openid-credential-issuer";

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// OIDC4VCI configuration id of a definition, e.g. `PaymentReceipt_jwt_vc_json`.
pub fn configuration_id(definition: &CredentialDefinition) -> String {
    let primary = definition
        .credential_type
        .iter()
        .rev()
        .find(|t| t.as_str() != "VerifiableCredential")
        .map(String::as_str)
        .unwrap_or(definition.name.as_str());
    format!("{primary}_{}", definition.wire_format.tag())
}

/// Issuer discovery document for a tenant.
pub fn issuer_metadata(
    base_url: &str,
    public_url: &str,
    issuer_did: &str,
    definitions: &[CredentialDefinition],
) -> Value {
    let configurations: Vec<Value> = definitions
        .iter()
        .map(|d| {
            json!({
                "id": configuration_id(d),
                "format": d.wire_format.tag(),
                "types": d.credential_type,
                "definition_id": d.definition_id,
                "schema_id": d.schema_id,
            })
        })
        .collect();
    json!({
        "credential_issuer": base_url,
        "issuer_did": issuer_did,
        "token_endpoint": format!("{public_url}/token"),
        "credential_endpoint": format!("{public_url}/token"),
        "credential_configurations_supported": configurations,
    })
}

/// Verifier discovery document for a tenant.
pub fn verifier_metadata(base_url: &str, public_url: &str, verifier_did: &str) -> Value {
    json!({
        "verifier": base_url,
        "verifier_did": verifier_did,
        "presentation_endpoint": format!("{public_url}/verifier/presentation-requests"),
        "verify_endpoint": format!("{public_url}/verifier/verify"),
        "vp_formats_supported": ["jwt_vp_json", "jwt_vc_json"],
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataSource {
    /// Served from a tenant of this installation.
    Local,
    /// Fetched over HTTP.
    Remote,
}

#[derive(Debug, Clone)]
pub struct ResolvedMetadata {
    pub source: MetadataSource,
    pub document: Value,
}

impl ResolvedMetadata {
    pub fn issuer_did(&self) -> Option<&str> {
        self.document.get("issuer_did").and_then(Value::as_str)
    }
}

/// Resolves issuer metadata, answering for local tenants without a round trip.
pub struct MetadataResolver {
    tenants: Arc<TenantRegistry>,
    http: reqwest::Client,
}

impl MetadataResolver {
    pub fn new(tenants: Arc<TenantRegistry>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { tenants, http }
    }

    pub async fn resolve_issuer(&self, issuer_url: &str) -> Result<ResolvedMetadata, TenantError> {
        let base = normalize_base_url(issuer_url)?;
        if let Some(record) = self.tenants.find_by_url(&base)? {
            tracing::debug!(url = %base, tenant = %record.id, "issuer metadata resolved locally");
            return Ok(ResolvedMetadata {
                source: MetadataSource::Local,
                document: record.discovery_metadata.issuer,
            });
        }

        let unavailable = |message: String| TenantError::MetadataUnavailable {
            url: base.clone(),
            message,
        };
        let url = format!("{base}{WELL_KNOWN_ISSUER}");
        let document: Value = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        tracing::debug!(url = %url, "issuer metadata fetched");
        Ok(ResolvedMetadata {
            source: MetadataSource::Remote,
            document,
        })
    }

    /// DID a presentation must be issued by to count as coming from `issuer_url`.
    pub async fn trusted_issuer_did(&self, issuer_url: &str) -> Result<String, TenantError> {
        let resolved = self.resolve_issuer(issuer_url).await?;
        resolved
            .issuer_did()
            .map(str::to_string)
            .ok_or_else(|| TenantError::MetadataUnavailable {
                url: issuer_url.to_string(),
                message: "metadata does not name an issuer DID".into(),
            })
    }
}
