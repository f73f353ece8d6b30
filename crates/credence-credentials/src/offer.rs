use chrono::{DateTime, Utc};
use credence_core::{OfferState, TenantId, WireFormat};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// One requested credential in an offer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRequest {
    #[serde(default, rename = "type")]
    pub types: Vec<String>,
    pub schema_id: Option<String>,
    pub claim_template: Option<Value>,
    pub format: Option<WireFormat>,
    pub credential_definition_id: Option<String>,
}

/// Body of an offer-creation request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferRequest {
    pub credentials: Vec<TemplateRequest>,
    pub issuer_did: Option<String>,
    /// TTL in seconds. Zero produces an offer that is already expired.
    pub expires_in: Option<u64>,
}

/// A credential template with every default filled in from its definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialTemplate {
    pub types: Vec<String>,
    pub schema_id: Option<String>,
    pub claims: Map<String, Value>,
    pub format: WireFormat,
    pub definition_id: Option<String>,
}

impl CredentialTemplate {
    /// The most specific type, i.e. the last one that is not the generic
    /// `VerifiableCredential`.
    pub fn primary_type(&self) -> &str {
        self.types
            .iter()
            .rev()
            .find(|t| t.as_str() != "VerifiableCredential")
            .map(String::as_str)
            .unwrap_or("VerifiableCredential")
    }

    /// OIDC4VCI credential configuration id, e.g. `PaymentReceipt_jwt_vc_json`.
    pub fn configuration_id(&self) -> String {
        format!("{}_{}", self.primary_type(), self.format.tag())
    }
}

/// A stored, not yet redeemed offer. Keyed by the digest of its
/// pre-authorized code; the code itself is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialOffer {
    pub offer_id: String,
    pub tenant_id: TenantId,
    pub issuer_did: String,
    /// `credential_issuer` advertised in the offer URL.
    pub credential_issuer: String,
    #[serde(rename = "definitions")]
    pub templates: Vec<CredentialTemplate>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: OfferState,
}

impl CredentialOffer {
    /// An offer is expired from `expires_at` on, so a zero TTL never redeems.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn configuration_ids(&self) -> Vec<String> {
        self.templates.iter().map(|t| t.configuration_id()).collect()
    }

    /// `openid-credential-offer://?credential_offer=<urlencoded JSON>`
    pub fn offer_url(&self, pre_authorized_code: &str) -> String {
        let offer = json!({
            "credential_issuer": self.credential_issuer,
            "credential_configuration_ids": self.configuration_ids(),
            "grants": {
                (crate::issuance::PRE_AUTHORIZED_GRANT): {
                    "pre-authorized_code": pre_authorized_code,
                }
            }
        });
        let encoded: String =
            url::form_urlencoded::byte_serialize(offer.to_string().as_bytes()).collect();
        format!("openid-credential-offer://?credential_offer={encoded}")
    }
}
