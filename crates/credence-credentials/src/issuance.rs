//! Pre-authorized-code issuance.
//!
//! An offer is stored under the digest of its one-time code. Redemption
//! atomically takes the entry out of the store, so at most one caller can
//! ever observe it; the winner then validates, signs and records one
//! credential per template.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use credence_core::{
    OfferEvent, OfferState, OfferStateMachine, RecordStore, RecordStoreExt, Table, TenantContext,
    TenantId,
};
use credence_crypto::{digest_hex, jws, JwsHeader};
use credence_identity::KeyCustodian;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::definition::{CredentialDefinition, CredentialDefinitionRegistry};
use crate::error::CredentialError;
use crate::ledger::{CredentialLedger, IssuedCredential};
use crate::offer::{CredentialOffer, CredentialTemplate, OfferRequest, TemplateRequest};
use crate::schema::SchemaRegistry;

pub const PRE_AUTHORIZED_GRANT: &str = "urn:ietf:params:oauth:grant-type:pre-authorized_code";

pub const DEFAULT_OFFER_TTL_SECS: u64 = 600;

pub const MAX_OFFER_TTL_SECS: u64 = 30 * 24 * 60 * 60;

const W3C_CREDENTIALS_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";

const CODE_LEN: usize = 32;

/// Attempts at drawing an unused code before giving up.
const CODE_ATTEMPTS: usize = 3;

/// Response to offer creation. The code is returned exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferCreated {
    pub offer_id: String,
    pub pre_authorized_code: String,
    #[serde(rename = "credential_offer_url")]
    pub credential_offer_url: String,
    pub expires_at: chrono::DateTime<Utc>,
}

/// Result of redeeming a code: the first credential plus all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub credential_id: String,
    pub verifiable_credential: String,
    pub credentials: Vec<IssuedCredential>,
}

pub struct IssuanceEngine {
    store: Arc<dyn RecordStore>,
    schemas: Arc<SchemaRegistry>,
    definitions: Arc<CredentialDefinitionRegistry>,
    ledger: Arc<CredentialLedger>,
    custodian: Arc<dyn KeyCustodian>,
    default_ttl: Duration,
}

impl IssuanceEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        schemas: Arc<SchemaRegistry>,
        definitions: Arc<CredentialDefinitionRegistry>,
        ledger: Arc<CredentialLedger>,
        custodian: Arc<dyn KeyCustodian>,
    ) -> Self {
        Self {
            store,
            schemas,
            definitions,
            ledger,
            custodian,
            default_ttl: Duration::seconds(DEFAULT_OFFER_TTL_SECS as i64),
        }
    }

    pub fn with_default_ttl(mut self, ttl_secs: u64) -> Self {
        let secs = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        self.default_ttl = Duration::seconds(secs.min(MAX_OFFER_TTL_SECS as i64));
        self
    }

    pub fn ledger(&self) -> &Arc<CredentialLedger> {
        &self.ledger
    }

    /// Materialize the requested templates and store a single-use offer.
    pub fn create_offer(
        &self,
        ctx: &TenantContext,
        request: OfferRequest,
    ) -> Result<OfferCreated, CredentialError> {
        if request.credentials.is_empty() {
            return Err(CredentialError::InvalidOffer(
                "at least one credential is required".into(),
            ));
        }
        let Some(tenant_issuer) = ctx.issuer_did.as_deref() else {
            return Err(CredentialError::InvalidOffer(
                "tenant has no issuer identity".into(),
            ));
        };

        let mut templates = Vec::with_capacity(request.credentials.len());
        let mut definition_issuer: Option<String> = None;
        for requested in request.credentials {
            let (template, definition) = self.materialize(ctx, requested)?;
            if let Some(definition) = definition {
                match &definition_issuer {
                    Some(issuer) if issuer != &definition.issuer_did => {
                        return Err(CredentialError::InvalidOffer(
                            "definitions in one offer must share an issuer".into(),
                        ))
                    }
                    Some(_) => {}
                    None => definition_issuer = Some(definition.issuer_did),
                }
            }
            templates.push(template);
        }

        let issuer_did = request
            .issuer_did
            .or(definition_issuer)
            .unwrap_or_else(|| tenant_issuer.to_string());
        if issuer_did != tenant_issuer {
            return Err(CredentialError::IssuerNotOwned(issuer_did));
        }

        let ttl = match request.expires_in {
            Some(secs) if secs > MAX_OFFER_TTL_SECS => {
                return Err(CredentialError::InvalidOffer(format!(
                    "expiresIn must not exceed {MAX_OFFER_TTL_SECS} seconds"
                )))
            }
            Some(secs) => Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX)),
            None => self.default_ttl,
        };
        let now = Utc::now();
        let offer = CredentialOffer {
            offer_id: Uuid::now_v7().to_string(),
            tenant_id: ctx.tenant_id.clone(),
            issuer_did,
            credential_issuer: ctx.base_url.clone(),
            templates,
            created_at: now,
            expires_at: now + ttl,
            state: OfferState::Created,
        };

        let code = self.store_offer(&offer)?;
        tracing::info!(
            tenant = %offer.tenant_id,
            offer_id = %offer.offer_id,
            credentials = offer.templates.len(),
            expires_at = %offer.expires_at,
            "credential offer created"
        );

        Ok(OfferCreated {
            credential_offer_url: offer.offer_url(&code),
            offer_id: offer.offer_id,
            pre_authorized_code: code,
            expires_at: offer.expires_at,
        })
    }

    fn materialize(
        &self,
        ctx: &TenantContext,
        requested: TemplateRequest,
    ) -> Result<(CredentialTemplate, Option<CredentialDefinition>), CredentialError> {
        let definition = match requested.credential_definition_id.as_deref() {
            Some(reference) => Some(
                self.definitions
                    .get(&ctx.tenant_id, reference)?
                    .ok_or_else(|| CredentialError::UnknownDefinition(reference.to_string()))?,
            ),
            None => None,
        };

        let types = if !requested.types.is_empty() {
            requested.types
        } else if let Some(definition) = &definition {
            definition.credential_type.clone()
        } else {
            return Err(CredentialError::InvalidOffer(
                "credential type is required without a credentialDefinitionId".into(),
            ));
        };

        let schema_id = match requested.schema_id {
            Some(schema_id) => match self.schemas.get(&ctx.namespace(), &schema_id) {
                Ok(_) => Some(schema_id),
                Err(CredentialError::SchemaNotFound(id)) => {
                    return Err(CredentialError::UnknownSchema(id))
                }
                Err(e) => return Err(e),
            },
            None => definition.as_ref().map(|d| d.schema_id.clone()),
        };

        let mut claims = match definition.as_ref().map(|d| &d.claim_template) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        match requested.claim_template {
            None | Some(Value::Null) => {}
            Some(Value::Object(overrides)) => claims.extend(overrides),
            Some(_) => {
                return Err(CredentialError::InvalidOffer(
                    "claimTemplate must be an object".into(),
                ))
            }
        }

        let format = requested
            .format
            .or_else(|| definition.as_ref().map(|d| d.wire_format))
            .unwrap_or_default();

        let template = CredentialTemplate {
            types,
            schema_id,
            claims,
            format,
            definition_id: definition.as_ref().map(|d| d.definition_id.clone()),
        };
        Ok((template, definition))
    }

    fn store_offer(&self, offer: &CredentialOffer) -> Result<String, CredentialError> {
        for _ in 0..CODE_ATTEMPTS {
            let mut bytes = [0u8; CODE_LEN];
            OsRng.fill_bytes(&mut bytes);
            let code = URL_SAFE_NO_PAD.encode(bytes);
            if self
                .store
                .put_json_if_absent(Table::Offers, &code_key(&code), offer)?
            {
                return Ok(code);
            }
        }
        Err(CredentialError::InvalidOffer(
            "could not allocate a unique pre-authorized code".into(),
        ))
    }

    /// Redeem a pre-authorized code for signed credentials bound to `subject_did`.
    pub async fn redeem(
        &self,
        pre_authorized_code: &str,
        subject_did: &str,
    ) -> Result<Redemption, CredentialError> {
        if subject_did.trim().is_empty() {
            return Err(CredentialError::InvalidOffer("subject_did is required".into()));
        }

        // Single atomic check-and-delete: a concurrent caller sees None.
        let offer: CredentialOffer = self
            .store
            .take_json(Table::Offers, &code_key(pre_authorized_code))?
            .ok_or(CredentialError::InvalidOrExpiredCode)?;

        let now = Utc::now();
        if offer.is_expired_at(now) {
            OfferStateMachine::transition(offer.state, OfferEvent::Expire)?;
            tracing::info!(
                tenant = %offer.tenant_id,
                offer_id = %offer.offer_id,
                "credential offer expired at redemption"
            );
            return Err(CredentialError::OfferExpired);
        }
        OfferStateMachine::transition(offer.state, OfferEvent::Redeem)?;

        for template in &offer.templates {
            if let Some(schema_id) = &template.schema_id {
                let report = self
                    .schemas
                    .validate(schema_id, &Value::Object(template.claims.clone()));
                if !report.valid {
                    return Err(CredentialError::SchemaViolation {
                        schema_id: schema_id.clone(),
                        issues: report.errors,
                    });
                }
            }
        }

        let issuer = self.custodian.resolve(&offer.issuer_did).await?;

        // Every signature must succeed before anything reaches the ledger.
        let mut signed = Vec::with_capacity(offer.templates.len());
        for template in &offer.templates {
            let credential_id = format!("urn:uuid:{}", Uuid::now_v7());
            let issued_at = Utc::now();
            let header = JwsHeader {
                alg: issuer.algorithm(),
                typ: template.format.jose_type().to_string(),
                kid: Some(issuer.key_ref.clone()),
            };
            let claims = credential_claims(
                &credential_id,
                &offer.issuer_did,
                subject_did,
                template,
                issued_at,
            );
            let input = jws::signing_input(&header, &claims)?;
            let signature = self
                .custodian
                .sign(&issuer.key_ref, input.as_bytes())
                .await
                .map_err(|e| CredentialError::Signing(e.to_string()))?;

            signed.push(IssuedCredential {
                credential_id,
                tenant_id: offer.tenant_id.clone(),
                credential: jws::assemble(&input, &signature),
                subject_id: subject_did.to_string(),
                issuer: offer.issuer_did.clone(),
                schema_id: template.schema_id.clone(),
                definition_id: template.definition_id.clone(),
                types: vc_types(template),
                format: template.format,
                created_at: issued_at,
                revoked: false,
                revoked_at: None,
            });
        }

        for record in &signed {
            self.ledger.record(record)?;
            tracing::info!(
                tenant = %offer.tenant_id,
                offer_id = %offer.offer_id,
                credential_id = %record.credential_id,
                issuer = %offer.issuer_did,
                subject = subject_did,
                alg = %issuer.algorithm(),
                "credential issued"
            );
        }

        let first = signed
            .first()
            .ok_or_else(|| CredentialError::InvalidOffer("offer carried no credentials".into()))?;
        Ok(Redemption {
            credential_id: first.credential_id.clone(),
            verifiable_credential: first.credential.clone(),
            credentials: signed,
        })
    }

    /// Remove offers whose TTL has elapsed. Returns how many were dropped.
    pub fn purge_expired(&self) -> Result<usize, CredentialError> {
        let now = Utc::now();
        let mut purged = 0;
        for (key, raw) in self.store.scan_prefix(Table::Offers, "")? {
            let offer: CredentialOffer = match serde_json::from_slice(&raw) {
                Ok(offer) => offer,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable offer record");
                    continue;
                }
            };
            if offer.is_expired_at(now) && self.store.take(Table::Offers, &key)?.is_some() {
                purged += 1;
            }
        }
        if purged > 0 {
            tracing::debug!(purged, "expired offers purged");
        }
        Ok(purged)
    }

    pub fn get_credential(
        &self,
        tenant_id: &TenantId,
        credential_id: &str,
    ) -> Result<IssuedCredential, CredentialError> {
        self.ledger.get(tenant_id, credential_id)
    }

    pub fn list_credentials(
        &self,
        tenant_id: &TenantId,
        subject: Option<&str>,
        issuer: Option<&str>,
    ) -> Result<Vec<IssuedCredential>, CredentialError> {
        self.ledger.list(tenant_id, subject, issuer)
    }

    pub fn revoke(
        &self,
        tenant_id: &TenantId,
        credential_id: &str,
    ) -> Result<IssuedCredential, CredentialError> {
        self.ledger.revoke(tenant_id, credential_id)
    }
}

/// Offers are keyed by the code's digest; the code itself is never stored.
fn code_key(code: &str) -> String {
    digest_hex(code.as_bytes())
}

fn vc_types(template: &CredentialTemplate) -> Vec<String> {
    let mut types = vec!["VerifiableCredential".to_string()];
    types.extend(
        template
            .types
            .iter()
            .filter(|t| t.as_str() != "VerifiableCredential")
            .cloned(),
    );
    types
}

fn credential_claims(
    credential_id: &str,
    issuer: &str,
    subject: &str,
    template: &CredentialTemplate,
    issued_at: chrono::DateTime<Utc>,
) -> Value {
    let mut subject_claims = Map::new();
    subject_claims.insert("id".into(), Value::String(subject.to_string()));
    for (k, v) in &template.claims {
        if k != "id" {
            subject_claims.insert(k.clone(), v.clone());
        }
    }

    let mut vc = json!({
        "@context": [W3C_CREDENTIALS_CONTEXT],
        "type": vc_types(template),
        "issuer": issuer,
        "issuanceDate": issued_at.to_rfc3339(),
        "credentialSubject": subject_claims,
    });
    if let (Some(schema_id), Value::Object(vc)) = (&template.schema_id, &mut vc) {
        vc.insert(
            "credentialSchema".into(),
            json!({"id": schema_id, "type": "JsonSchema"}),
        );
    }

    let ts = issued_at.timestamp();
    json!({
        "iss": issuer,
        "sub": subject,
        "iat": ts,
        "nbf": ts,
        "jti": credential_id,
        "vc": vc,
    })
}
