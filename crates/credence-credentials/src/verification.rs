//! Presentation requests and verification of presented credentials.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use credence_core::{RecordStore, RecordStoreExt, Table, TenantContext, TenantId};
use credence_crypto::jws;
use credence_identity::{IdentityError, KeyCustodian};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::definition::CredentialDefinitionRegistry;
use crate::error::CredentialError;
use crate::ledger::CredentialLedger;
use crate::schema::{SchemaRegistry, ValidationReport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationRequest {
    pub request_id: String,
    pub tenant_id: TenantId,
    /// The definition reference as the caller supplied it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition_id: Option<String>,
    /// Only credentials from this issuer DID are accepted when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted_issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier_did: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "presentation_request_url")]
    pub request_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Claim re-validation against the original schema. Reported, never fatal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_validation: Option<ValidationReport>,
}

impl VerificationOutcome {
    fn rejected(reason: &str) -> Self {
        Self {
            verified: false,
            reason: Some(reason.to_string()),
            credential_id: None,
            issuer: None,
            subject: None,
            schema_validation: None,
        }
    }
}

/// The pieces of a presented credential the checks need.
struct Presented {
    token: jws::DecodedJws,
    issuer: String,
}

impl Presented {
    fn vc(&self) -> Option<&Value> {
        self.token.claims.get("vc")
    }

    fn credential_id(&self) -> Option<String> {
        self.token
            .claims
            .get("jti")
            .or_else(|| self.vc().and_then(|vc| vc.get("id")))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn subject(&self) -> Option<String> {
        self.token
            .claims
            .get("sub")
            .or_else(|| {
                self.vc()
                    .and_then(|vc| vc.get("credentialSubject"))
                    .and_then(|s| s.get("id"))
            })
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn types(&self) -> Vec<String> {
        match self.vc().and_then(|vc| vc.get("type")) {
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(t)) => vec![t.clone()],
            _ => Vec::new(),
        }
    }

    /// Subject claims without the holder id, as validated at issuance.
    fn claims(&self) -> Value {
        let mut subject = self
            .vc()
            .and_then(|vc| vc.get("credentialSubject"))
            .cloned()
            .unwrap_or(Value::Object(Default::default()));
        if let Value::Object(map) = &mut subject {
            map.remove("id");
        }
        subject
    }

    fn embedded_schema_id(&self) -> Option<String> {
        self.vc()
            .and_then(|vc| vc.get("credentialSchema"))
            .and_then(|s| s.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Pull the first credential token out of the accepted presentation shapes:
/// a compact JWT (VC or VP), a JSON object with `verifiableCredential`, or a
/// JSON string encoding such an object.
fn extract_credential(presentation: &Value) -> Option<String> {
    match presentation {
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.starts_with('{') {
                let parsed: Value = serde_json::from_str(trimmed).ok()?;
                return extract_credential(&parsed);
            }
            let decoded = jws::decode(trimmed).ok()?;
            match decoded.claims.get("vp") {
                Some(vp) => extract_credential(vp),
                None => Some(trimmed.to_string()),
            }
        }
        Value::Object(map) => match map.get("verifiableCredential") {
            Some(Value::String(token)) => Some(token.trim().to_string()),
            Some(Value::Array(items)) => items.first().and_then(|first| match first {
                Value::String(token) => Some(token.trim().to_string()),
                _ => None,
            }),
            _ => map.get("vp").and_then(extract_credential),
        },
        _ => None,
    }
}

fn parse_presented(presentation: &Value) -> Option<Presented> {
    let token = jws::decode(&extract_credential(presentation)?).ok()?;
    let issuer = token
        .claims
        .get("iss")
        .and_then(Value::as_str)
        .or_else(|| {
            let issuer = token.claims.get("vc")?.get("issuer")?;
            issuer
                .as_str()
                .or_else(|| issuer.get("id").and_then(Value::as_str))
        })?
        .to_string();
    Some(Presented { token, issuer })
}

pub struct VerificationEngine {
    store: Arc<dyn RecordStore>,
    schemas: Arc<SchemaRegistry>,
    definitions: Arc<CredentialDefinitionRegistry>,
    ledger: Arc<CredentialLedger>,
    custodian: Arc<dyn KeyCustodian>,
    public_url: String,
}

impl VerificationEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        schemas: Arc<SchemaRegistry>,
        definitions: Arc<CredentialDefinitionRegistry>,
        ledger: Arc<CredentialLedger>,
        custodian: Arc<dyn KeyCustodian>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            schemas,
            definitions,
            ledger,
            custodian,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Store a presentation request. A `definition` reference must resolve
    /// within the tenant.
    pub fn create_request(
        &self,
        ctx: &TenantContext,
        definition: Option<&str>,
        trusted_issuer: Option<String>,
    ) -> Result<PresentationRequest, CredentialError> {
        let definition_id = match definition {
            Some(reference) => Some(
                self.definitions
                    .get(&ctx.tenant_id, reference)?
                    .ok_or_else(|| CredentialError::UnknownDefinition(reference.to_string()))?
                    .definition_id,
            ),
            None => None,
        };

        let request_id = Uuid::now_v7().to_string();
        let request_uri = format!(
            "{}/verifier/presentation-requests/{request_id}",
            self.public_url
        );
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        if let Some(verifier) = &ctx.verifier_did {
            query.append_pair("client_id", verifier);
        }
        query.append_pair("request_uri", &request_uri);

        let request = PresentationRequest {
            request_id: request_id.clone(),
            tenant_id: ctx.tenant_id.clone(),
            definition: definition.map(str::to_string),
            definition_id,
            trusted_issuer,
            verifier_did: ctx.verifier_did.clone(),
            created_at: Utc::now(),
            request_url: format!("openid4vp://?{}", query.finish()),
        };
        self.store
            .put_json(Table::PresentationRequests, &request_id, &request)?;

        tracing::info!(
            tenant = %ctx.tenant_id,
            request_id = %request_id,
            definition = ?request.definition_id,
            "presentation request created"
        );
        Ok(request)
    }

    pub fn get_request(&self, request_id: &str) -> Result<PresentationRequest, CredentialError> {
        self.store
            .get_json(Table::PresentationRequests, request_id)?
            .ok_or_else(|| CredentialError::RequestNotFound(request_id.to_string()))
    }

    /// Verify a presentation against a request owned by the calling tenant.
    ///
    /// Only an unknown request (or a storage failure) is an error; every
    /// problem with the presentation itself comes back as `verified = false`.
    pub async fn verify(
        &self,
        ctx: &TenantContext,
        request_id: &str,
        presentation: &Value,
    ) -> Result<VerificationOutcome, CredentialError> {
        let request = match self.get_request(request_id) {
            Ok(request) if request.tenant_id == ctx.tenant_id => request,
            Ok(_) => return Err(CredentialError::RequestNotFound(request_id.to_string())),
            Err(e) => return Err(e),
        };

        let outcome = self.check(&request, presentation).await?;
        tracing::info!(
            tenant = %ctx.tenant_id,
            request_id = request_id,
            verified = outcome.verified,
            reason = outcome.reason.as_deref().unwrap_or(""),
            credential_id = outcome.credential_id.as_deref().unwrap_or(""),
            "presentation verified"
        );
        Ok(outcome)
    }

    async fn check(
        &self,
        request: &PresentationRequest,
        presentation: &Value,
    ) -> Result<VerificationOutcome, CredentialError> {
        let Some(presented) = parse_presented(presentation) else {
            return Ok(VerificationOutcome::rejected("malformed_presentation"));
        };
        let mut outcome = VerificationOutcome {
            verified: false,
            reason: None,
            credential_id: presented.credential_id(),
            issuer: Some(presented.issuer.clone()),
            subject: presented.subject(),
            schema_validation: None,
        };
        let reject = |mut outcome: VerificationOutcome, reason: &str| {
            outcome.reason = Some(reason.to_string());
            Ok(outcome)
        };

        match self
            .custodian
            .verify(
                &presented.issuer,
                presented.token.signing_input.as_bytes(),
                &presented.token.signature,
            )
            .await
        {
            Ok(()) => {}
            Err(IdentityError::DidNotFound(_) | IdentityError::InvalidDid(_)) => {
                return reject(outcome, "issuer_unresolvable")
            }
            Err(IdentityError::Crypto(_)) => return reject(outcome, "invalid_signature"),
            Err(e) => return Err(e.into()),
        }

        if let Some(exp) = presented.token.claims.get("exp").and_then(Value::as_i64) {
            if Utc::now().timestamp() >= exp {
                return reject(outcome, "expired");
            }
        }

        if let Some(trusted) = &request.trusted_issuer {
            if trusted != &presented.issuer {
                return reject(outcome, "untrusted_issuer");
            }
        }

        let issued = match &outcome.credential_id {
            Some(id) => self.ledger.find(id)?,
            None => None,
        };
        if issued.as_ref().is_some_and(|c| c.revoked) {
            return reject(outcome, "revoked");
        }

        if let Some(definition_id) = &request.definition_id {
            match self.definitions.get(&request.tenant_id, definition_id)? {
                Some(definition) => {
                    let presented_types = presented.types();
                    if !definition
                        .credential_type
                        .iter()
                        .all(|t| presented_types.contains(t))
                    {
                        return reject(outcome, "type_mismatch");
                    }
                }
                None => tracing::warn!(
                    request_id = %request.request_id,
                    definition_id = %definition_id,
                    "requested definition no longer resolvable, skipping type check"
                ),
            }
        }

        let schema_id = issued
            .and_then(|c| c.schema_id)
            .or_else(|| presented.embedded_schema_id());
        if let Some(schema_id) = schema_id {
            outcome.schema_validation = Some(self.schemas.validate(&schema_id, &presented.claims()));
        }

        outcome.verified = true;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::NewDefinition;
    use crate::issuance::IssuanceEngine;
    use crate::offer::{OfferRequest, TemplateRequest};
    use credence_core::{MemoryStore, Namespace, TenantType, WireFormat};
    use credence_crypto::{JwsHeader, KeyType};
    use credence_identity::LocalKeyCustodian;
    use serde_json::json;

    const ISSUER: &str = "did:example:issuer1";
    const HOLDER: &str = "did:example:holder1";

    struct Fixture {
        issuance: IssuanceEngine,
        verification: VerificationEngine,
        definitions: Arc<CredentialDefinitionRegistry>,
        custodian: Arc<LocalKeyCustodian>,
        ctx: TenantContext,
        definition_id: String,
        schema_id: String,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let schemas = Arc::new(SchemaRegistry::new(Arc::clone(&store)));
        let definitions = Arc::new(CredentialDefinitionRegistry::new(
            Arc::clone(&store),
            Arc::clone(&schemas),
        ));
        let ledger = Arc::new(CredentialLedger::new(Arc::clone(&store)));
        let custodian = Arc::new(LocalKeyCustodian::new(Arc::clone(&store)));
        custodian.import_identity(ISSUER, KeyType::Ed25519).await.unwrap();

        let tenant_id = TenantId::generate();
        let schema_id = schemas
            .register(
                &Namespace::Tenant(tenant_id.clone()),
                "PaymentReceipt",
                "1.0.0",
                json!({
                    "type": "object",
                    "properties": {"amount": {"type": "number"}, "currency": {"type": "string"}},
                    "required": ["amount", "currency"]
                }),
            )
            .unwrap()
            .schema_id;
        let definition_id = definitions
            .register(
                &tenant_id,
                NewDefinition {
                    name: "PaymentReceiptDef".into(),
                    version: "1.0.0".into(),
                    schema_id: schema_id.clone(),
                    issuer_did: ISSUER.into(),
                    credential_type: vec!["PaymentReceipt".into()],
                    claim_template: json!({"currency": "EUR"}),
                    wire_format: WireFormat::JwtVcJson,
                },
            )
            .unwrap()
            .definition_id;

        let issuance = IssuanceEngine::new(
            Arc::clone(&store),
            Arc::clone(&schemas),
            Arc::clone(&definitions),
            Arc::clone(&ledger),
            custodian.clone(),
        );
        let verification = VerificationEngine::new(
            store,
            schemas,
            Arc::clone(&definitions),
            ledger,
            custodian.clone(),
            "https://credence.example.com/",
        );
        Fixture {
            issuance,
            verification,
            definitions,
            custodian,
            ctx: TenantContext {
                tenant_id,
                tenant_type: TenantType::Org,
                issuer_did: Some(ISSUER.into()),
                verifier_did: Some("did:example:verifier1".into()),
                base_url: "https://credence.example.com/tenants/acme".into(),
            },
            definition_id,
            schema_id,
        }
    }

    async fn issue(f: &Fixture) -> (String, String) {
        let created = f
            .issuance
            .create_offer(
                &f.ctx,
                OfferRequest {
                    credentials: vec![TemplateRequest {
                        credential_definition_id: Some(f.definition_id.clone()),
                        claim_template: Some(json!({"amount": 10})),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            )
            .unwrap();
        let redemption = f
            .issuance
            .redeem(&created.pre_authorized_code, HOLDER)
            .await
            .unwrap();
        (redemption.credential_id, redemption.verifiable_credential)
    }

    async fn sign_raw(f: &Fixture, claims: Value) -> String {
        let resolved = f.custodian.resolve(ISSUER).await.unwrap();
        let header = JwsHeader {
            alg: resolved.algorithm(),
            typ: "JWT".into(),
            kid: Some(resolved.key_ref.clone()),
        };
        let input = jws::signing_input(&header, &claims).unwrap();
        let sig = f.custodian.sign(&resolved.key_ref, input.as_bytes()).await.unwrap();
        jws::assemble(&input, &sig)
    }

    #[tokio::test]
    async fn test_issued_credential_verifies() {
        let f = fixture().await;
        let (credential_id, vc) = issue(&f).await;
        let request = f
            .verification
            .create_request(&f.ctx, Some("PaymentReceiptDef"), None)
            .unwrap();
        assert!(request.request_url.starts_with("openid4vp://?client_id="));

        let outcome = f
            .verification
            .verify(&f.ctx, &request.request_id, &Value::String(vc))
            .await
            .unwrap();
        assert!(outcome.verified, "{outcome:?}");
        assert_eq!(outcome.reason, None);
        assert_eq!(outcome.credential_id.as_deref(), Some(credential_id.as_str()));
        assert_eq!(outcome.issuer.as_deref(), Some(ISSUER));
        assert_eq!(outcome.subject.as_deref(), Some(HOLDER));
        assert!(outcome.schema_validation.unwrap().valid);
    }

    #[tokio::test]
    async fn test_revoked_credential_fails() {
        let f = fixture().await;
        let (credential_id, vc) = issue(&f).await;
        f.issuance.revoke(&f.ctx.tenant_id, &credential_id).unwrap();

        let request = f.verification.create_request(&f.ctx, None, None).unwrap();
        let outcome = f
            .verification
            .verify(&f.ctx, &request.request_id, &Value::String(vc))
            .await
            .unwrap();
        assert!(!outcome.verified);
        assert_eq!(outcome.reason.as_deref(), Some("revoked"));
    }

    #[tokio::test]
    async fn test_presentation_shapes() {
        let f = fixture().await;
        let (_, vc) = issue(&f).await;
        let request = f.verification.create_request(&f.ctx, None, None).unwrap();

        let object = json!({"verifiableCredential": [vc.clone()]});
        let as_string = Value::String(object.to_string());
        let vp_jwt = Value::String(sign_raw(&f, json!({"vp": {"verifiableCredential": vc}})).await);
        for presentation in [object, as_string, vp_jwt] {
            let outcome = f
                .verification
                .verify(&f.ctx, &request.request_id, &presentation)
                .await
                .unwrap();
            assert!(outcome.verified, "{presentation}: {outcome:?}");
        }
    }

    #[tokio::test]
    async fn test_malformed_presentation() {
        let f = fixture().await;
        let request = f.verification.create_request(&f.ctx, None, None).unwrap();
        for presentation in [json!("not a jwt"), json!(42), json!({"foo": "bar"})] {
            let outcome = f
                .verification
                .verify(&f.ctx, &request.request_id, &presentation)
                .await
                .unwrap();
            assert!(!outcome.verified);
            assert_eq!(outcome.reason.as_deref(), Some("malformed_presentation"));
        }
    }

    #[tokio::test]
    async fn test_tampered_signature() {
        let f = fixture().await;
        let (_, vc) = issue(&f).await;
        let (input, _) = vc.rsplit_once('.').unwrap();
        let forged = jws::assemble(input, &[0u8; 64]);

        let request = f.verification.create_request(&f.ctx, None, None).unwrap();
        let outcome = f
            .verification
            .verify(&f.ctx, &request.request_id, &Value::String(forged))
            .await
            .unwrap();
        assert_eq!(outcome.reason.as_deref(), Some("invalid_signature"));
    }

    #[tokio::test]
    async fn test_unresolvable_issuer() {
        let f = fixture().await;
        let token = sign_raw(&f, json!({"iss": "did:example:nobody", "sub": HOLDER})).await;
        let request = f.verification.create_request(&f.ctx, None, None).unwrap();
        let outcome = f
            .verification
            .verify(&f.ctx, &request.request_id, &Value::String(token))
            .await
            .unwrap();
        assert_eq!(outcome.reason.as_deref(), Some("issuer_unresolvable"));
    }

    #[tokio::test]
    async fn test_expired_credential() {
        let f = fixture().await;
        let token = sign_raw(
            &f,
            json!({"iss": ISSUER, "sub": HOLDER, "exp": Utc::now().timestamp() - 10}),
        )
        .await;
        let request = f.verification.create_request(&f.ctx, None, None).unwrap();
        let outcome = f
            .verification
            .verify(&f.ctx, &request.request_id, &Value::String(token))
            .await
            .unwrap();
        assert_eq!(outcome.reason.as_deref(), Some("expired"));
    }

    #[tokio::test]
    async fn test_untrusted_issuer() {
        let f = fixture().await;
        let (_, vc) = issue(&f).await;
        let request = f
            .verification
            .create_request(&f.ctx, None, Some("did:example:other".into()))
            .unwrap();
        let outcome = f
            .verification
            .verify(&f.ctx, &request.request_id, &Value::String(vc))
            .await
            .unwrap();
        assert_eq!(outcome.reason.as_deref(), Some("untrusted_issuer"));
    }

    #[tokio::test]
    async fn test_type_mismatch() {
        let f = fixture().await;
        let (_, vc) = issue(&f).await;
        f.definitions
            .register(
                &f.ctx.tenant_id,
                NewDefinition {
                    name: "Membership".into(),
                    version: "1.0.0".into(),
                    schema_id: f.schema_id.clone(),
                    issuer_did: ISSUER.into(),
                    credential_type: vec!["MembershipCredential".into()],
                    claim_template: Value::Null,
                    wire_format: WireFormat::JwtVcJson,
                },
            )
            .unwrap();
        let request = f
            .verification
            .create_request(&f.ctx, Some("MembershipCredential"), None)
            .unwrap();
        let outcome = f
            .verification
            .verify(&f.ctx, &request.request_id, &Value::String(vc))
            .await
            .unwrap();
        assert_eq!(outcome.reason.as_deref(), Some("type_mismatch"));
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_reported_not_fatal() {
        let f = fixture().await;
        let token = sign_raw(
            &f,
            json!({
                "iss": ISSUER,
                "sub": HOLDER,
                "vc": {
                    "type": ["VerifiableCredential", "PaymentReceipt"],
                    "credentialSubject": {"id": HOLDER, "amount": 5},
                    "credentialSchema": {"id": f.schema_id, "type": "JsonSchema"}
                }
            }),
        )
        .await;
        let request = f.verification.create_request(&f.ctx, None, None).unwrap();
        let outcome = f
            .verification
            .verify(&f.ctx, &request.request_id, &Value::String(token))
            .await
            .unwrap();
        assert!(outcome.verified);
        let report = outcome.schema_validation.unwrap();
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.message.contains("currency")));
    }

    #[tokio::test]
    async fn test_request_scoping() {
        let f = fixture().await;
        let request = f.verification.create_request(&f.ctx, None, None).unwrap();
        assert_eq!(
            f.verification.get_request(&request.request_id).unwrap(),
            request
        );

        let mut other = f.ctx.clone();
        other.tenant_id = TenantId::generate();
        let err = f
            .verification
            .verify(&other, &request.request_id, &json!("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::RequestNotFound(_)));
        assert!(matches!(
            f.verification.verify(&f.ctx, "missing", &json!("x")).await.unwrap_err(),
            CredentialError::RequestNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_unknown_definition_in_request() {
        let f = fixture().await;
        assert!(matches!(
            f.verification
                .create_request(&f.ctx, Some("Nope"), None)
                .unwrap_err(),
            CredentialError::UnknownDefinition(_)
        ));
    }
}
