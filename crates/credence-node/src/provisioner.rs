//! Tenant provisioning: identities, default credential definitions and
//! discovery metadata for a new tenant.

use std::sync::Arc;

use credence_core::{Namespace, TenantId, TenantType};
use credence_credentials::defaults::{default_credentials, DefaultCredential};
use credence_credentials::{
    CredentialDefinitionRegistry, CredentialError, NewDefinition, SchemaRegistry,
};
use credence_crypto::KeyType;
use credence_identity::{IdentityError, IdentityRef, KeyCustodian, SessionPool};
use serde::Deserialize;

use crate::metadata::{issuer_metadata, verifier_metadata};
use crate::tenants::{
    normalize_base_url, DiscoveryMetadata, ProvisioningStatus, TenantError, TenantRecord,
    TenantRegistry, TenantStatus,
};

/// Body of a tenant-creation request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTenant {
    pub label: String,
    #[serde(rename = "type")]
    pub tenant_type: TenantType,
    /// Public base URL. Defaults to `{public_url}/tenants/{id}`.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Register this DID as the issuer identity instead of minting a `did:key`.
    #[serde(default)]
    pub issuer_did: Option<String>,
    #[serde(default)]
    pub verifier_did: Option<String>,
}

pub struct Provisioner {
    tenants: Arc<TenantRegistry>,
    custodian: Arc<dyn KeyCustodian>,
    schemas: Arc<SchemaRegistry>,
    definitions: Arc<CredentialDefinitionRegistry>,
    sessions: Arc<SessionPool>,
    public_url: String,
    seed_defaults: bool,
}

impl Provisioner {
    pub fn new(
        tenants: Arc<TenantRegistry>,
        custodian: Arc<dyn KeyCustodian>,
        schemas: Arc<SchemaRegistry>,
        definitions: Arc<CredentialDefinitionRegistry>,
        sessions: Arc<SessionPool>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            tenants,
            custodian,
            schemas,
            definitions,
            sessions,
            public_url: public_url.into().trim_end_matches('/').to_string(),
            seed_defaults: true,
        }
    }

    pub fn with_default_seeding(mut self, enabled: bool) -> Self {
        self.seed_defaults = enabled;
        self
    }

    /// Create a tenant with its identities, seed defaults for ORG tenants,
    /// and publish discovery metadata.
    ///
    /// Identity failures abort creation. Seeding failures do not: the tenant
    /// is saved with a `PARTIAL` provisioning status listing what is missing.
    pub async fn create_tenant(&self, request: CreateTenant) -> Result<TenantRecord, TenantError> {
        let label = request.label.trim();
        if label.is_empty() {
            return Err(TenantError::InvalidRequest("label is required".into()));
        }
        if request.tenant_type == TenantType::User
            && (request.issuer_did.is_some() || request.verifier_did.is_some())
        {
            return Err(TenantError::InvalidRequest(
                "USER tenants hold no issuer or verifier identity".into(),
            ));
        }
        if let (Some(issuer), Some(verifier)) = (&request.issuer_did, &request.verifier_did) {
            if issuer == verifier {
                return Err(TenantError::InvalidRequest(
                    "issuer and verifier identities must differ".into(),
                ));
            }
        }

        let id = TenantId::generate();
        let base_url = match request.base_url.as_deref() {
            Some(url) => normalize_base_url(url)?,
            None => normalize_base_url(&format!("{}/tenants/{id}", self.public_url))?,
        };
        if self.tenants.find_by_url(&base_url)?.is_some() {
            return Err(TenantError::UrlConflict(base_url));
        }

        let _session = self.sessions.acquire(&id).await?;
        let mut record = TenantRecord::new(id, label, request.tenant_type, base_url);
        match request.tenant_type {
            TenantType::Org => {
                let issuer = self.org_identity(request.issuer_did.as_deref()).await?;
                let verifier = match self.org_identity(request.verifier_did.as_deref()).await {
                    Ok(verifier) => verifier,
                    Err(e) => {
                        self.release(&[issuer]).await;
                        return Err(e.into());
                    }
                };
                record.identities.issuer = Some(issuer);
                record.identities.verifier = Some(verifier);
            }
            TenantType::User => {
                record.identities.holder =
                    Some(self.custodian.create_identity(KeyType::Ed25519).await?);
            }
        }
        if let Err(e) = self.tenants.insert(&record) {
            let held: Vec<IdentityRef> = [
                &record.identities.issuer,
                &record.identities.verifier,
                &record.identities.holder,
            ]
            .into_iter()
            .flatten()
            .cloned()
            .collect();
            self.release(&held).await;
            return Err(e);
        }

        let mut failures = Vec::new();
        if request.tenant_type == TenantType::Org {
            if self.seed_defaults {
                failures.extend(self.seed_defaults(&record));
            }
            match self.discovery_for(&record) {
                Ok(metadata) => record.discovery_metadata = metadata,
                Err(e) => {
                    tracing::warn!(tenant = %record.id, error = %e, "discovery metadata not built");
                    failures.push(format!("discovery metadata: {e}"));
                }
            }
        }

        record.status = TenantStatus::Active;
        record.provisioning = ProvisioningStatus::from_failures(failures);
        self.tenants.save(&record)?;

        tracing::info!(
            tenant = %record.id,
            label = %record.label,
            tenant_type = %record.tenant_type,
            complete = record.provisioning.is_complete(),
            "tenant provisioned"
        );
        Ok(record)
    }

    /// Rebuild a tenant's discovery metadata from its current definitions.
    pub fn refresh_metadata(&self, tenant_id: &TenantId) -> Result<TenantRecord, TenantError> {
        let mut record = self.tenants.get(tenant_id.as_str())?;
        if record.tenant_type == TenantType::Org {
            record.discovery_metadata = self.discovery_for(&record)?;
            self.tenants.save(&record)?;
        }
        Ok(record)
    }

    async fn org_identity(&self, alias: Option<&str>) -> Result<IdentityRef, IdentityError> {
        match alias {
            Some(did) => self.custodian.import_identity(did, KeyType::Ed25519).await,
            None => self.custodian.create_identity(KeyType::Ed25519).await,
        }
    }

    /// Forget identities created for a tenant that was never saved, so the
    /// caller can retry with the same aliases.
    async fn release(&self, identities: &[IdentityRef]) {
        for identity in identities {
            if let Err(e) = self.custodian.forget(&identity.did).await {
                tracing::warn!(did = %identity.did, error = %e, "identity rollback failed");
            }
        }
    }

    fn discovery_for(&self, record: &TenantRecord) -> Result<DiscoveryMetadata, TenantError> {
        let definitions = self.definitions.list(&record.id)?;
        Ok(DiscoveryMetadata {
            issuer: issuer_metadata(
                &record.base_url,
                &self.public_url,
                record.issuer_did().unwrap_or_default(),
                &definitions,
            ),
            verifier: verifier_metadata(
                &record.base_url,
                &self.public_url,
                record.verifier_did().unwrap_or_default(),
            ),
        })
    }

    fn seed_defaults(&self, record: &TenantRecord) -> Vec<String> {
        let Some(issuer_did) = record.issuer_did() else {
            return vec!["default definitions: tenant has no issuer identity".into()];
        };
        let namespace = Namespace::Tenant(record.id.clone());
        let mut failures = Vec::new();
        for default in default_credentials() {
            let label = format!("{}@{}", default.name, default.version);
            if let Err(e) = self.seed_one(&namespace, &record.id, issuer_did, default) {
                tracing::warn!(
                    tenant = %record.id,
                    credential = %label,
                    error = %e,
                    "default credential seeding failed"
                );
                failures.push(format!("{label}: {e}"));
            }
        }
        failures
    }

    fn seed_one(
        &self,
        namespace: &Namespace,
        tenant_id: &TenantId,
        issuer_did: &str,
        default: DefaultCredential,
    ) -> Result<(), CredentialError> {
        let schema = match self
            .schemas
            .get_by_name(namespace, default.name, default.version)?
        {
            Some(existing) => existing,
            None => self.schemas.register(
                namespace,
                default.name,
                default.version,
                default.json_schema,
            )?,
        };
        self.definitions.register(
            tenant_id,
            NewDefinition {
                name: default.name.to_string(),
                version: default.version.to_string(),
                schema_id: schema.schema_id,
                issuer_did: issuer_did.to_string(),
                credential_type: vec![default.credential_type.to_string()],
                claim_template: default.claim_template,
                wire_format: default.wire_format,
            },
        )?;
        Ok(())
    }
}
