//! Tenant records and their persistent registry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use credence_core::{
    ErrorKind, RecordStore, RecordStoreExt, StoreError, Table, TenantContext, TenantId, TenantType,
};
use credence_credentials::CredentialError;
use credence_identity::{IdentityError, IdentityRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum TenantError {
    #[error("tenant not found: {0}")]
    NotFound(String),

    #[error("invalid tenant request: {0}")]
    InvalidRequest(String),

    #[error("base URL {0} is already bound to another tenant")]
    UrlConflict(String),

    #[error("metadata unavailable for {url}: {message}")]
    MetadataUnavailable { url: String, message: String },

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("registry error: {0}")]
    Registry(#[from] CredentialError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl TenantError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidRequest(_) | Self::MetadataUnavailable { .. } => ErrorKind::BadRequest,
            Self::UrlConflict(_) => ErrorKind::Conflict,
            Self::Identity(e) => e.kind(),
            Self::Registry(e) => e.kind(),
            Self::Store(_) => ErrorKind::Internal,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "tenant_not_found",
            Self::InvalidRequest(_) => "invalid_tenant_request",
            Self::UrlConflict(_) => "tenant_url_conflict",
            Self::MetadataUnavailable { .. } => "metadata_unavailable",
            Self::Identity(e) => e.reason(),
            Self::Registry(e) => e.reason(),
            Self::Store(_) => "storage_error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantStatus {
    /// Identities are being created and defaults seeded.
    Provisioning,
    Active,
}

/// Outcome of provisioning. Seeding is best-effort, so a tenant can be
/// usable while missing some defaults; that is recorded rather than hidden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisioningStatus {
    Complete,
    Partial { failures: Vec<String> },
}

impl ProvisioningStatus {
    pub fn from_failures(failures: Vec<String>) -> Self {
        if failures.is_empty() {
            Self::Complete
        } else {
            Self::Partial { failures }
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantIdentities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<IdentityRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier: Option<IdentityRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder: Option<IdentityRef>,
}

/// Published discovery documents. Both are empty objects for USER tenants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryMetadata {
    pub issuer: Value,
    pub verifier: Value,
}

impl Default for DiscoveryMetadata {
    fn default() -> Self {
        Self {
            issuer: Value::Object(Map::new()),
            verifier: Value::Object(Map::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRecord {
    pub id: TenantId,
    pub label: String,
    #[serde(rename = "type")]
    pub tenant_type: TenantType,
    pub status: TenantStatus,
    pub provisioning: ProvisioningStatus,
    pub base_url: String,
    pub created_at: DateTime<Utc>,
    pub identities: TenantIdentities,
    pub discovery_metadata: DiscoveryMetadata,
}

impl TenantRecord {
    pub fn new(id: TenantId, label: &str, tenant_type: TenantType, base_url: String) -> Self {
        Self {
            id,
            label: label.to_string(),
            tenant_type,
            status: TenantStatus::Provisioning,
            provisioning: ProvisioningStatus::Complete,
            base_url,
            created_at: Utc::now(),
            identities: TenantIdentities::default(),
            discovery_metadata: DiscoveryMetadata::default(),
        }
    }

    pub fn issuer_did(&self) -> Option<&str> {
        self.identities.issuer.as_ref().map(|i| i.did.as_str())
    }

    pub fn verifier_did(&self) -> Option<&str> {
        self.identities.verifier.as_ref().map(|i| i.did.as_str())
    }

    pub fn holder_did(&self) -> Option<&str> {
        self.identities.holder.as_ref().map(|i| i.did.as_str())
    }

    /// The execution context handed to engines for requests by this tenant.
    pub fn context(&self) -> TenantContext {
        TenantContext {
            tenant_id: self.id.clone(),
            tenant_type: self.tenant_type,
            issuer_did: self.issuer_did().map(str::to_string),
            verifier_did: self.verifier_did().map(str::to_string),
            base_url: self.base_url.clone(),
        }
    }
}

/// Canonical form of a tenant base URL: scheme, host and non-default port
/// from the parsed origin, plus the path without a trailing slash.
pub fn normalize_base_url(raw: &str) -> Result<String, TenantError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| TenantError::InvalidRequest(format!("invalid base URL {raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
        return Err(TenantError::InvalidRequest(format!(
            "base URL must be an absolute http(s) URL: {raw}"
        )));
    }
    Ok(format!(
        "{}{}",
        url.origin().ascii_serialization(),
        url.path().trim_end_matches('/')
    ))
}

/// Persistent tenant registry with a secondary index by base URL.
pub struct TenantRegistry {
    store: Arc<dyn RecordStore>,
}

impl TenantRegistry {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Insert a new record, claiming its base URL.
    pub fn insert(&self, record: &TenantRecord) -> Result<(), TenantError> {
        let url_key = normalize_base_url(&record.base_url)?;
        if !self
            .store
            .put_json_if_absent(Table::TenantsByUrl, &url_key, &record.id)?
        {
            return Err(TenantError::UrlConflict(url_key));
        }
        if let Err(e) = self
            .store
            .put_json(Table::Tenants, record.id.as_str(), record)
        {
            self.store.delete(Table::TenantsByUrl, &url_key)?;
            return Err(e.into());
        }
        Ok(())
    }

    /// Overwrite an existing record. The base URL never changes after insert.
    pub fn save(&self, record: &TenantRecord) -> Result<(), TenantError> {
        Ok(self
            .store
            .put_json(Table::Tenants, record.id.as_str(), record)?)
    }

    pub fn find(&self, id: &TenantId) -> Result<Option<TenantRecord>, TenantError> {
        Ok(self.store.get_json(Table::Tenants, id.as_str())?)
    }

    pub fn get(&self, id: &str) -> Result<TenantRecord, TenantError> {
        self.store
            .get_json(Table::Tenants, id)?
            .ok_or_else(|| TenantError::NotFound(id.to_string()))
    }

    /// Look a tenant up by any URL form of its base URL.
    pub fn find_by_url(&self, raw_url: &str) -> Result<Option<TenantRecord>, TenantError> {
        let url_key = normalize_base_url(raw_url)?;
        match self.store.get_json::<TenantId>(Table::TenantsByUrl, &url_key)? {
            Some(id) => self.find(&id),
            None => Ok(None),
        }
    }

    /// All tenants, oldest first.
    pub fn list(&self) -> Result<Vec<TenantRecord>, TenantError> {
        let mut records: Vec<TenantRecord> = self.store.scan_json(Table::Tenants, "")?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    /// Remove a tenant and its URL index entry. Offers, credentials and
    /// registry entries it owned stay addressable by id.
    pub fn delete(&self, id: &str) -> Result<TenantRecord, TenantError> {
        let record: TenantRecord = self
            .store
            .take_json(Table::Tenants, id)?
            .ok_or_else(|| TenantError::NotFound(id.to_string()))?;
        if let Ok(url_key) = normalize_base_url(&record.base_url) {
            self.store.delete(Table::TenantsByUrl, &url_key)?;
        }
        tracing::info!(tenant = %record.id, label = %record.label, "tenant deleted");
        Ok(record)
    }
}
