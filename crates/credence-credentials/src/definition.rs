use std::sync::Arc;

use chrono::{DateTime, Utc};
use credence_core::{RecordStore, RecordStoreExt, Table, TenantId, WireFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CredentialError;
use crate::schema::SchemaRegistry;

/// A named, versioned binding of schema, issuer, claim template and wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDefinition {
    pub definition_id: String,
    pub tenant_id: TenantId,
    pub name: String,
    pub version: String,
    pub schema_id: String,
    pub issuer_did: String,
    pub credential_type: Vec<String>,
    pub claim_template: Value,
    pub wire_format: WireFormat,
    pub created_at: DateTime<Utc>,
}

/// Registration input.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDefinition {
    pub name: String,
    pub version: String,
    pub schema_id: String,
    pub issuer_did: String,
    #[serde(default)]
    pub credential_type: Vec<String>,
    #[serde(default)]
    pub claim_template: Value,
    #[serde(default)]
    pub wire_format: WireFormat,
}

type Strategy = fn(&[CredentialDefinition], &str) -> Option<CredentialDefinition>;

/// Tolerant lookup, tried in order. Candidates are sorted newest first so
/// each strategy returns the most recently created match.
const RESOLUTION_CHAIN: [(&str, Strategy); 4] = [
    ("exact_id", by_exact_id),
    ("stripped_id", by_stripped_id),
    ("type_membership", by_type_membership),
    ("name", by_name),
];

fn by_exact_id(candidates: &[CredentialDefinition], reference: &str) -> Option<CredentialDefinition> {
    candidates
        .iter()
        .find(|d| d.definition_id == reference)
        .cloned()
}

fn by_stripped_id(
    candidates: &[CredentialDefinition],
    reference: &str,
) -> Option<CredentialDefinition> {
    WireFormat::strip_suffix(reference).and_then(|stripped| by_exact_id(candidates, stripped))
}

fn by_type_membership(
    candidates: &[CredentialDefinition],
    reference: &str,
) -> Option<CredentialDefinition> {
    let key = WireFormat::strip_suffix(reference).unwrap_or(reference);
    candidates
        .iter()
        .find(|d| d.credential_type.iter().any(|t| t == key))
        .cloned()
}

fn by_name(candidates: &[CredentialDefinition], reference: &str) -> Option<CredentialDefinition> {
    let key = WireFormat::strip_suffix(reference).unwrap_or(reference);
    candidates.iter().find(|d| d.name == key).cloned()
}

fn record_key(tenant_id: &TenantId, definition_id: &str) -> String {
    format!("{tenant_id}/{definition_id}")
}

fn index_key(tenant_id: &TenantId, issuer_did: &str, name: &str, version: &str) -> String {
    format!("{tenant_id}\u{1f}{issuer_did}\u{1f}{name}\u{1f}{version}")
}

/// Tenant-scoped registry of credential definitions.
pub struct CredentialDefinitionRegistry {
    store: Arc<dyn RecordStore>,
    schemas: Arc<SchemaRegistry>,
}

impl CredentialDefinitionRegistry {
    pub fn new(store: Arc<dyn RecordStore>, schemas: Arc<SchemaRegistry>) -> Self {
        Self { store, schemas }
    }

    pub fn register(
        &self,
        tenant_id: &TenantId,
        new: NewDefinition,
    ) -> Result<CredentialDefinition, CredentialError> {
        if new.name.trim().is_empty() || new.version.trim().is_empty() {
            return Err(CredentialError::InvalidDefinition(
                "name and version are required".into(),
            ));
        }
        if new.issuer_did.trim().is_empty() {
            return Err(CredentialError::InvalidDefinition("issuerDid is required".into()));
        }
        let claim_template = match new.claim_template {
            Value::Null => Value::Object(Default::default()),
            Value::Object(map) => Value::Object(map),
            _ => {
                return Err(CredentialError::InvalidDefinition(
                    "claimTemplate must be an object".into(),
                ))
            }
        };
        let credential_type = if new.credential_type.is_empty() {
            vec![new.name.clone()]
        } else {
            new.credential_type
        };

        let scope = credence_core::Namespace::Tenant(tenant_id.clone());
        match self.schemas.get(&scope, &new.schema_id) {
            Ok(_) => {}
            Err(CredentialError::SchemaNotFound(id)) => {
                return Err(CredentialError::UnknownSchema(id))
            }
            Err(e) => return Err(e),
        }

        let definition_id = Uuid::now_v7().to_string();
        let key = index_key(tenant_id, &new.issuer_did, &new.name, &new.version);
        if !self
            .store
            .put_json_if_absent(Table::DefinitionIndex, &key, &definition_id)?
        {
            return Err(CredentialError::DefinitionConflict {
                name: new.name,
                version: new.version,
                issuer_did: new.issuer_did,
            });
        }

        let definition = CredentialDefinition {
            definition_id: definition_id.clone(),
            tenant_id: tenant_id.clone(),
            name: new.name,
            version: new.version,
            schema_id: new.schema_id,
            issuer_did: new.issuer_did,
            credential_type,
            claim_template,
            wire_format: new.wire_format,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.put_json(
            Table::Definitions,
            &record_key(tenant_id, &definition_id),
            &definition,
        ) {
            self.store.delete(Table::DefinitionIndex, &key)?;
            return Err(e.into());
        }

        tracing::info!(
            tenant = %tenant_id,
            definition_id = %definition_id,
            name = %definition.name,
            version = %definition.version,
            issuer = %definition.issuer_did,
            "credential definition registered"
        );
        Ok(definition)
    }

    /// Resolve a definition by opaque id or by type/name with an optional
    /// wire-format suffix.
    pub fn get(
        &self,
        tenant_id: &TenantId,
        reference: &str,
    ) -> Result<Option<CredentialDefinition>, CredentialError> {
        // Fast path: a plain id needs no scan.
        if let Some(definition) = self
            .store
            .get_json::<CredentialDefinition>(Table::Definitions, &record_key(tenant_id, reference))?
        {
            return Ok(Some(definition));
        }

        let mut candidates = self.list(tenant_id)?;
        candidates.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.definition_id.cmp(&a.definition_id))
        });

        for (strategy, resolve) in RESOLUTION_CHAIN {
            if let Some(definition) = resolve(&candidates, reference) {
                tracing::debug!(
                    tenant = %tenant_id,
                    reference = reference,
                    strategy = strategy,
                    definition_id = %definition.definition_id,
                    "definition resolved"
                );
                return Ok(Some(definition));
            }
        }
        Ok(None)
    }

    /// Like [`Self::get`] but a miss is an error.
    pub fn resolve(
        &self,
        tenant_id: &TenantId,
        reference: &str,
    ) -> Result<CredentialDefinition, CredentialError> {
        self.get(tenant_id, reference)?
            .ok_or_else(|| CredentialError::DefinitionNotFound(reference.to_string()))
    }

    /// All definitions of a tenant, oldest first.
    pub fn list(&self, tenant_id: &TenantId) -> Result<Vec<CredentialDefinition>, CredentialError> {
        let mut definitions: Vec<CredentialDefinition> = self
            .store
            .scan_json(Table::Definitions, &format!("{tenant_id}/"))?;
        definitions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(definitions)
    }
}
