use std::sync::Arc;

use chrono::{DateTime, Utc};
use credence_core::{Namespace, RecordStore, RecordStoreExt, Table};
use dashmap::DashMap;
use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CredentialError;

/// A registered JSON Schema. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaRecord {
    pub schema_id: String,
    /// Owning tenant id, or `"global"`.
    pub tenant_id: String,
    pub name: String,
    pub version: String,
    pub json_schema: Value,
    /// BLAKE3 digest of the canonical schema bytes.
    pub digest: String,
    pub created_at: DateTime<Utc>,
}

impl SchemaRecord {
    pub fn is_global(&self) -> bool {
        self.tenant_id == Namespace::GLOBAL_KEY
    }
}

/// One validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// JSON pointer to the offending value ("" for the root).
    pub path: String,
    pub message: String,
}

/// Outcome of validating a payload. Validation never errors; problems land here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    fn failed(path: &str, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            errors: vec![ValidationIssue {
                path: path.to_string(),
                message: message.into(),
            }],
        }
    }
}

/// Registry of JSON Schemas, namespaced per tenant plus a shared global namespace.
pub struct SchemaRegistry {
    store: Arc<dyn RecordStore>,
    /// Compiled validators by schema id. Schemas are immutable so entries never go stale.
    validators: DashMap<String, Arc<Validator>>,
}

fn index_key(namespace: &str, name: &str, version: &str) -> String {
    format!("{namespace}\u{1f}{name}\u{1f}{version}")
}

impl SchemaRegistry {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            validators: DashMap::new(),
        }
    }

    /// Compile and register a schema under `namespace`.
    pub fn register(
        &self,
        namespace: &Namespace,
        name: &str,
        version: &str,
        json_schema: Value,
    ) -> Result<SchemaRecord, CredentialError> {
        if name.trim().is_empty() || version.trim().is_empty() {
            return Err(CredentialError::InvalidSchema(
                "name and version are required".into(),
            ));
        }
        let validator = jsonschema::validator_for(&json_schema)
            .map_err(|e| CredentialError::InvalidSchema(e.to_string()))?;

        let schema_id = Uuid::now_v7().to_string();
        let key = index_key(namespace.key(), name, version);
        if !self.store.put_json_if_absent(Table::SchemaIndex, &key, &schema_id)? {
            return Err(CredentialError::SchemaConflict {
                name: name.to_string(),
                version: version.to_string(),
            });
        }

        let record = SchemaRecord {
            schema_id: schema_id.clone(),
            tenant_id: namespace.key().to_string(),
            name: name.to_string(),
            version: version.to_string(),
            digest: credence_crypto::digest_hex(&serde_json::to_vec(&json_schema)?),
            json_schema,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.put_json(Table::Schemas, &schema_id, &record) {
            self.store.delete(Table::SchemaIndex, &key)?;
            return Err(e.into());
        }
        self.validators.insert(schema_id.clone(), Arc::new(validator));

        tracing::info!(
            schema_id = %schema_id,
            namespace = %namespace,
            name = name,
            version = version,
            "schema registered"
        );
        Ok(record)
    }

    /// Look a schema up by id regardless of namespace.
    pub fn find(&self, schema_id: &str) -> Result<Option<SchemaRecord>, CredentialError> {
        Ok(self.store.get_json(Table::Schemas, schema_id)?)
    }

    /// Get a schema visible from `scope`: the scope's own schemas plus global ones.
    pub fn get(&self, scope: &Namespace, schema_id: &str) -> Result<SchemaRecord, CredentialError> {
        match self.find(schema_id)? {
            Some(record) if record.is_global() || record.tenant_id == scope.key() => Ok(record),
            _ => Err(CredentialError::SchemaNotFound(schema_id.to_string())),
        }
    }

    /// Find by (namespace, name, version).
    pub fn get_by_name(
        &self,
        namespace: &Namespace,
        name: &str,
        version: &str,
    ) -> Result<Option<SchemaRecord>, CredentialError> {
        let key = index_key(namespace.key(), name, version);
        match self.store.get_json::<String>(Table::SchemaIndex, &key)? {
            Some(schema_id) => self.find(&schema_id),
            None => Ok(None),
        }
    }

    /// Schemas registered in exactly `namespace`.
    pub fn list(&self, namespace: &Namespace) -> Result<Vec<SchemaRecord>, CredentialError> {
        let prefix = format!("{}\u{1f}", namespace.key());
        let mut records = Vec::new();
        for (_, raw_id) in self.store.scan_prefix(Table::SchemaIndex, &prefix)? {
            let schema_id: String = serde_json::from_slice(&raw_id)?;
            if let Some(record) = self.find(&schema_id)? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    /// Validate `payload` against a schema. Fails closed: an unknown or
    /// unreadable schema yields `valid = false`, never an error.
    pub fn validate(&self, schema_id: &str, payload: &Value) -> ValidationReport {
        let validator = match self.validator(schema_id) {
            Ok(Some(validator)) => validator,
            Ok(None) => {
                return ValidationReport::failed("", format!("schema {schema_id} not found"))
            }
            Err(e) => {
                tracing::warn!(schema_id = schema_id, error = %e, "schema unavailable for validation");
                return ValidationReport::failed("", format!("schema {schema_id} unavailable"));
            }
        };

        let errors: Vec<ValidationIssue> = validator
            .iter_errors(payload)
            .map(|e| ValidationIssue {
                path: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect();

        if errors.is_empty() {
            ValidationReport::ok()
        } else {
            ValidationReport {
                valid: false,
                errors,
            }
        }
    }

    fn validator(&self, schema_id: &str) -> Result<Option<Arc<Validator>>, CredentialError> {
        if let Some(cached) = self.validators.get(schema_id) {
            return Ok(Some(Arc::clone(cached.value())));
        }
        let Some(record) = self.find(schema_id)? else {
            return Ok(None);
        };
        let validator = Arc::new(
            jsonschema::validator_for(&record.json_schema)
                .map_err(|e| CredentialError::InvalidSchema(e.to_string()))?,
        );
        self.validators
            .insert(schema_id.to_string(), Arc::clone(&validator));
        Ok(Some(validator))
    }
}
