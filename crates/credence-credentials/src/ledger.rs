//! Ledger of issued credentials. Records are append-only: revocation flips a
//! flag and stamps `revokedAt`; nothing is ever deleted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use credence_core::{
    CredentialEvent, CredentialStateMachine, CredentialStatus, RecordStore, RecordStoreExt, Table,
    TenantId, WireFormat,
};
use serde::{Deserialize, Serialize};

use crate::error::CredentialError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCredential {
    pub credential_id: String,
    pub tenant_id: TenantId,
    /// The signed credential as delivered to the holder (compact JWS).
    pub credential: String,
    pub subject_id: String,
    pub issuer: String,
    pub schema_id: Option<String>,
    pub definition_id: Option<String>,
    pub types: Vec<String>,
    pub format: WireFormat,
    pub created_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl IssuedCredential {
    pub fn status(&self) -> CredentialStatus {
        if self.revoked {
            CredentialStatus::Revoked
        } else {
            CredentialStatus::Active
        }
    }
}

fn tenant_index_key(tenant_id: &TenantId, credential_id: &str) -> String {
    format!("t/{tenant_id}/{credential_id}")
}

fn subject_index_key(tenant_id: &TenantId, subject_id: &str, credential_id: &str) -> String {
    format!("s/{tenant_id}/{subject_id}/{credential_id}")
}

pub struct CredentialLedger {
    store: Arc<dyn RecordStore>,
}

impl CredentialLedger {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Append a freshly issued credential and its (tenant) and (tenant, subject) index entries.
    pub fn record(&self, credential: &IssuedCredential) -> Result<(), CredentialError> {
        let id = &credential.credential_id;
        if !self.store.put_json_if_absent(Table::Credentials, id, credential)? {
            return Err(CredentialError::Signing(format!("duplicate credential id {id}")));
        }
        self.store.put_json(
            Table::CredentialIndex,
            &tenant_index_key(&credential.tenant_id, id),
            id,
        )?;
        self.store.put_json(
            Table::CredentialIndex,
            &subject_index_key(&credential.tenant_id, &credential.subject_id, id),
            id,
        )?;
        Ok(())
    }

    /// Unscoped lookup by id, used when cross-referencing a presented credential.
    pub fn find(&self, credential_id: &str) -> Result<Option<IssuedCredential>, CredentialError> {
        Ok(self.store.get_json(Table::Credentials, credential_id)?)
    }

    /// Lookup restricted to credentials issued by `tenant_id`.
    pub fn get(
        &self,
        tenant_id: &TenantId,
        credential_id: &str,
    ) -> Result<IssuedCredential, CredentialError> {
        match self.find(credential_id)? {
            Some(credential) if &credential.tenant_id == tenant_id => Ok(credential),
            _ => Err(CredentialError::CredentialNotFound(credential_id.to_string())),
        }
    }

    /// Credentials of a tenant, optionally filtered by subject and issuer, oldest first.
    pub fn list(
        &self,
        tenant_id: &TenantId,
        subject: Option<&str>,
        issuer: Option<&str>,
    ) -> Result<Vec<IssuedCredential>, CredentialError> {
        let prefix = match subject {
            Some(subject) => format!("s/{tenant_id}/{subject}/"),
            None => format!("t/{tenant_id}/"),
        };
        let mut credentials = Vec::new();
        for (_, raw_id) in self.store.scan_prefix(Table::CredentialIndex, &prefix)? {
            let id: String = serde_json::from_slice(&raw_id)?;
            let Some(credential) = self.find(&id)? else {
                continue;
            };
            // A subject containing '/' could alias a longer prefix.
            if subject.is_some_and(|s| credential.subject_id != s) {
                continue;
            }
            if issuer.is_some_and(|i| credential.issuer != i) {
                continue;
            }
            credentials.push(credential);
        }
        credentials.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(credentials)
    }

    /// Revoke a credential. Idempotent: revoking again returns the stored
    /// record unchanged, including the original `revokedAt`.
    pub fn revoke(
        &self,
        tenant_id: &TenantId,
        credential_id: &str,
    ) -> Result<IssuedCredential, CredentialError> {
        let current = self.get(tenant_id, credential_id)?;
        if current.status().is_final() {
            tracing::debug!(credential_id = credential_id, "credential already revoked");
            return Ok(current);
        }

        let now = Utc::now();
        let updated = self
            .store
            .update_json(Table::Credentials, credential_id, |record: &mut IssuedCredential| {
                // Re-checked under the store's per-record atomicity.
                if let Ok(CredentialStatus::Revoked) =
                    CredentialStateMachine::transition(record.status(), CredentialEvent::Revoke)
                {
                    record.revoked = true;
                    record.revoked_at = Some(now);
                }
            })?
            .ok_or_else(|| CredentialError::CredentialNotFound(credential_id.to_string()))?;

        tracing::info!(
            tenant = %tenant_id,
            credential_id = credential_id,
            revoked_at = ?updated.revoked_at,
            "credential revoked"
        );
        Ok(updated)
    }
}
