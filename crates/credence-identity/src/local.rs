use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use credence_core::{RecordStore, RecordStoreExt, Table};
use credence_crypto::{KeyPair, KeyType};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::custodian::{IdentityRef, KeyCustodian, ResolvedKey};
use crate::did_key::{self, DID_KEY_PREFIX};
use crate::document::DidDocument;
use crate::error::IdentityError;

/// Secret key material as persisted in the `Keys` table.
#[derive(Clone, Serialize, Deserialize)]
struct StoredKey {
    key_ref: String,
    did: String,
    key_type: KeyType,
    /// base64url secret bytes.
    secret: String,
    created_at: DateTime<Utc>,
}

impl fmt::Debug for StoredKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredKey")
            .field("key_ref", &self.key_ref)
            .field("did", &self.did)
            .field("key_type", &self.key_type)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Key custodian that keeps keys and DID documents in the record store.
///
/// `did:key` identities resolve straight from the identifier; imported
/// alias DIDs resolve from their persisted document. Nothing is cached in
/// process memory, so resolution survives restarts.
pub struct LocalKeyCustodian {
    store: Arc<dyn RecordStore>,
}

impl LocalKeyCustodian {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    fn persist(&self, did: &str, key_ref: &str, kp: &KeyPair) -> Result<(), IdentityError> {
        let document = DidDocument::new(did, key_ref, &kp.public_key());
        if !self.store.put_json_if_absent(Table::Dids, did, &document)? {
            return Err(IdentityError::DuplicateDid(did.to_string()));
        }

        let stored = StoredKey {
            key_ref: key_ref.to_string(),
            did: did.to_string(),
            key_type: kp.key_type(),
            secret: URL_SAFE_NO_PAD.encode(kp.secret_bytes().as_slice()),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.put_json(Table::Keys, key_ref, &stored) {
            self.store.delete(Table::Dids, did)?;
            return Err(e.into());
        }
        Ok(())
    }

    fn load_key(&self, key_ref: &str) -> Result<KeyPair, IdentityError> {
        let stored: StoredKey = self
            .store
            .get_json(Table::Keys, key_ref)?
            .ok_or_else(|| IdentityError::KeyNotFound(key_ref.to_string()))?;
        let secret = Zeroizing::new(
            URL_SAFE_NO_PAD
                .decode(&stored.secret)
                .map_err(|e| IdentityError::Signing(format!("corrupt key {key_ref}: {e}")))?,
        );
        Ok(KeyPair::from_secret_bytes(stored.key_type, &secret)?)
    }
}

fn validate_did(did: &str) -> Result<(), IdentityError> {
    let mut parts = did.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("did"), Some(method), Some(id))
            if !method.is_empty()
                && method.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
                && !id.is_empty()
                && !id.contains('#') =>
        {
            Ok(())
        }
        _ => Err(IdentityError::InvalidDid(did.to_string())),
    }
}

#[async_trait]
impl KeyCustodian for LocalKeyCustodian {
    async fn create_identity(&self, key_type: KeyType) -> Result<IdentityRef, IdentityError> {
        let kp = KeyPair::generate(key_type);
        let did = did_key::did_from_public_key(&kp.public_key());
        let key_ref = did_key::key_ref_for(&did);
        self.persist(&did, &key_ref, &kp)?;

        tracing::info!(did = %did, key_type = %key_type, "identity created");
        Ok(IdentityRef { did, key_ref })
    }

    async fn import_identity(
        &self,
        did: &str,
        key_type: KeyType,
    ) -> Result<IdentityRef, IdentityError> {
        validate_did(did)?;
        if did.starts_with(DID_KEY_PREFIX) {
            // A did:key is bound to its key; it cannot alias a fresh one.
            return Err(IdentityError::InvalidDid(did.to_string()));
        }

        let kp = KeyPair::generate(key_type);
        let key_ref = format!("{did}#key-{}", kp.public_key().fingerprint());
        self.persist(did, &key_ref, &kp)?;

        tracing::info!(did = %did, key_type = %key_type, "identity imported");
        Ok(IdentityRef {
            did: did.to_string(),
            key_ref,
        })
    }

    async fn resolve(&self, did: &str) -> Result<ResolvedKey, IdentityError> {
        if let Some(document) = self.store.get_json::<DidDocument>(Table::Dids, did)? {
            let vm = document
                .assertion_key()
                .ok_or_else(|| IdentityError::DidNotFound(format!("{did} has no assertion key")))?;
            return Ok(ResolvedKey {
                did: did.to_string(),
                key_ref: vm.id.clone(),
                public_key: vm.public_key()?,
            });
        }

        if did.starts_with(DID_KEY_PREFIX) {
            tracing::debug!(did = did, "no stored document, decoding did:key");
            let public_key = did_key::public_key_from_did(did)?;
            return Ok(ResolvedKey {
                did: did.to_string(),
                key_ref: did_key::key_ref_for(did),
                public_key,
            });
        }

        Err(IdentityError::DidNotFound(did.to_string()))
    }

    async fn forget(&self, did: &str) -> Result<bool, IdentityError> {
        let Some(document) = self.store.get_json::<DidDocument>(Table::Dids, did)? else {
            return Ok(false);
        };
        for vm in &document.verification_method {
            self.store.delete(Table::Keys, &vm.id)?;
        }
        self.store.delete(Table::Dids, did)?;

        tracing::info!(did = %did, "identity forgotten");
        Ok(true)
    }

    async fn sign(&self, key_ref: &str, message: &[u8]) -> Result<Vec<u8>, IdentityError> {
        let kp = self.load_key(key_ref)?;
        Ok(kp.sign(message))
    }
}
