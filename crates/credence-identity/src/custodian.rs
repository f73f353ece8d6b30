use async_trait::async_trait;
use credence_crypto::{Algorithm, KeyType, PublicKey};
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// Handle to an identity held by a custodian.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRef {
    pub did: String,
    /// Opaque reference the custodian signs with. Also the JWS `kid`.
    pub key_ref: String,
}

/// Current verification material for a DID.
#[derive(Debug, Clone)]
pub struct ResolvedKey {
    pub did: String,
    pub key_ref: String,
    pub public_key: PublicKey,
}

impl ResolvedKey {
    pub fn key_type(&self) -> KeyType {
        self.public_key.key_type()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.key_type().algorithm()
    }
}

/// Key custody capability: creates identities, resolves DIDs, signs bytes.
///
/// Resolution must not depend on per-process state from the call that
/// created the identity, so a credential can be signed long after its offer
/// was created, across restarts.
#[async_trait]
pub trait KeyCustodian: Send + Sync {
    /// Create a fresh identity with a new key pair.
    async fn create_identity(&self, key_type: KeyType) -> Result<IdentityRef, IdentityError>;

    /// Register a caller-chosen DID (e.g. `did:web:...`) backed by a new key pair.
    async fn import_identity(&self, did: &str, key_type: KeyType)
        -> Result<IdentityRef, IdentityError>;

    async fn resolve(&self, did: &str) -> Result<ResolvedKey, IdentityError>;

    /// Drop the document and key material held for `did`. Returns whether
    /// anything was removed.
    async fn forget(&self, did: &str) -> Result<bool, IdentityError>;

    async fn sign(&self, key_ref: &str, message: &[u8]) -> Result<Vec<u8>, IdentityError>;

    /// Resolve `did` and verify `signature` over `message` with its assertion key.
    async fn verify(&self, did: &str, message: &[u8], signature: &[u8]) -> Result<(), IdentityError> {
        let resolved = self.resolve(did).await?;
        resolved.public_key.verify(message, signature)?;
        Ok(())
    }
}
