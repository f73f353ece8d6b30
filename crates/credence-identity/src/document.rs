use chrono::{DateTime, Utc};
use credence_crypto::{KeyType, PublicKey};
use serde::{Deserialize, Serialize};

use crate::did_key;
use crate::error::IdentityError;

/// A verification method within a DID Document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    /// Verification method identifier, also used as the custodian key reference.
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub controller: String,
    pub public_key_multibase: String,
}

impl VerificationMethod {
    pub fn new(id: String, controller: String, public_key: &PublicKey) -> Self {
        let method_type = match public_key.key_type() {
            KeyType::Ed25519 => "Ed25519VerificationKey2020",
            KeyType::P256 => "EcdsaSecp256r1VerificationKey2019",
        };
        Self {
            id,
            method_type: method_type.to_string(),
            controller,
            public_key_multibase: did_key::multibase_encode(public_key),
        }
    }

    pub fn public_key(&self) -> Result<PublicKey, IdentityError> {
        did_key::multibase_decode(&self.public_key_multibase)
    }
}

/// Minimal W3C DID Document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    pub id: String,
    pub verification_method: Vec<VerificationMethod>,
    /// Verification method ids usable for signing credentials.
    pub assertion_method: Vec<String>,
    pub created: DateTime<Utc>,
}

impl DidDocument {
    /// Create a document with a single assertion key.
    pub fn new(did: &str, key_ref: &str, public_key: &PublicKey) -> Self {
        let vm = VerificationMethod::new(key_ref.to_string(), did.to_string(), public_key);
        Self {
            id: did.to_string(),
            assertion_method: vec![vm.id.clone()],
            verification_method: vec![vm],
            created: Utc::now(),
        }
    }

    /// The key used to assert credentials (first assertion method).
    pub fn assertion_key(&self) -> Option<&VerificationMethod> {
        let id = self.assertion_method.first()?;
        self.verification_method.iter().find(|vm| &vm.id == id)
    }
}
