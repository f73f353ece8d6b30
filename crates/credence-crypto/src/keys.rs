use std::fmt;

use ed25519_dalek::Signer as _;
use ed25519_dalek::Verifier as _;
use p256::ecdsa::signature::Signer as _;
use p256::ecdsa::signature::Verifier as _;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::error::CryptoError;
use crate::hashing::digest_hex;

/// Supported key types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum KeyType {
    #[default]
    Ed25519,
    P256,
}

impl KeyType {
    /// Signing algorithm for keys of this type. Not caller-selectable.
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Ed25519 => Algorithm::EdDSA,
            Self::P256 => Algorithm::ES256,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ed25519 => write!(f, "Ed25519"),
            Self::P256 => write!(f, "P-256"),
        }
    }
}

/// JOSE signature algorithm identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    EdDSA,
    ES256,
}

impl Algorithm {
    pub fn key_type(&self) -> KeyType {
        match self {
            Self::EdDSA => KeyType::Ed25519,
            Self::ES256 => KeyType::P256,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EdDSA => write!(f, "EdDSA"),
            Self::ES256 => write!(f, "ES256"),
        }
    }
}

/// Signing key pair. Secret material is zeroized on drop by the underlying crates.
pub enum KeyPair {
    Ed25519(ed25519_dalek::SigningKey),
    P256(p256::ecdsa::SigningKey),
}

impl KeyPair {
    /// Generate a new random key pair using OS-provided entropy.
    pub fn generate(key_type: KeyType) -> Self {
        match key_type {
            KeyType::Ed25519 => Self::Ed25519(ed25519_dalek::SigningKey::generate(&mut OsRng)),
            KeyType::P256 => Self::P256(p256::ecdsa::SigningKey::random(&mut OsRng)),
        }
    }

    /// Restore a key pair from its 32-byte secret scalar/seed.
    pub fn from_secret_bytes(key_type: KeyType, bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        match key_type {
            KeyType::Ed25519 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(bytes);
                let key = ed25519_dalek::SigningKey::from_bytes(&seed);
                seed.zeroize();
                Ok(Self::Ed25519(key))
            }
            KeyType::P256 => p256::ecdsa::SigningKey::from_slice(bytes)
                .map(Self::P256)
                .map_err(|e| CryptoError::InvalidKey(e.to_string())),
        }
    }

    /// Raw secret bytes. Prefer [`KeyPair::sign`] over handling these directly.
    pub fn secret_bytes(&self) -> Zeroizing<Vec<u8>> {
        match self {
            Self::Ed25519(key) => Zeroizing::new(key.to_bytes().to_vec()),
            Self::P256(key) => Zeroizing::new(key.to_bytes().to_vec()),
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Ed25519(_) => KeyType::Ed25519,
            Self::P256(_) => KeyType::P256,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.key_type().algorithm()
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            Self::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
            Self::P256(key) => PublicKey::P256(*key.verifying_key()),
        }
    }

    /// Sign `message`. ES256 signatures are the 64-byte `r || s` form JWS expects.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            Self::Ed25519(key) => key.sign(message).to_bytes().to_vec(),
            Self::P256(key) => {
                let signature: p256::ecdsa::Signature = key.sign(message);
                signature.to_bytes().to_vec()
            }
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_type", &self.key_type())
            .field("public_key", &self.public_key())
            .finish()
    }
}

/// Public verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Ed25519(ed25519_dalek::VerifyingKey),
    P256(p256::ecdsa::VerifyingKey),
}

impl PublicKey {
    /// Parse raw public key bytes: 32 bytes for Ed25519, SEC1 (compressed or
    /// uncompressed) for P-256.
    pub fn from_bytes(key_type: KeyType, bytes: &[u8]) -> Result<Self, CryptoError> {
        match key_type {
            KeyType::Ed25519 => {
                let raw: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                    expected: 32,
                    actual: bytes.len(),
                })?;
                ed25519_dalek::VerifyingKey::from_bytes(&raw)
                    .map(Self::Ed25519)
                    .map_err(|e| CryptoError::InvalidKey(e.to_string()))
            }
            KeyType::P256 => p256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
                .map(Self::P256)
                .map_err(|e| CryptoError::InvalidKey(e.to_string())),
        }
    }

    /// Raw bytes: 32 bytes for Ed25519, 33-byte compressed SEC1 for P-256.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Ed25519(key) => key.to_bytes().to_vec(),
            Self::P256(key) => key.to_encoded_point(true).as_bytes().to_vec(),
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Ed25519(_) => KeyType::Ed25519,
            Self::P256(_) => KeyType::P256,
        }
    }

    /// Short stable identifier for the key, used in key references.
    pub fn fingerprint(&self) -> String {
        digest_hex(&self.to_bytes())[..16].to_string()
    }

    /// Verify `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        match self {
            Self::Ed25519(key) => {
                let sig = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
                key.verify(message, &sig)
                    .map_err(|_| CryptoError::SignatureVerificationFailed)
            }
            Self::P256(key) => {
                let sig = p256::ecdsa::Signature::from_slice(signature)
                    .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
                key.verify(message, &sig)
                    .map_err(|_| CryptoError::SignatureVerificationFailed)
            }
        }
    }
}
