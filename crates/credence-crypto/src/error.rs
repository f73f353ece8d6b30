/// Cryptographic operation errors.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),

    #[error("malformed JWS: {0}")]
    MalformedJws(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
