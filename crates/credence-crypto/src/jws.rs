//! Compact JWS (`header.payload.signature`) encoding.
//!
//! Signing is split from encoding so the signature can be produced by an
//! external key custodian: build the [`signing_input`], have it signed, then
//! [`assemble`] the token.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CryptoError;
use crate::keys::{Algorithm, KeyPair};

/// Protected JOSE header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsHeader {
    pub alg: Algorithm,
    pub typ: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// A parsed (not yet verified) compact JWS.
#[derive(Debug, Clone)]
pub struct DecodedJws {
    pub header: JwsHeader,
    pub claims: Value,
    /// `base64url(header) "." base64url(claims)`, the bytes the signature covers.
    pub signing_input: String,
    pub signature: Vec<u8>,
}

/// Encode header and claims into the JWS signing input.
pub fn signing_input(header: &JwsHeader, claims: &Value) -> Result<String, CryptoError> {
    let header_enc = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header)?);
    let claims_enc = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    Ok(format!("{header_enc}.{claims_enc}"))
}

/// Append the encoded signature to a signing input.
pub fn assemble(signing_input: &str, signature: &[u8]) -> String {
    format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature))
}

/// Encode and sign in one step with a local key pair.
pub fn encode(header: &JwsHeader, claims: &Value, key: &KeyPair) -> Result<String, CryptoError> {
    let input = signing_input(header, claims)?;
    let signature = key.sign(input.as_bytes());
    Ok(assemble(&input, &signature))
}

/// Split and decode a compact JWS. Does not verify the signature.
pub fn decode(token: &str) -> Result<DecodedJws, CryptoError> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    if parts.len() != 3 {
        return Err(CryptoError::MalformedJws(format!(
            "expected 3 segments, got {}",
            parts.len()
        )));
    }

    let header_raw = URL_SAFE_NO_PAD
        .decode(parts[0])
        .map_err(|e| CryptoError::MalformedJws(format!("header encoding: {e}")))?;
    let header: JwsHeader = serde_json::from_slice(&header_raw)
        .map_err(|e| CryptoError::MalformedJws(format!("header: {e}")))?;

    let claims_raw = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| CryptoError::MalformedJws(format!("payload encoding: {e}")))?;
    let claims: Value = serde_json::from_slice(&claims_raw)
        .map_err(|e| CryptoError::MalformedJws(format!("payload: {e}")))?;
    if !claims.is_object() {
        return Err(CryptoError::MalformedJws("payload is not a JSON object".into()));
    }

    let signature = URL_SAFE_NO_PAD
        .decode(parts[2])
        .map_err(|e| CryptoError::MalformedJws(format!("signature encoding: {e}")))?;

    Ok(DecodedJws {
        header,
        claims,
        signing_input: format!("{}.{}", parts[0], parts[1]),
        signature,
    })
}
