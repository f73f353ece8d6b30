//! `did:key` encoding: `did:key:z<base58btc(multicodec || public key)>`.

use credence_crypto::{KeyType, PublicKey};

use crate::error::IdentityError;

pub const DID_KEY_PREFIX: &str = "did:key:";

// Unsigned-varint multicodec prefixes.
const ED25519_PUB: [u8; 2] = [0xed, 0x01];
const P256_PUB: [u8; 2] = [0x80, 0x24];

/// Multibase (base58btc) encoding of a public key with its multicodec prefix.
pub fn multibase_encode(public_key: &PublicKey) -> String {
    let codec = match public_key.key_type() {
        KeyType::Ed25519 => ED25519_PUB,
        KeyType::P256 => P256_PUB,
    };
    let mut bytes = codec.to_vec();
    bytes.extend_from_slice(&public_key.to_bytes());
    format!("z{}", bs58::encode(bytes).into_string())
}

/// Inverse of [`multibase_encode`].
pub fn multibase_decode(value: &str) -> Result<PublicKey, IdentityError> {
    let encoded = value
        .strip_prefix('z')
        .ok_or_else(|| IdentityError::InvalidDid(format!("unsupported multibase: {value}")))?;
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| IdentityError::InvalidDid(format!("base58: {e}")))?;
    if bytes.len() < 2 {
        return Err(IdentityError::InvalidDid("key too short".into()));
    }

    let key_type = match [bytes[0], bytes[1]] {
        ED25519_PUB => KeyType::Ed25519,
        P256_PUB => KeyType::P256,
        other => {
            return Err(IdentityError::InvalidDid(format!(
                "unsupported multicodec {:02x}{:02x}",
                other[0], other[1]
            )))
        }
    };
    Ok(PublicKey::from_bytes(key_type, &bytes[2..])?)
}

/// Build the `did:key` identifier for a public key.
pub fn did_from_public_key(public_key: &PublicKey) -> String {
    format!("{DID_KEY_PREFIX}{}", multibase_encode(public_key))
}

/// Decode the public key embedded in a `did:key` identifier.
pub fn public_key_from_did(did: &str) -> Result<PublicKey, IdentityError> {
    let multibase = did
        .strip_prefix(DID_KEY_PREFIX)
        .ok_or_else(|| IdentityError::InvalidDid(did.to_string()))?;
    // Ignore any DID URL fragment.
    let multibase = multibase.split('#').next().unwrap_or(multibase);
    multibase_decode(multibase)
}

/// Verification method id for a `did:key` (`did:key:z..#z..`).
pub fn key_ref_for(did: &str) -> String {
    let fragment = did.strip_prefix(DID_KEY_PREFIX).unwrap_or(did);
    format!("{did}#{fragment}")
}
