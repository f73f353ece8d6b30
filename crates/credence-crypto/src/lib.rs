pub mod error;
pub mod hashing;
pub mod jws;
pub mod keys;

pub use error::CryptoError;
pub use hashing::digest_hex;
pub use jws::{DecodedJws, JwsHeader};
pub use keys::{Algorithm, KeyPair, KeyType, PublicKey};
