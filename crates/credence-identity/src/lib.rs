//! Credence Identity: the key custodian capability and its local
//! implementation, DID documents, and bounded tenant sessions.

pub mod custodian;
pub mod did_key;
pub mod document;
pub mod error;
pub mod local;
pub mod session;

pub use custodian::{IdentityRef, KeyCustodian, ResolvedKey};
pub use document::{DidDocument, VerificationMethod};
pub use error::IdentityError;
pub use local::LocalKeyCustodian;
pub use session::{SessionPool, TenantSession};
