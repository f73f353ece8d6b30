//! Credence Core: identifiers, lifecycle state machines, error taxonomy,
//! and the persistent record store abstraction shared by every other crate.

pub mod credential_state;
pub mod error;
pub mod store;
pub mod types;

pub use credential_state::{
    CredentialEvent, CredentialStateMachine, CredentialStatus, OfferEvent, OfferState,
    OfferStateMachine,
};
pub use error::{CoreError, ErrorKind, StoreError};
pub use store::{MemoryStore, RecordStore, RecordStoreExt, Table};
pub use types::{Namespace, TenantContext, TenantId, TenantType, WireFormat};
