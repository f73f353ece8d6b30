//! Credence Credentials: schema and credential-definition registries, the
//! pre-authorized-code issuance engine with its issued-credential ledger, and
//! the presentation verification engine.

pub mod defaults;
pub mod definition;
pub mod error;
pub mod issuance;
pub mod ledger;
pub mod offer;
pub mod schema;
pub mod verification;

pub use definition::{CredentialDefinition, CredentialDefinitionRegistry, NewDefinition};
pub use error::CredentialError;
pub use issuance::{IssuanceEngine, OfferCreated, Redemption};
pub use ledger::{CredentialLedger, IssuedCredential};
pub use offer::{CredentialOffer, CredentialTemplate, OfferRequest, TemplateRequest};
pub use schema::{SchemaRecord, SchemaRegistry, ValidationIssue, ValidationReport};
pub use verification::{PresentationRequest, VerificationEngine, VerificationOutcome};
