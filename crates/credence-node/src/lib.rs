//! Credence node: a multi-tenant verifiable credential service.
//!
//! Wires the schema and definition registries, key custody and the
//! issuance and verification engines behind one authenticated HTTP API.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metadata;
pub mod node;
pub mod provisioner;
pub mod state;
pub mod storage;
pub mod tenants;

pub use config::CredenceConfig;
pub use node::CredenceNode;
pub use state::NodeState;
