//! Shared node state accessible from HTTP handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use credence_core::RecordStore;
use credence_credentials::{
    CredentialDefinitionRegistry, CredentialLedger, IssuanceEngine, SchemaRegistry,
    VerificationEngine,
};
use credence_identity::{KeyCustodian, LocalKeyCustodian, SessionPool};

use crate::auth::{load_or_create_installation_secret, AuthGateway};
use crate::config::CredenceConfig;
use crate::metadata::MetadataResolver;
use crate::provisioner::Provisioner;
use crate::tenants::TenantRegistry;

/// Every component of a running node, wired over one record store.
pub struct NodeState {
    pub config: CredenceConfig,
    pub public_url: String,
    pub store: Arc<dyn RecordStore>,
    pub custodian: Arc<dyn KeyCustodian>,
    pub sessions: Arc<SessionPool>,
    pub schemas: Arc<SchemaRegistry>,
    pub definitions: Arc<CredentialDefinitionRegistry>,
    pub issuance: Arc<IssuanceEngine>,
    pub verification: Arc<VerificationEngine>,
    pub tenants: Arc<TenantRegistry>,
    pub provisioner: Arc<Provisioner>,
    pub metadata: Arc<MetadataResolver>,
    pub gateway: Arc<AuthGateway>,
    pub start_time: Instant,
}

impl NodeState {
    pub fn new(config: CredenceConfig, store: Arc<dyn RecordStore>) -> Self {
        let public_url = config.public_url();

        let custodian: Arc<dyn KeyCustodian> = Arc::new(LocalKeyCustodian::new(store.clone()));
        let sessions = Arc::new(SessionPool::new(
            config.sessions.max_sessions,
            Duration::from_millis(config.sessions.acquire_timeout_ms),
        ));
        let schemas = Arc::new(SchemaRegistry::new(store.clone()));
        let definitions = Arc::new(CredentialDefinitionRegistry::new(
            store.clone(),
            schemas.clone(),
        ));
        let ledger = Arc::new(CredentialLedger::new(store.clone()));
        let issuance = Arc::new(
            IssuanceEngine::new(
                store.clone(),
                schemas.clone(),
                definitions.clone(),
                ledger.clone(),
                custodian.clone(),
            )
            .with_default_ttl(config.issuance.offer_ttl_secs),
        );
        let verification = Arc::new(VerificationEngine::new(
            store.clone(),
            schemas.clone(),
            definitions.clone(),
            ledger,
            custodian.clone(),
            public_url.clone(),
        ));

        let tenants = Arc::new(TenantRegistry::new(store.clone()));
        let provisioner = Arc::new(
            Provisioner::new(
                tenants.clone(),
                custodian.clone(),
                schemas.clone(),
                definitions.clone(),
                sessions.clone(),
                public_url.clone(),
            )
            .with_default_seeding(config.provisioning.seed_default_definitions),
        );
        let metadata = Arc::new(MetadataResolver::new(tenants.clone()));

        // Without a secret the node still serves API-key and public routes;
        // token minting and validation fail as internal errors.
        let secret = match load_or_create_installation_secret(store.as_ref()) {
            Ok(secret) => Some(secret),
            Err(e) => {
                tracing::error!(error = %e, "installation secret unavailable; bearer tokens disabled");
                None
            }
        };
        let gateway = Arc::new(AuthGateway::new(&config.auth, secret, tenants.clone()));

        Self {
            config,
            public_url,
            store,
            custodian,
            sessions,
            schemas,
            definitions,
            issuance,
            verification,
            tenants,
            provisioner,
            metadata,
            gateway,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
