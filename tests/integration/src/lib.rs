//! Shared fixtures for the Credence integration tests.

use std::sync::Arc;

use credence_core::{MemoryStore, TenantContext, TenantType};
use credence_node::config::StorageBackend;
use credence_node::provisioner::CreateTenant;
use credence_node::tenants::TenantRecord;
use credence_node::{CredenceConfig, CredenceNode, NodeState};
use serde_json::{json, Value};

pub const API_KEY: &str = "integration-root-key";

pub fn memory_config() -> CredenceConfig {
    let mut config = CredenceConfig::default();
    config.storage.backend = StorageBackend::Memory;
    config.api.port = 0;
    config.auth.api_key = Some(API_KEY.into());
    config.issuance.sweep_interval_secs = 0;
    config
}

/// In-process state without an HTTP listener.
pub fn local_state() -> Arc<NodeState> {
    local_state_with(|_| {})
}

pub fn local_state_with(adjust: impl FnOnce(&mut CredenceConfig)) -> Arc<NodeState> {
    let mut config = memory_config();
    config.api.public_url = Some("https://credence.test".into());
    adjust(&mut config);
    Arc::new(NodeState::new(config, Arc::new(MemoryStore::new())))
}

pub async fn provision(state: &NodeState, label: &str, tenant_type: TenantType) -> TenantRecord {
    state
        .provisioner
        .create_tenant(CreateTenant {
            label: label.into(),
            tenant_type,
            base_url: None,
            issuer_did: None,
            verifier_did: None,
        })
        .await
        .expect("provisioning should succeed")
}

pub fn context(record: &TenantRecord) -> TenantContext {
    record.context()
}

/// A node listening on an ephemeral port, plus an HTTP client pointed at it.
pub struct TestNode {
    pub node: CredenceNode,
    pub base: String,
    pub http: reqwest::Client,
}

impl TestNode {
    pub async fn spawn() -> Self {
        let mut node = CredenceNode::new(memory_config()).expect("node should build");
        node.start().await.expect("node should start");
        let addr = node.local_addr().expect("node should be bound");
        Self {
            node,
            base: format!("http://{addr}"),
            http: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Send a request and return the status code and JSON body.
    pub async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        auth: Option<&str>,
        body: Option<Value>,
    ) -> (u16, Value) {
        let mut req = self.http.request(method, self.url(path));
        if let Some(token) = auth {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await.expect("request should reach the node");
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await.expect("body should be readable");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Create an ORG tenant and return its creation response.
    pub async fn create_org(&self, label: &str) -> Value {
        let (status, body) = self
            .send(
                reqwest::Method::POST,
                "/tenants",
                Some(API_KEY),
                Some(json!({"label": label, "type": "ORG"})),
            )
            .await;
        assert_eq!(status, 201, "tenant creation failed: {body}");
        body
    }

    pub async fn shutdown(mut self) {
        self.node.shutdown().await.expect("shutdown should succeed");
    }
}

pub fn membership_offer(member: &str) -> Value {
    json!({
        "credentials": [{
            "credentialDefinitionId": "MembershipCredential",
            "claimTemplate": {"memberName": member}
        }]
    })
}
