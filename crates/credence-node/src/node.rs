//! The Credence node orchestrator.
//!
//! Opens storage, binds the HTTP API and runs the background offer sweeper.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use credence_core::{MemoryStore, RecordStore};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::{CredenceConfig, StorageBackend};
use crate::state::NodeState;
use crate::storage::RocksStore;

pub struct CredenceNode {
    config: CredenceConfig,
    store: Option<Arc<dyn RecordStore>>,
    state: Option<Arc<NodeState>>,
    local_addr: Option<SocketAddr>,
    server: Option<JoinHandle<()>>,
    sweeper: Option<JoinHandle<()>>,
}

impl CredenceNode {
    /// Create a node and open its record store.
    pub fn new(config: CredenceConfig) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn RecordStore> = match config.storage.backend {
            StorageBackend::Rocksdb => {
                let store = RocksStore::open(&config.storage.data_dir)?;
                tracing::info!(
                    path = %config.storage.data_dir.display(),
                    "storage initialized"
                );
                Arc::new(store)
            }
            StorageBackend::Memory => {
                tracing::warn!("using in-memory storage, records are lost on exit");
                Arc::new(MemoryStore::new())
            }
        };

        Ok(Self {
            config,
            store: Some(store),
            state: None,
            local_addr: None,
            server: None,
            sweeper: None,
        })
    }

    /// Bind the API listener, build shared state and spawn background tasks.
    ///
    /// When no public URL is configured it is derived from the bound address,
    /// so a port of 0 still yields resolvable offer and metadata URLs.
    pub async fn start(&mut self) -> Result<()> {
        let store = self
            .store
            .take()
            .ok_or_else(|| anyhow::anyhow!("node already started"))?;

        let listener = TcpListener::bind(self.config.api_listen_addr()).await?;
        let local_addr = listener.local_addr()?;
        if self.config.api.public_url.is_none() {
            self.config.api.public_url = Some(format!("http://{local_addr}"));
        }

        let state = Arc::new(NodeState::new(self.config.clone(), store));
        tracing::info!(public_url = %state.public_url, "Credence node starting");

        let api_state = state.clone();
        self.server = Some(tokio::spawn(async move {
            if let Err(e) = crate::api::start_api_server(listener, api_state).await {
                tracing::error!(error = %e, "HTTP API server error");
            }
        }));

        let interval = self.config.issuance.sweep_interval_secs;
        if interval > 0 {
            self.sweeper = Some(tokio::spawn(sweep_offers(
                state.clone(),
                Duration::from_secs(interval),
            )));
        }

        self.local_addr = Some(local_addr);
        self.state = Some(state);
        Ok(())
    }

    /// Wait until the API server exits.
    pub async fn run(&mut self) -> Result<()> {
        let server = self
            .server
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("node not started"))?;
        server.await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("shutting down Credence node");
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
        if let Some(server) = self.server.take() {
            server.abort();
        }
        self.state = None;
        tracing::info!("Credence node shut down");
        Ok(())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn state(&self) -> Option<&Arc<NodeState>> {
        self.state.as_ref()
    }

    pub fn config(&self) -> &CredenceConfig {
        &self.config
    }
}

async fn sweep_offers(state: Arc<NodeState>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match state.issuance.purge_expired() {
            Ok(0) => {}
            Ok(purged) => tracing::info!(purged, "expired offers purged"),
            Err(e) => tracing::warn!(error = %e, "offer sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> CredenceConfig {
        let mut config = CredenceConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.api.port = 0;
        config.auth.api_key = Some("node-test-key".into());
        config
    }

    #[tokio::test]
    async fn test_start_derives_public_url() {
        let mut node = CredenceNode::new(memory_config()).unwrap();
        node.start().await.unwrap();
        let addr = node.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(
            node.state().unwrap().public_url,
            format!("http://{addr}")
        );

        let health: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");

        node.shutdown().await.unwrap();
        assert!(node.state().is_none());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let mut node = CredenceNode::new(memory_config()).unwrap();
        node.start().await.unwrap();
        assert!(node.start().await.is_err());
        node.shutdown().await.unwrap();
    }

    #[test]
    fn test_zero_sessions_refused() {
        let mut config = memory_config();
        config.sessions.max_sessions = 0;
        assert!(CredenceNode::new(config).is_err());
    }

    #[tokio::test]
    async fn test_run_before_start_fails() {
        let mut node = CredenceNode::new(memory_config()).unwrap();
        assert!(node.run().await.is_err());
    }
}
