//! Node configuration loading and management.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable that overrides `[auth] api_key`.
pub const API_KEY_ENV: &str = "CREDENCE_API_KEY";

/// Full configuration for the Credence node.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CredenceConfig {
    /// HTTP API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Installation credentials and token settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Offer lifetime settings.
    #[serde(default)]
    pub issuance: IssuanceConfig,

    /// Tenant session pool settings.
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Tenant provisioning settings.
    #[serde(default)]
    pub provisioning: ProvisioningConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API listen address.
    #[serde(default = "default_api_addr")]
    pub listen_addr: String,
    /// API port.
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Externally reachable base URL. Derived from the listen address when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Rocksdb,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Path to the data directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Static installation API key for root operations. Root access is
    /// disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Lifetime of minted bearer tokens.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
    /// Name of the browser session cookie carrying a bearer token.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("cookie_name", &self.cookie_name)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuanceConfig {
    /// Default offer TTL when a request omits `expiresIn`.
    #[serde(default = "default_offer_ttl")]
    pub offer_ttl_secs: u64,
    /// How often expired offers are purged. Zero disables the sweeper.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Seed ORG tenants with the built-in schemas and definitions.
    #[serde(default = "default_true")]
    pub seed_default_definitions: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_api_addr() -> String {
    "127.0.0.1".into()
}
fn default_api_port() -> u16 {
    9001
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_token_ttl() -> u64 {
    24 * 60 * 60
}
fn default_cookie_name() -> String {
    "credence_session".into()
}
fn default_offer_ttl() -> u64 {
    credence_credentials::issuance::DEFAULT_OFFER_TTL_SECS
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_max_sessions() -> usize {
    32
}
fn default_acquire_timeout() -> u64 {
    2000
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_api_addr(),
            port: default_api_port(),
            public_url: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            token_ttl_secs: default_token_ttl(),
            cookie_name: default_cookie_name(),
        }
    }
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            offer_ttl_secs: default_offer_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            acquire_timeout_ms: default_acquire_timeout(),
        }
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            seed_default_definitions: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl CredenceConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: CredenceConfig = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject settings the node cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sessions.max_sessions == 0 {
            anyhow::bail!("sessions.max_sessions must be at least 1");
        }
        Ok(())
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `CREDENCE_API_KEY` if set and non-empty.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.auth.api_key = Some(key);
            }
        }
    }

    pub fn api_listen_addr(&self) -> String {
        format!("{}:{}", self.api.listen_addr, self.api.port)
    }

    /// Base URL used in offer URLs, request URLs and discovery metadata.
    pub fn public_url(&self) -> String {
        match &self.api.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.api.listen_addr, self.api.port),
        }
    }
}
