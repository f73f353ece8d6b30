//! Authentication and authorization at the HTTP boundary.
//!
//! Three credential forms are accepted, checked in order:
//! 1. `Authorization: Bearer <jwt>`, an HS256 token minted by this installation
//! 2. the session cookie carrying the same kind of token
//! 3. `Authorization: <api key>`, the installation API key (grants ROOT)
//!
//! Middleware resolves the caller's [`Role`] once per request. Handlers then
//! state the access they need through an extractor ([`RootAccess`],
//! [`ManagementAccess`], [`TenantAccess`], [`RegistryAccess`]); the scope
//! check happens there, so a handler without one of these is public.

use std::fmt;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use credence_core::{
    ErrorKind, Namespace, RecordStore, RecordStoreExt, StoreError, Table, TenantContext, TenantId,
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::config::AuthConfig;
use crate::error::ApiError;
use crate::state::NodeState;
use crate::tenants::{TenantError, TenantRegistry};

/// Settings key of the per-installation token signing secret.
pub const INSTALLATION_SECRET_KEY: &str = "installation_secret";

const INSTALLATION_SECRET_LEN: usize = 32;

/// Who the caller is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Installation operator. Holds the API key or a ROOT token.
    Root,
    /// May create, list and delete tenants and mint tenant tokens. Nothing else.
    RootWithTenants,
    /// Acts as exactly one tenant.
    TenantAgent(TenantId),
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Root => "ROOT",
            Self::RootWithTenants => "ROOT_WITH_TENANTS",
            Self::TenantAgent(_) => "TENANT_AGENT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleClaim {
    Root,
    RootWithTenants,
    TenantAgent,
}

/// JWT claims of an installation-minted token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub role: RoleClaim,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    fn into_role(self) -> Result<Role, AuthError> {
        match (self.role, self.tenant_id) {
            (RoleClaim::Root, _) => Ok(Role::Root),
            (RoleClaim::RootWithTenants, _) => Ok(Role::RootWithTenants),
            (RoleClaim::TenantAgent, Some(id)) => TenantId::parse(&id)
                .map(Role::TenantAgent)
                .map_err(|e| AuthError::InvalidToken(e.to_string())),
            (RoleClaim::TenantAgent, None) => Err(AuthError::InvalidToken(
                "tenant token without tenantId".into(),
            )),
        }
    }
}

/// Operation classes a route may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Installation-level operations (e.g. minting management tokens).
    Root,
    /// Tenant lifecycle: create, list, delete, mint tenant tokens.
    TenantManagement,
    /// Issuance and verification on behalf of one tenant.
    Tenant,
    /// Schema and definition registry access.
    Registry,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::TenantManagement => write!(f, "tenant management"),
            Self::Tenant => write!(f, "tenant"),
            Self::Registry => write!(f, "registry"),
        }
    }
}

/// An authorized caller, as handed to handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Root,
    TenantManager,
    Tenant(TenantContext),
}

impl Caller {
    /// Schema namespace the caller writes into.
    pub fn namespace(&self) -> Namespace {
        match self {
            Self::Tenant(ctx) => ctx.namespace(),
            Self::Root | Self::TenantManager => Namespace::Global,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authentication required")]
    MissingCredentials,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    TokenExpired,

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("role {role} may not perform {scope} operations")]
    ScopeDenied { role: &'static str, scope: Scope },

    #[error("tenant {0} does not exist")]
    UnknownTenant(TenantId),

    #[error("installation secret is not available")]
    InstallationSecretMissing,

    #[error("token encoding failed: {0}")]
    Encoding(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredentials
            | Self::InvalidToken(_)
            | Self::TokenExpired
            | Self::InvalidApiKey
            | Self::ScopeDenied { .. }
            | Self::UnknownTenant(_) => ErrorKind::Unauthorized,
            Self::InstallationSecretMissing | Self::Encoding(_) | Self::Store(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::InvalidToken(_) => "invalid_token",
            Self::TokenExpired => "token_expired",
            Self::InvalidApiKey => "invalid_api_key",
            Self::ScopeDenied { .. } => "insufficient_scope",
            Self::UnknownTenant(_) => "unknown_tenant",
            Self::InstallationSecretMissing => "installation_secret_missing",
            Self::Encoding(_) => "token_encoding_failed",
            Self::Store(_) => "storage_error",
        }
    }
}

impl From<TenantError> for AuthError {
    fn from(e: TenantError) -> Self {
        match e {
            TenantError::Store(e) => Self::Store(e),
            other => Self::Store(StoreError::Backend(other.to_string())),
        }
    }
}

/// Load the installation secret, generating and persisting it on first boot.
///
/// Concurrent first boots race on `put_if_absent`; every process ends up
/// reading the single stored value.
pub fn load_or_create_installation_secret(
    store: &dyn RecordStore,
) -> Result<Zeroizing<Vec<u8>>, StoreError> {
    let mut fresh = Zeroizing::new([0u8; INSTALLATION_SECRET_LEN]);
    OsRng.fill_bytes(&mut fresh[..]);
    let encoded = Zeroizing::new(URL_SAFE_NO_PAD.encode(&fresh[..]));
    if store.put_json_if_absent(Table::Settings, INSTALLATION_SECRET_KEY, &*encoded)? {
        tracing::info!("installation secret generated");
    }

    let stored: Zeroizing<String> = Zeroizing::new(
        store
            .get_json(Table::Settings, INSTALLATION_SECRET_KEY)?
            .ok_or_else(|| StoreError::Backend("installation secret missing after write".into()))?,
    );
    let secret = URL_SAFE_NO_PAD
        .decode(stored.as_bytes())
        .map_err(|e| StoreError::Backend(format!("corrupt installation secret: {e}")))?;
    Ok(Zeroizing::new(secret))
}

/// A freshly minted bearer token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct AuthGateway {
    api_key: Option<String>,
    secret: Option<Zeroizing<Vec<u8>>>,
    token_ttl_secs: i64,
    cookie_name: String,
    tenants: Arc<TenantRegistry>,
}

impl fmt::Debug for AuthGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGateway")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("cookie_name", &self.cookie_name)
            .finish()
    }
}

impl AuthGateway {
    pub fn new(
        config: &AuthConfig,
        secret: Option<Zeroizing<Vec<u8>>>,
        tenants: Arc<TenantRegistry>,
    ) -> Self {
        let api_key = config.api_key.clone().filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!("no installation API key configured; API key access is disabled");
        }
        Self {
            api_key,
            secret,
            token_ttl_secs: i64::try_from(config.token_ttl_secs).unwrap_or(i64::MAX / 2),
            cookie_name: config.cookie_name.clone(),
            tenants,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Mint a bearer token for `role`.
    pub fn mint(&self, role: &Role) -> Result<IssuedToken, AuthError> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(self.token_ttl_secs);
        let (claim, tenant_id) = match role {
            Role::Root => (RoleClaim::Root, None),
            Role::RootWithTenants => (RoleClaim::RootWithTenants, None),
            Role::TenantAgent(id) => (RoleClaim::TenantAgent, Some(id.to_string())),
        };
        let claims = TokenClaims {
            role: claim,
            tenant_id,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        Ok(IssuedToken {
            token: self.encode(&claims)?,
            expires_at,
        })
    }

    fn encode(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        let secret = self
            .secret
            .as_ref()
            .ok_or(AuthError::InstallationSecretMissing)?;
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret),
        )
        .map_err(|e| AuthError::Encoding(e.to_string()))
    }

    /// Verify a bearer token and return the role it carries.
    pub fn decode(&self, token: &str) -> Result<Role, AuthError> {
        let secret = self
            .secret
            .as_ref()
            .ok_or(AuthError::InstallationSecretMissing)?;
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);

        let claims = jsonwebtoken::decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(secret),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken(e.to_string()),
        })?;
        claims.into_role()
    }

    fn check_api_key(&self, presented: &str) -> Result<Role, AuthError> {
        let Some(expected) = self.api_key.as_deref() else {
            return Err(AuthError::InvalidApiKey);
        };
        // Constant time in the key contents; slices of unequal length compare unequal.
        if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(Role::Root)
        } else {
            Err(AuthError::InvalidApiKey)
        }
    }

    /// Resolve the caller's role from request headers and cookies.
    ///
    /// `Ok(None)` means no credentials were presented at all. Credentials
    /// that are present but wrong are an error.
    pub fn authenticate(
        &self,
        headers: &HeaderMap,
        jar: &CookieJar,
    ) -> Result<Option<Role>, AuthError> {
        let header = match headers.get(AUTHORIZATION) {
            Some(value) => Some(
                value
                    .to_str()
                    .map_err(|_| AuthError::InvalidToken("non-ASCII authorization header".into()))?
                    .trim(),
            ),
            None => None,
        };

        if let Some(token) = header.and_then(|h| h.strip_prefix("Bearer ")) {
            return self.decode(token.trim()).map(Some);
        }
        if let Some(cookie) = jar.get(&self.cookie_name) {
            return self.decode(cookie.value()).map(Some);
        }
        match header {
            Some(key) if !key.is_empty() => self.check_api_key(key).map(Some),
            _ => Ok(None),
        }
    }

    /// Check `role` against `scope`, resolving the tenant for tenant agents.
    pub fn authorize(&self, role: &Role, scope: Scope) -> Result<Caller, AuthError> {
        let denied = || AuthError::ScopeDenied {
            role: role.name(),
            scope,
        };
        match (role, scope) {
            (Role::Root, Scope::Root | Scope::TenantManagement | Scope::Registry) => {
                Ok(Caller::Root)
            }
            (Role::Root, Scope::Tenant) => Err(denied()),
            (Role::RootWithTenants, Scope::TenantManagement) => Ok(Caller::TenantManager),
            (Role::RootWithTenants, Scope::Root | Scope::Tenant | Scope::Registry) => Err(denied()),
            (Role::TenantAgent(id), Scope::Tenant | Scope::Registry) => {
                let record = self
                    .tenants
                    .find(id)?
                    .ok_or_else(|| AuthError::UnknownTenant(id.clone()))?;
                Ok(Caller::Tenant(record.context()))
            }
            (Role::TenantAgent(_), Scope::Root | Scope::TenantManagement) => Err(denied()),
        }
    }
}

/// Role resolved by [`authenticate_request`], stored in request extensions.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Role);

/// Middleware: authenticate once and record the role for the extractors.
pub async fn authenticate_request(
    State(state): State<Arc<NodeState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    match state.gateway.authenticate(request.headers(), &jar) {
        Ok(Some(role)) => {
            tracing::trace!(role = role.name(), "request authenticated");
            request.extensions_mut().insert(Authenticated(role));
            next.run(request).await
        }
        Ok(None) => next.run(request).await,
        Err(e) => {
            tracing::debug!(reason = e.reason(), error = %e, "authentication rejected");
            ApiError::from(e).into_response()
        }
    }
}

fn authorize_parts(parts: &Parts, state: &NodeState, scope: Scope) -> Result<Caller, ApiError> {
    let Authenticated(role) = parts
        .extensions
        .get::<Authenticated>()
        .ok_or(AuthError::MissingCredentials)?;
    Ok(state.gateway.authorize(role, scope)?)
}

/// Requires an installation ROOT caller.
pub struct RootAccess;

impl FromRequestParts<Arc<NodeState>> for RootAccess {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<NodeState>,
    ) -> Result<Self, Self::Rejection> {
        authorize_parts(parts, state, Scope::Root).map(|_| RootAccess)
    }
}

/// Requires tenant-management rights (ROOT or ROOT_WITH_TENANTS).
pub struct ManagementAccess;

impl FromRequestParts<Arc<NodeState>> for ManagementAccess {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<NodeState>,
    ) -> Result<Self, Self::Rejection> {
        authorize_parts(parts, state, Scope::TenantManagement).map(|_| ManagementAccess)
    }
}

/// Requires a tenant agent of an existing tenant.
pub struct TenantAccess(pub TenantContext);

impl FromRequestParts<Arc<NodeState>> for TenantAccess {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<NodeState>,
    ) -> Result<Self, Self::Rejection> {
        match authorize_parts(parts, state, Scope::Tenant)? {
            Caller::Tenant(ctx) => Ok(TenantAccess(ctx)),
            _ => Err(AuthError::MissingCredentials.into()),
        }
    }
}

/// Registry access: ROOT works on the global namespace, tenants on their own.
pub struct RegistryAccess(pub Caller);

impl FromRequestParts<Arc<NodeState>> for RegistryAccess {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<NodeState>,
    ) -> Result<Self, Self::Rejection> {
        authorize_parts(parts, state, Scope::Registry).map(RegistryAccess)
    }
}
