use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Opaque tenant identifier (a UUIDv7 string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Allocate a fresh, time-ordered tenant id.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Parse a tenant id supplied by a caller or decoded from a token.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        Uuid::parse_str(s).map_err(|_| CoreError::InvalidTenantId(s.to_string()))?;
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tenant flavour. USER tenants only hold credentials; ORG tenants issue and verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TenantType {
    User,
    Org,
}

impl fmt::Display for TenantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "USER"),
            Self::Org => write!(f, "ORG"),
        }
    }
}

/// Namespace a schema lives in: shared across the installation or owned by one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Namespace {
    Global,
    Tenant(TenantId),
}

impl Namespace {
    pub const GLOBAL_KEY: &'static str = "global";

    /// Storage key of the namespace.
    pub fn key(&self) -> &str {
        match self {
            Self::Global => Self::GLOBAL_KEY,
            Self::Tenant(id) => id.as_str(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Encoding of an issued credential on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum WireFormat {
    #[default]
    #[serde(rename = "jwt_vc_json")]
    JwtVcJson,
    #[serde(rename = "vc+sd-jwt")]
    SdJwtVc,
    #[serde(rename = "ldp_vc")]
    LdpVc,
}

impl WireFormat {
    pub const ALL: [WireFormat; 3] = [Self::JwtVcJson, Self::SdJwtVc, Self::LdpVc];

    /// Format identifier as used in OIDC4VCI configuration ids.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::JwtVcJson => "jwt_vc_json",
            Self::SdJwtVc => "vc+sd-jwt",
            Self::LdpVc => "ldp_vc",
        }
    }

    /// JOSE `typ` header value for credentials in this format.
    pub fn jose_type(&self) -> &'static str {
        match self {
            Self::SdJwtVc => "vc+sd-jwt",
            Self::JwtVcJson | Self::LdpVc => "JWT",
        }
    }

    /// Strip a recognised format tag (and one trailing separator) from the end
    /// of `value`. Returns `None` when no tag matches.
    ///
    /// `PaymentReceipt_jwt_vc_json` and `PaymentReceiptjwt_vc_json` both yield
    /// `PaymentReceipt`.
    pub fn strip_suffix(value: &str) -> Option<&str> {
        // Longer tags first so "jwt_vc_json" is preferred over "jwt_vc".
        const TAGS: [&str; 4] = ["jwt_vc_json", "vc+sd-jwt", "ldp_vc", "jwt_vc"];
        TAGS.iter().find_map(|tag| {
            let rest = value.strip_suffix(tag)?;
            let rest = rest
                .strip_suffix(|c: char| matches!(c, '_' | '-' | ':' | '.' | '+'))
                .unwrap_or(rest);
            (!rest.is_empty()).then_some(rest)
        })
    }
}

impl FromStr for WireFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jwt_vc_json" | "jwt_vc" => Ok(Self::JwtVcJson),
            "vc+sd-jwt" | "sd_jwt_vc" => Ok(Self::SdJwtVc),
            "ldp_vc" => Ok(Self::LdpVc),
            other => Err(CoreError::UnknownWireFormat(other.to_string())),
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// The acting tenant for a request, resolved by the auth boundary.
///
/// Downstream components only ever see this, never the raw token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub tenant_type: TenantType,
    /// DID the tenant issues under (ORG tenants only).
    pub issuer_did: Option<String>,
    /// DID the tenant verifies as (ORG tenants only).
    pub verifier_did: Option<String>,
    /// Public base URL of the tenant, used in offer and request URLs.
    pub base_url: String,
}

impl TenantContext {
    pub fn namespace(&self) -> Namespace {
        Namespace::Tenant(self.tenant_id.clone())
    }
}
