//! Built-in schema/definition pairs seeded into new ORG tenants.

use credence_core::WireFormat;
use serde_json::{json, Value};

/// A schema plus the definition that binds it, ready to register.
#[derive(Debug, Clone)]
pub struct DefaultCredential {
    pub name: &'static str,
    pub version: &'static str,
    pub credential_type: &'static str,
    pub json_schema: Value,
    pub claim_template: Value,
    pub wire_format: WireFormat,
}

pub fn default_credentials() -> Vec<DefaultCredential> {
    vec![
        DefaultCredential {
            name: "Membership",
            version: "1.0.0",
            credential_type: "MembershipCredential",
            json_schema: json!({
                "type": "object",
                "properties": {
                    "memberName": {"type": "string"},
                    "memberSince": {"type": "string", "format": "date"},
                    "level": {"type": "string"}
                },
                "required": ["memberName"]
            }),
            claim_template: json!({"level": "standard"}),
            wire_format: WireFormat::JwtVcJson,
        },
        DefaultCredential {
            name: "PaymentReceipt",
            version: "1.0.0",
            credential_type: "PaymentReceipt",
            json_schema: json!({
                "type": "object",
                "properties": {
                    "amount": {"type": "number", "minimum": 0},
                    "currency": {"type": "string", "minLength": 3, "maxLength": 3},
                    "reference": {"type": "string"}
                },
                "required": ["amount", "currency"]
            }),
            claim_template: json!({}),
            wire_format: WireFormat::JwtVcJson,
        },
    ]
}
