//! `credence request` and `credence verify`: OIDC4VP presentation requests.

use clap::Args;
use serde_json::{json, Value};

use super::client::ApiClient;
use super::print_json;

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// Definition id, credential type or name the credential must match.
    #[arg(short, long)]
    pub definition: Option<String>,

    /// Only accept credentials from this issuer DID.
    #[arg(long, conflicts_with = "issuer_url")]
    pub trusted_issuer: Option<String>,

    /// Only accept credentials from the issuer published at this base URL.
    #[arg(long)]
    pub issuer_url: Option<String>,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Presentation request id.
    #[arg(short, long)]
    pub request: String,

    /// The presentation: a compact credential or a JSON presentation object.
    #[arg(short, long)]
    pub presentation: String,
}

pub async fn request(client: &ApiClient, args: &RequestArgs) -> anyhow::Result<()> {
    let body = json!({
        "definition": args.definition,
        "trustedIssuer": args.trusted_issuer,
        "issuerUrl": args.issuer_url,
    });
    let created = client.post("/verifier/presentation-requests", &body).await?;
    println!("Presentation request created!");
    println!("  ID:   {}", created["requestId"].as_str().unwrap_or("?"));
    println!("  URL:  {}", created["presentation_request_url"].as_str().unwrap_or("?"));
    Ok(())
}

/// Interpret the argument as JSON when it parses as such, else as a compact token.
pub fn presentation_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
        _ => Value::String(trimmed.to_string()),
    }
}

pub async fn run(client: &ApiClient, args: &VerifyArgs) -> anyhow::Result<()> {
    let body = json!({
        "requestId": args.request,
        "verifiablePresentation": presentation_value(&args.presentation),
    });
    let outcome = client.post("/verifier/verify", &body).await?;
    if outcome["verified"] == true {
        println!("Presentation verified.");
    } else {
        println!(
            "Presentation NOT verified: {}",
            outcome["reason"].as_str().unwrap_or("unknown")
        );
    }
    print_json(&outcome)
}
