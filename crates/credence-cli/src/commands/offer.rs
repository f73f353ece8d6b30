//! `credence offer`: create a pre-authorized credential offer.

use clap::Args;
use credence_core::WireFormat;
use serde_json::{json, Map, Value};

use super::client::ApiClient;
use super::parse_json;

#[derive(Args, Debug)]
pub struct OfferArgs {
    /// Definition id, credential type or name to issue against.
    #[arg(short, long)]
    pub definition: Option<String>,

    /// Credential type when issuing without a definition.
    #[arg(long = "type")]
    pub types: Vec<String>,

    /// Schema id when issuing without a definition.
    #[arg(long)]
    pub schema_id: Option<String>,

    /// Wire format override.
    #[arg(long)]
    pub format: Option<WireFormat>,

    /// Claims as an inline JSON object.
    #[arg(short, long, default_value = "{}")]
    pub claims: String,

    /// Offer lifetime in seconds.
    #[arg(long)]
    pub expires_in: Option<u64>,
}

pub fn build_request(args: &OfferArgs) -> anyhow::Result<Value> {
    let claims = parse_json(&args.claims)?;
    if !claims.is_object() {
        anyhow::bail!("--claims must be a JSON object");
    }
    if args.definition.is_none() && args.types.is_empty() {
        anyhow::bail!("either --definition or --type is required");
    }

    let mut template = Map::new();
    if let Some(def) = &args.definition {
        template.insert("credentialDefinitionId".into(), json!(def));
    }
    if !args.types.is_empty() {
        template.insert("type".into(), json!(args.types));
    }
    if let Some(schema_id) = &args.schema_id {
        template.insert("schemaId".into(), json!(schema_id));
    }
    if let Some(format) = args.format {
        template.insert("format".into(), json!(format));
    }
    template.insert("claimTemplate".into(), claims);

    let mut body = json!({ "credentials": [Value::Object(template)] });
    if let Some(ttl) = args.expires_in {
        body["expiresIn"] = json!(ttl);
    }
    Ok(body)
}

pub async fn run(client: &ApiClient, args: &OfferArgs) -> anyhow::Result<()> {
    let created = client
        .post("/issuer/credential-offers", &build_request(args)?)
        .await?;
    println!("Offer created!");
    println!("  Offer ID:  {}", created["offerId"].as_str().unwrap_or("?"));
    println!("  Code:      {}", created["preAuthorizedCode"].as_str().unwrap_or("?"));
    println!("  Expires:   {}", created["expiresAt"].as_str().unwrap_or("?"));
    println!("  URL:       {}", created["credential_offer_url"].as_str().unwrap_or("?"));
    Ok(())
}
