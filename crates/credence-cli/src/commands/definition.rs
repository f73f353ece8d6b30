//! `credence definition`: register and list credential definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use credence_core::WireFormat;
use serde_json::{json, Value};

use super::client::ApiClient;
use super::{print_json, read_json};

#[derive(Subcommand, Debug)]
pub enum DefinitionCommand {
    /// Register a credential definition for the calling tenant.
    Register(RegisterArgs),
    /// List definitions. Root callers must name a tenant.
    List {
        #[arg(long)]
        tenant: Option<String>,
    },
    /// Show a definition by id, credential type or name.
    Show { reference: String },
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    #[arg(short, long)]
    pub name: String,

    #[arg(short, long)]
    pub version: String,

    /// Schema the claims are validated against.
    #[arg(long)]
    pub schema_id: String,

    /// Credential type, e.g. `MembershipCredential`. Repeat for several.
    #[arg(long = "type", required = true)]
    pub credential_type: Vec<String>,

    /// Wire format: jwt_vc_json, vc+sd-jwt or ldp_vc.
    #[arg(long, default_value = "jwt_vc_json")]
    pub format: WireFormat,

    /// Issuer DID. Defaults to the tenant's own issuer.
    #[arg(long)]
    pub issuer_did: Option<String>,

    /// Path to a JSON claim template, or `-` for stdin.
    #[arg(long)]
    pub claim_template: Option<PathBuf>,
}

pub async fn run(client: &ApiClient, cmd: &DefinitionCommand) -> anyhow::Result<()> {
    match cmd {
        DefinitionCommand::Register(args) => {
            let template = match &args.claim_template {
                Some(path) => read_json(path)?,
                None => json!({}),
            };
            let body = json!({
                "name": args.name,
                "version": args.version,
                "schemaId": args.schema_id,
                "issuerDid": args.issuer_did,
                "credentialType": args.credential_type,
                "claimTemplate": template,
                "wireFormat": args.format,
            });
            let def = client.post("/credential-definitions", &body).await?;
            println!("Definition registered!");
            println!("  ID:    {}", def["definitionId"].as_str().unwrap_or("?"));
            println!("  Type:  {}", join_types(&def["credentialType"]));
            Ok(())
        }
        DefinitionCommand::List { tenant } => {
            let defs = match tenant {
                Some(t) => {
                    client
                        .get_query("/credential-definitions", &[("tenant", t)])
                        .await?
                }
                None => client.get("/credential-definitions").await?,
            };
            for d in defs.as_array().into_iter().flatten() {
                print_definition(d);
            }
            Ok(())
        }
        DefinitionCommand::Show { reference } => {
            print_json(&client.get(&format!("/credential-definitions/{reference}")).await?)
        }
    }
}

fn print_definition(d: &Value) {
    println!(
        "{}  {}@{}  {}  {}",
        d["definitionId"].as_str().unwrap_or("?"),
        d["name"].as_str().unwrap_or("?"),
        d["version"].as_str().unwrap_or("?"),
        join_types(&d["credentialType"]),
        d["wireFormat"].as_str().unwrap_or("?"),
    );
}

fn join_types(types: &Value) -> String {
    types
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect::<Vec<_>>()
        .join(",")
}
