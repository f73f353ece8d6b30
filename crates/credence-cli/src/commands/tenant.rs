//! `credence tenant`: create, inspect and delete tenants.

use clap::{Args, Subcommand, ValueEnum};
use credence_core::TenantType;
use serde_json::json;

use super::client::ApiClient;
use super::print_json;

#[derive(Subcommand, Debug)]
pub enum TenantCommand {
    /// Provision a new tenant and print its agent token.
    Create(CreateArgs),
    /// List all tenants.
    List,
    /// Show one tenant record.
    Show { id: String },
    /// Delete a tenant.
    Delete { id: String },
    /// Mint a fresh agent token for a tenant.
    Token { id: String },
    /// Mint a management token that can only administer tenants.
    ManagementToken,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Kind {
    User,
    Org,
}

impl From<Kind> for TenantType {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::User => TenantType::User,
            Kind::Org => TenantType::Org,
        }
    }
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Human-readable tenant label.
    #[arg(short, long)]
    pub label: String,

    /// Tenant type.
    #[arg(long = "type", value_enum, default_value = "org")]
    pub kind: Kind,

    /// Base URL the tenant is reachable under.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Existing issuer DID to import instead of generating one.
    #[arg(long)]
    pub issuer_did: Option<String>,

    /// Existing verifier DID to import instead of generating one.
    #[arg(long)]
    pub verifier_did: Option<String>,
}

pub async fn run(client: &ApiClient, cmd: &TenantCommand) -> anyhow::Result<()> {
    match cmd {
        TenantCommand::Create(args) => create(client, args).await,
        TenantCommand::List => {
            let tenants = client.get("/tenants").await?;
            let tenants = tenants.as_array().cloned().unwrap_or_default();
            if tenants.is_empty() {
                println!("No tenants.");
            }
            for t in tenants {
                println!(
                    "{}  {:<4}  {:<8}  {}",
                    t["id"].as_str().unwrap_or("?"),
                    t["type"].as_str().unwrap_or("?"),
                    t["status"].as_str().unwrap_or("?"),
                    t["label"].as_str().unwrap_or(""),
                );
            }
            Ok(())
        }
        TenantCommand::Show { id } => print_json(&client.get(&format!("/tenants/{id}")).await?),
        TenantCommand::Delete { id } => {
            client.delete(&format!("/tenants/{id}")).await?;
            println!("Tenant {id} deleted.");
            Ok(())
        }
        TenantCommand::Token { id } => {
            print_json(&client.post_empty(&format!("/tenants/{id}/token")).await?)
        }
        TenantCommand::ManagementToken => {
            print_json(&client.post_empty("/auth/management-token").await?)
        }
    }
}

async fn create(client: &ApiClient, args: &CreateArgs) -> anyhow::Result<()> {
    let body = json!({
        "label": args.label,
        "type": TenantType::from(args.kind),
        "baseUrl": args.base_url,
        "issuerDid": args.issuer_did,
        "verifierDid": args.verifier_did,
    });
    let created = client.post("/tenants", &body).await?;

    println!("Tenant created!");
    println!("  ID:        {}", created["tenantId"].as_str().unwrap_or("?"));
    for (label, field) in [
        ("Issuer:   ", "issuerDid"),
        ("Verifier: ", "verifierDid"),
        ("Holder:   ", "holderDid"),
    ] {
        if let Some(did) = created[field].as_str() {
            println!("  {label} {did}");
        }
    }
    if created["provisioning"]["state"] == "PARTIAL" {
        println!("  Provisioning incomplete:");
        for failure in created["provisioning"]["failures"]
            .as_array()
            .into_iter()
            .flatten()
        {
            println!("    - {}", failure.as_str().unwrap_or("?"));
        }
    }
    println!("  Token:     {}", created["token"].as_str().unwrap_or("?"));
    Ok(())
}
