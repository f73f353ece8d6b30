//! `credence schema`: register and list JSON schemas.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use serde_json::json;

use super::client::ApiClient;
use super::{print_json, read_json};

#[derive(Subcommand, Debug)]
pub enum SchemaCommand {
    /// Register a JSON Schema (draft 2020-12) document.
    Register(RegisterArgs),
    /// List schemas visible to the caller.
    List,
    /// Show one schema.
    Show { id: String },
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    #[arg(short, long)]
    pub name: String,

    #[arg(short, long)]
    pub version: String,

    /// Path to the JSON Schema document, or `-` for stdin.
    #[arg(short, long)]
    pub file: PathBuf,
}

pub async fn run(client: &ApiClient, cmd: &SchemaCommand) -> anyhow::Result<()> {
    match cmd {
        SchemaCommand::Register(args) => {
            let body = json!({
                "name": args.name,
                "version": args.version,
                "jsonSchema": read_json(&args.file)?,
            });
            let schema = client.post("/schemas", &body).await?;
            println!("Schema registered!");
            println!("  ID:  {}", schema["schemaId"].as_str().unwrap_or("?"));
            Ok(())
        }
        SchemaCommand::List => {
            for s in client.get("/schemas").await?.as_array().into_iter().flatten() {
                println!(
                    "{}  {}@{}",
                    s["schemaId"].as_str().unwrap_or("?"),
                    s["name"].as_str().unwrap_or("?"),
                    s["version"].as_str().unwrap_or("?"),
                );
            }
            Ok(())
        }
        SchemaCommand::Show { id } => print_json(&client.get(&format!("/schemas/{id}")).await?),
    }
}
