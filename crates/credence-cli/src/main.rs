//! Credence CLI: command-line client for a running Credence node.
//!
//! Subcommands: status, tenant, schema, definition, offer, redeem, request,
//! verify, credential.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Credence: multi-tenant verifiable credential service.
#[derive(Parser, Debug)]
#[command(name = "credence", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    conn: commands::Connection,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Query the health of a running node.
    Status,
    /// Manage tenants.
    #[command(subcommand)]
    Tenant(commands::tenant::TenantCommand),
    /// Manage credential schemas.
    #[command(subcommand)]
    Schema(commands::schema::SchemaCommand),
    /// Manage credential definitions.
    #[command(subcommand)]
    Definition(commands::definition::DefinitionCommand),
    /// Create a credential offer.
    Offer(commands::offer::OfferArgs),
    /// Redeem a pre-authorized code for credentials.
    Redeem(commands::redeem::RedeemArgs),
    /// Create a presentation request.
    Request(commands::verify::RequestArgs),
    /// Verify a presentation against a request.
    Verify(commands::verify::VerifyArgs),
    /// Inspect or revoke issued credentials.
    #[command(subcommand)]
    Credential(commands::credential::CredentialCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = commands::client::ApiClient::new(&cli.conn)?;

    match &cli.command {
        Commands::Status => commands::status::run(&client).await,
        Commands::Tenant(cmd) => commands::tenant::run(&client, cmd).await,
        Commands::Schema(cmd) => commands::schema::run(&client, cmd).await,
        Commands::Definition(cmd) => commands::definition::run(&client, cmd).await,
        Commands::Offer(args) => commands::offer::run(&client, args).await,
        Commands::Redeem(args) => commands::redeem::run(&client, args).await,
        Commands::Request(args) => commands::verify::request(&client, args).await,
        Commands::Verify(args) => commands::verify::run(&client, args).await,
        Commands::Credential(cmd) => commands::credential::run(&client, cmd).await,
    }
}
