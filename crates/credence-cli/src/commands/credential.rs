//! `credence credential`: inspect and revoke issued credentials.

use clap::Subcommand;

use super::client::ApiClient;
use super::print_json;

#[derive(Subcommand, Debug)]
pub enum CredentialCommand {
    /// List credentials issued by the calling tenant.
    List {
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        issuer: Option<String>,
    },
    /// Show one issued credential.
    Get { id: String },
    /// Revoke an issued credential.
    Revoke { id: String },
}

pub async fn run(client: &ApiClient, cmd: &CredentialCommand) -> anyhow::Result<()> {
    match cmd {
        CredentialCommand::List { subject, issuer } => {
            let mut query = Vec::new();
            if let Some(s) = subject {
                query.push(("subject", s.as_str()));
            }
            if let Some(i) = issuer {
                query.push(("issuer", i.as_str()));
            }
            let listed = client.get_query("/issuer/credentials", &query).await?;
            for c in listed.as_array().into_iter().flatten() {
                println!(
                    "{}  {}  {}{}",
                    c["credentialId"].as_str().unwrap_or("?"),
                    c["subjectId"].as_str().unwrap_or("?"),
                    c["createdAt"].as_str().unwrap_or("?"),
                    if c["revoked"] == true { "  REVOKED" } else { "" },
                );
            }
            Ok(())
        }
        CredentialCommand::Get { id } => {
            print_json(&client.get(&format!("/issuer/credentials/{id}")).await?)
        }
        CredentialCommand::Revoke { id } => {
            let revoked = client
                .post_empty(&format!("/issuer/credentials/{id}/revoke"))
                .await?;
            println!(
                "Credential {id} revoked at {}.",
                revoked["revokedAt"].as_str().unwrap_or("?")
            );
            Ok(())
        }
    }
}
