//! `credence redeem`: exchange a pre-authorized code for credentials.

use clap::Args;
use serde_json::json;

use super::client::ApiClient;

/// OIDC4VCI pre-authorized code grant type.
const PRE_AUTHORIZED_GRANT: &str = "urn:ietf:params:oauth:grant-type:pre-authorized_code";

#[derive(Args, Debug)]
pub struct RedeemArgs {
    /// The pre-authorized code from the offer.
    #[arg(short, long)]
    pub code: String,

    /// DID of the holder receiving the credential.
    #[arg(short, long)]
    pub subject: String,
}

pub async fn run(client: &ApiClient, args: &RedeemArgs) -> anyhow::Result<()> {
    let body = json!({
        "grant_type": PRE_AUTHORIZED_GRANT,
        "pre_authorized_code": args.code,
        "subject_did": args.subject,
    });
    let redemption = client.post("/token", &body).await?;

    let credentials = redemption["credentials"].as_array().cloned().unwrap_or_default();
    println!("Redeemed {} credential(s).", credentials.len());
    for c in &credentials {
        println!(
            "  {}  {}",
            c["credentialId"].as_str().unwrap_or("?"),
            c["format"].as_str().unwrap_or("?"),
        );
    }
    println!();
    println!("{}", redemption["verifiableCredential"].as_str().unwrap_or(""));
    Ok(())
}
