pub mod client;
pub mod credential;
pub mod definition;
pub mod offer;
pub mod redeem;
pub mod schema;
pub mod status;
pub mod tenant;
pub mod verify;

use std::path::Path;

use clap::Args;

/// How to reach and authenticate against the node.
#[derive(Args, Debug, Clone)]
pub struct Connection {
    /// API endpoint of the node.
    #[arg(short, long, global = true, env = "CREDENCE_ENDPOINT", default_value = "http://127.0.0.1:9001")]
    pub endpoint: String,

    /// Bearer token or installation API key.
    #[arg(short, long, global = true, env = "CREDENCE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

/// Read a JSON document from a file, or from stdin when the path is `-`.
pub fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let raw = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?
    };
    Ok(serde_json::from_str(&raw)?)
}

/// Parse an inline JSON argument.
pub fn parse_json(raw: &str) -> anyhow::Result<serde_json::Value> {
    serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("invalid JSON argument: {e}"))
}

pub fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
