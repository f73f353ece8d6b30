//! `credence status`: query node health.

use super::client::ApiClient;

pub async fn run(client: &ApiClient) -> anyhow::Result<()> {
    let health = client.get("/health").await?;
    println!("Credence node at {}", client.endpoint());
    println!("  Status:   {}", health["status"].as_str().unwrap_or("unknown"));
    println!("  Version:  {}", health["version"].as_str().unwrap_or("unknown"));
    println!("  Uptime:   {}s", health["uptime_secs"].as_u64().unwrap_or(0));
    Ok(())
}
