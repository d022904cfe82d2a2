//! Backend health command

use super::helpers::api_client;
use tengen_core::{error::Result, ChatBackend, TengenConfig};

/// Handle health command
pub async fn handle(config: TengenConfig) -> Result<()> {
    let client = api_client(&config)?;
    let status = client.health_check().await?;

    let mark = |ok: bool| if ok { "yes" } else { "no" };
    println!("Backend:            {} ({})", client.base_url(), status.status);
    println!("Version:            {}", status.version);
    println!("Instance:           {}", status.instance_id);
    println!("Documents indexed:  {}", mark(status.qa_chain_ready));
    println!("Gemini configured:  {}", mark(status.google_api_configured));
    Ok(())
}
