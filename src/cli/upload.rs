//! Document upload command

use super::helpers::api_client;
use std::path::PathBuf;
use tengen_core::{error::Result, ChatBackend, TengenConfig};

/// Handle upload command
pub async fn handle(config: TengenConfig, path: PathBuf) -> Result<()> {
    let client = api_client(&config)?;
    let receipt = client.upload_file(&path).await?;

    println!("Uploaded {} ({} bytes)", receipt.pathname, receipt.size);
    println!("   URL: {}{}", client.base_url(), receipt.url);
    println!("   Type: {}", receipt.content_type);
    println!("   Status: {}", receipt.status);
    if let Some(message) = receipt.message {
        println!("   {}", message);
    }
    Ok(())
}
