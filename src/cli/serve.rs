//! HTTP API server command

use std::net::SocketAddr;
use tengen_core::{
    api::{ApiServer, ApiServerConfig, AppState},
    error::Result,
    TengenConfig,
};
use tracing::debug;

/// Handle API server startup command
pub async fn handle(config: TengenConfig, addr: Option<String>) -> Result<()> {
    debug!("Starting HTTP API server...");

    let mut server_config = ApiServerConfig::from(&config.server);
    if let Some(addr) = addr {
        server_config.addr = addr
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("Invalid address '{}': {}", addr, e))?;
    }

    let state = AppState::from_config(&config).await?;

    println!();
    println!("Tengen Research Assistant API");
    println!("   Data directory: {}", config.server.data_dir.display());
    println!("   Model: {}", config.llm.model);
    if !config.llm_configured() {
        println!("   Warning: GOOGLE_API_KEY is not set; chat and code requests will fail");
    }
    println!();

    ApiServer::new(server_config, state).serve().await?;
    Ok(())
}
