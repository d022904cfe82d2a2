//! One-shot research command

use super::helpers::api_client;
use tengen_core::{error::Result, ChatBackend, ResearchStatus, TengenConfig};

/// Handle research command
pub async fn handle(config: TengenConfig, topic: String, max_sources: usize) -> Result<()> {
    let client = api_client(&config)?;
    println!("Researching '{}' (up to {} sources)...", topic, max_sources);

    let result = client.research(&topic, max_sources).await?;
    println!();
    println!("{}", result.message);

    if result.status == ResearchStatus::Failed {
        return Ok(());
    }

    println!();
    println!("Sources ({}):", result.results_count);
    for (i, source) in result.sources.iter().enumerate() {
        println!("{}. {}", i + 1, source.title);
        println!("   {}", source.url);
        println!("   {}", source.summary);
    }
    Ok(())
}
