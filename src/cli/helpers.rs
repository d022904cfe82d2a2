//! Shared helper functions for CLI commands

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tengen_core::{
    client::ControllerConfig, error::Result, types::ChatSession, ApiClient, ChatController,
    SqliteSessionStore, TengenConfig,
};

pub fn api_client(config: &TengenConfig) -> Result<ApiClient> {
    ApiClient::with_timeout(
        config.client.api_url.clone(),
        Duration::from_secs(config.client.request_timeout_secs),
    )
}

pub async fn session_store(config: &TengenConfig) -> Result<SqliteSessionStore> {
    SqliteSessionStore::new(&config.client.session_db, config.client.max_sessions).await
}

/// Controller wired to the configured backend and session database
pub async fn controller(config: &TengenConfig) -> Result<Arc<ChatController>> {
    let client = api_client(config)?;
    let store = session_store(config).await?;
    Ok(Arc::new(ChatController::new(
        Arc::new(client),
        Arc::new(store),
        ControllerConfig::from(&config.client),
    )))
}

pub fn print_chunk(chunk: &str) {
    print!("{}", chunk);
    let _ = io::stdout().flush();
}

/// Print a conversation transcript
pub fn print_session(session: &ChatSession) {
    println!("{} ({})", session.title, session.id);
    println!("{}", "─".repeat(60));
    for message in &session.messages {
        let kind = message
            .kind
            .map(|k| format!(" [{:?}]", k).to_lowercase())
            .unwrap_or_default();
        println!(
            "{} {}{}:",
            message.timestamp.format("%Y-%m-%d %H:%M"),
            message.role,
            kind
        );
        println!("{}", message.content);
        println!();
    }
}
