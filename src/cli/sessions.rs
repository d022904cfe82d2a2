//! Saved conversation commands

use super::helpers::{print_session, session_store};
use tengen_core::{
    error::{Result, TengenError},
    types::SessionId,
    SessionStore, TengenConfig,
};

fn parse_id(id: &str) -> Result<SessionId> {
    SessionId::from_string(id)
        .map_err(|e| TengenError::Validation(format!("Invalid session id '{}': {}", id, e)))
}

pub async fn list(config: TengenConfig) -> Result<()> {
    let store = session_store(&config).await?;
    let sessions = store.list().await?;

    if sessions.is_empty() {
        println!("No saved conversations");
        return Ok(());
    }

    for summary in sessions {
        println!(
            "{}  {}  {}",
            summary.id,
            summary.timestamp.format("%Y-%m-%d %H:%M"),
            summary.title
        );
        if !summary.last_message_preview.is_empty() {
            println!("    {}", summary.last_message_preview);
        }
    }
    Ok(())
}

pub async fn show(config: TengenConfig, id: String) -> Result<()> {
    let store = session_store(&config).await?;
    let session = store
        .get(parse_id(&id)?)
        .await?
        .ok_or_else(|| TengenError::NotFound(format!("Session {}", id)))?;
    print_session(&session);
    Ok(())
}

pub async fn delete(config: TengenConfig, id: String) -> Result<()> {
    let store = session_store(&config).await?;
    store.delete(parse_id(&id)?).await?;
    println!("Deleted {}", id);
    Ok(())
}
