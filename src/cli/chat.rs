//! Interactive chat and one-shot questions

use super::helpers::{controller, print_chunk, print_session};
use std::path::Path;
use std::sync::Arc;
use tengen_core::{
    client::STOP_MARKER,
    error::{Result, TengenError},
    types::SessionId,
    ChatController, ChatEvent, ChatMode, Connectivity, TengenConfig,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

/// Run `future` while echoing streamed chunks to stdout
async fn with_live_output<T>(
    controller: &ChatController,
    future: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    let mut events = controller.subscribe();
    tokio::pin!(future);

    let result = loop {
        tokio::select! {
            result = &mut future => break result,
            event = events.recv() => {
                if let Ok(ChatEvent::Chunk(chunk)) = event {
                    print_chunk(&chunk);
                }
            }
        }
    };

    while let Ok(event) = events.try_recv() {
        if let ChatEvent::Chunk(chunk) = event {
            print_chunk(&chunk);
        }
    }
    result
}

async fn send(controller: &ChatController, prompt: &str, mode: ChatMode) {
    match with_live_output(controller, controller.send(prompt, mode)).await {
        Ok(reply) => {
            if reply.content.ends_with(STOP_MARKER.trim_start()) {
                print!("{}", STOP_MARKER);
            }
            println!();
        }
        Err(e) => {
            println!();
            eprintln!("Error: {}", e);
            if controller.connectivity() == Connectivity::Degraded {
                eprintln!("Backend unreachable. Type /retry to check the connection.");
            }
        }
    }
}

/// Handle a single question
pub async fn ask(config: TengenConfig, prompt: String, mode: ChatMode) -> Result<()> {
    let controller = controller(&config).await?;
    with_live_output(&controller, controller.send(&prompt, mode)).await?;
    println!();
    Ok(())
}

fn show_help() {
    println!("Commands:");
    println!("  /mode <chat|code|research|auto>  switch request mode");
    println!("  /research <topic>                research a topic");
    println!("  /upload <path>                   upload a document (.json, .txt, .md)");
    println!("  /new                             start a new conversation");
    println!("  /sessions                        list saved conversations");
    println!("  /open <id>                       reopen a saved conversation");
    println!("  /retry                           check the backend connection");
    println!("  /quit                            exit");
    println!("Ctrl-C stops a response that is streaming.");
}

async fn command(controller: &ChatController, mode: &mut ChatMode, line: &str) -> Result<bool> {
    let (name, arg) = line.split_once(' ').unwrap_or((line, ""));
    let arg = arg.trim();

    match name {
        "/quit" | "/exit" => return Ok(false),
        "/help" => show_help(),
        "/mode" => match ChatMode::parse(arg) {
            Some(next) => {
                *mode = next;
                println!("Mode: {}", mode);
            }
            None => println!("Unknown mode '{}'", arg),
        },
        "/research" => {
            let result = with_live_output(controller, controller.research(arg)).await?;
            println!("{}", result.to_markdown());
        }
        "/upload" => {
            let receipt = controller.upload(Path::new(arg)).await?;
            println!(
                "Uploaded {} ({} bytes, {})",
                receipt.pathname, receipt.size, receipt.status
            );
        }
        "/new" => {
            let id = controller.new_session().await?;
            println!("New conversation {}", id);
        }
        "/sessions" => {
            for summary in controller.list_sessions().await? {
                println!(
                    "{}  {}  {} ({} messages)",
                    summary.id,
                    summary.timestamp.format("%Y-%m-%d %H:%M"),
                    summary.title,
                    summary.message_count
                );
            }
        }
        "/open" => {
            let id = SessionId::from_string(arg)
                .map_err(|e| TengenError::Validation(format!("Invalid session id: {}", e)))?;
            let session = controller.open_session(id).await?;
            print_session(&session);
        }
        "/retry" => {
            let status = controller.retry_connection().await?;
            println!(
                "Backend {} (documents indexed: {})",
                status.status, status.qa_chain_ready
            );
        }
        other => println!("Unknown command '{}'. Type /help.", other),
    }
    Ok(true)
}

/// Handle interactive chat
pub async fn handle(config: TengenConfig, mode: ChatMode) -> Result<()> {
    let controller = controller(&config).await?;
    let mut mode = mode;

    println!();
    println!("Tengen Research Assistant");
    println!("Backend: {}   Mode: {}", config.client.api_url, mode);
    println!("Type /help for commands.");
    println!();

    if let Err(e) = controller.retry_connection().await {
        eprintln!("Backend not reachable yet: {}", e);
    }

    let interrupt = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !controller.cancel() {
                    eprintln!();
                    eprintln!("(type /quit to exit)");
                }
            }
        })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_chunk("tengen> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        if line.is_empty() {
            continue;
        }
        if line.starts_with('/') {
            match command(&controller, &mut mode, line).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => eprintln!("Error: {}", e),
            }
            continue;
        }

        debug!("Sending prompt in {} mode", mode);
        send(&controller, line, mode).await;
    }

    interrupt.abort();
    println!();
    Ok(())
}
