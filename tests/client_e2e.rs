//! Client and chat controller against a live backend

mod common;

use common::spawn_backend;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tengen_core::{
    client::ControllerConfig, ApiClient, ChatBackend, ChatController, ChatMode, ChatTurn,
    Connectivity, MessageKind, Role, SessionStore, SqliteSessionStore, TengenError,
};

#[tokio::test]
async fn test_api_client_streams_chat() {
    let backend = spawn_backend().await;
    let client = ApiClient::new(backend.config.client.api_url.clone()).unwrap();

    let chunks: Vec<String> = client
        .chat(&[ChatTurn::user("hello")], ChatMode::Chat)
        .await
        .unwrap()
        .map(|chunk| chunk.unwrap())
        .collect()
        .await;
    assert_eq!(chunks.concat(), "Streamed answer.");

    let status = client.health_check().await.unwrap();
    assert!(status.google_api_configured);
}

#[tokio::test]
async fn test_api_client_surfaces_backend_errors() {
    let backend = spawn_backend().await;
    let client = ApiClient::new(backend.config.client.api_url.clone()).unwrap();

    let err = client.research("   ", 2).await.unwrap_err();
    match err {
        TengenError::Backend { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("Topic cannot be empty"), "{}", message);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_auto_mode_research_question() {
    let backend = spawn_backend().await;
    let client = ApiClient::new(backend.config.client.api_url.clone()).unwrap();
    let store = Arc::new(
        SqliteSessionStore::new(&backend.config.client.session_db, 50)
            .await
            .unwrap(),
    );
    let controller = ChatController::new(
        Arc::new(client.clone()),
        store.clone(),
        ControllerConfig::default(),
    );

    let reply = controller
        .send("What is quantum computing?", ChatMode::Auto)
        .await
        .unwrap();
    assert_eq!(reply.content, "Streamed answer.");

    let session = controller.current_session().await;
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[0].role, Role::User);
    assert_eq!(session.messages[1].role, Role::Assistant);
    assert_eq!(session.messages[1].kind, Some(MessageKind::Research));
    assert_eq!(session.title, "What is quantum computing?");

    // the research run left a scrape dump behind for the index
    assert!(backend
        .dir
        .path()
        .join("data/quantum_computing_research.json")
        .exists());

    // a fresh controller on the same store sees the identical conversation
    let reopened = ChatController::new(Arc::new(client), store.clone(), ControllerConfig::default());
    let restored = reopened.open_session(session.id).await.unwrap();
    assert_eq!(restored.messages, session.messages);
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_controller_upload_round_trip() {
    let backend = spawn_backend().await;
    let client = ApiClient::new(backend.config.client.api_url.clone()).unwrap();
    let store = Arc::new(tengen_core::MemorySessionStore::default());
    let controller = ChatController::new(Arc::new(client), store, ControllerConfig::default());

    let file = backend.dir.path().join("facts.json");
    std::fs::write(&file, r#"[{"content": "Superposition"}, {"content": "Decoherence"}]"#).unwrap();

    let receipt = controller.upload(&file).await.unwrap();
    assert_eq!(receipt.pathname, "facts.json");
    assert_eq!(receipt.status, "processed");
    assert!(backend.dir.path().join("data/facts.json").exists());

    let image = backend.dir.path().join("diagram.png");
    std::fs::write(&image, b"\x89PNG").unwrap();
    let err = controller.upload(&image).await.unwrap_err();
    assert!(matches!(err, TengenError::UnsupportedFileType(_)));
    assert!(!backend.dir.path().join("data/diagram.png").exists());

    let session = controller.current_session().await;
    assert!(session.messages.last().unwrap().content.starts_with("Error: "));
}

#[tokio::test]
async fn test_unreachable_backend_marks_degraded() {
    let client = ApiClient::with_timeout("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    let store = Arc::new(tengen_core::MemorySessionStore::default());
    let controller = ChatController::new(Arc::new(client), store, ControllerConfig::default());

    let err = controller.send("hello", ChatMode::Chat).await.unwrap_err();
    assert!(err.is_connectivity());
    assert_eq!(controller.connectivity(), Connectivity::Degraded);

    let session = controller.current_session().await;
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[0].content, "hello");
}
