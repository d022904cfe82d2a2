//! Client side: HTTP access to the backend and the chat state machine

pub mod api_client;
pub mod controller;

pub use api_client::{ApiClient, ChatBackend, Utf8Decoder};
pub use controller::{ChatController, ChatEvent, ChatState, Connectivity, ControllerConfig, STOP_MARKER};
