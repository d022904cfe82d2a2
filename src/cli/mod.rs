//! CLI command handlers
//!
//! Each subcommand is implemented in its own module. Everything except
//! `serve` talks to a running backend over HTTP.

pub mod chat;
pub mod health;
pub mod helpers;
pub mod research;
pub mod serve;
pub mod sessions;
pub mod upload;
