//! Reddit chat bot client library.
//!
//! Resolves a chat session from a credential, keeps one WebSocket connection
//! to the chat server alive and offers every decoded frame to an ordered list
//! of hooks.

pub mod auth;
pub mod bot;
pub mod config;
pub mod connection;
pub mod domain;
pub mod error;
pub mod frame;
pub mod hooks;
pub mod session;

pub use auth::Credential;
pub use bot::ChatBot;
pub use config::BotConfig;
pub use connection::{ShutdownHandle, outbound::ConnectionState};
pub use error::ClientError;
pub use frame::EventFrame;
pub use hooks::{Hook, HookContext, builtin::AutoResponder};
