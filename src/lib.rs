//! StreamChat - terminal client library for a streaming chat service
//!
//! This library drives a conversation with a remote chat service: it sends
//! a user message, follows the reply as a server-sent event stream, keeps
//! the local message log and session list consistent with what the server
//! persists, and lets the user stop a reply mid-stream.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `stream`: SSE framing, stream event decoding and the stream connector
//! - `persistence`: Session store abstraction and its REST client
//! - `chat`: Message log, session registry, the conversation controller
//!   and the task that serializes access to it
//! - `models`: Sessions, messages and status shared by every layer
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli` / `commands`: Command-line interface and its handlers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use streamchat::{spawn_controller, Config, ControllerSettings, ConversationController};
//! use streamchat::persistence::HttpSessionStore;
//! use streamchat::stream::HttpStreamConnector;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let controller = ConversationController::new(
//!         Arc::new(HttpSessionStore::new(&config.server)?),
//!         Arc::new(HttpStreamConnector::new(&config.server)?),
//!         ControllerSettings::from(&config.chat),
//!     );
//!     let (handle, _task) = spawn_controller(controller, config.chat.command_queue_depth);
//!     handle.send("Hello!").await?;
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod persistence;
pub mod stream;

// Re-export commonly used types
pub use chat::{
    spawn_controller, ControllerHandle, ControllerSettings, ControllerSnapshot,
    ConversationController,
};
pub use config::Config;
pub use error::{Result, StreamChatError};
pub use models::{ChatMessage, ChatSession, ChatStatus, MessageId, SessionId};
pub use stream::{StreamConnector, StreamEvent};
