//! # chat-relay
//!
//! Token-budgeted conversation windows for relaying chat messages to an LLM
//! completion API.
//!
//! ## Overview
//!
//! A chat bot that forwards user messages to a completion API has to send
//! enough history for the model to stay on topic while keeping every request
//! under a token ceiling. This crate owns that part:
//!
//! - **Token accounting**: counts tokens the way the upstream bills them,
//!   per model family, via `tiktoken-rs`
//! - **Conversation windows**: per-user queues with a running token total and
//!   oldest-first eviction
//! - **Per-user serialization**: one user's `append → evict → complete → record`
//!   pipeline never interleaves with another message from the same user
//! - **Sender authorization**: allow-listed private chats and mentioned groups
//!
//! The chat-platform protocol and the HTTP client for the model provider are
//! left to the application; see [`completion::CompletionBackend`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chat_relay::completion::{Completion, CompletionBackend};
//! use chat_relay::{Message, Relay, RelayConfig};
//!
//! struct MyBackend;
//!
//! #[async_trait::async_trait]
//! impl CompletionBackend for MyBackend {
//!     async fn complete(&self, _model: &str, _messages: &[Message]) -> chat_relay::Result<Completion> {
//!         Ok(Completion::new(Message::assistant("Hi!")))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> chat_relay::Result<()> {
//!     let relay = Relay::new(RelayConfig::from_env()?);
//!     let reply = relay.exchange(42, "Hello, how are you?", &MyBackend).await?;
//!     println!("{}", reply);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`tokens`] | Tokenizers, per-model cost profiles, message pricing |
//! | [`conversation`] | Conversation windows and the per-user store |
//! | [`relay`] | Orchestration contract for the dispatcher |
//! | [`access`] | Sender authorization |
//! | [`completion`] | Completion API boundary |
//! | [`config`] | Environment configuration |
//! | [`types`] | Message types |

pub mod access;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod relay;
pub mod tokens;
pub mod types;

// Re-export main types for convenience
pub use config::RelayConfig;
pub use conversation::{Conversation, ConversationStore, UserId};
pub use relay::{Dispatch, Relay, Turn};
pub use tokens::{MessageCostModel, ModelCostProfile};
pub use types::message::{Message, MessageRole};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
