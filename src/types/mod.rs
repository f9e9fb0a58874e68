//! # Types Module
//!
//! Core data types shared by the token accounting engine, the conversation
//! store and the completion boundary.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Chat message with role, optional name and text content |
//! | [`MessageRole`] | Message role (system, user, assistant) |
//!
//! ## Example
//!
//! ```rust
//! use chat_relay::types::{Message, MessageRole};
//!
//! let system = Message::system("You are a helpful assistant");
//! let user = Message::user("What's the weather?").with_name("alice");
//! assert_eq!(user.role, MessageRole::User);
//! ```

pub mod message;

pub use message::{Message, MessageRole};
