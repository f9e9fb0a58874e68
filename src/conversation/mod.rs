//! # Conversation Module
//!
//! Rolling per-user conversation windows.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Conversation`] | Ordered messages plus a running token total; append and evict |
//! | [`ConversationStore`] | User → conversation map guarded by per-user async locks |
//!
//! Appending never evicts. Callers append, then call
//! [`Conversation::evict_until_within_budget`], which drops the oldest
//! messages first so the model always sees the most recent turns.

pub mod store;
pub mod window;

pub use store::{ConversationStore, UserId};
pub use window::{Conversation, WindowState};
