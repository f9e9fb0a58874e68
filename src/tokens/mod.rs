//! # Token Accounting Module
//!
//! Counts tokens the way the upstream completion API bills them, so that
//! conversation windows can be kept under a budget before a request is sent.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Tokenizer`] | Trait for counting tokens of a text under an [`Encoding`] |
//! | [`TiktokenTokenizer`] | Exact BPE counts via `tiktoken-rs` |
//! | [`CharacterEstimator`] | Fast character-based approximation |
//! | [`CachingTokenizer`] | Wrapper that memoizes counts |
//! | [`ModelCostProfile`] | Per-model framing overheads and encoding |
//! | [`ProfileResolver`] | Ordered (matcher, resolution) rules selecting a profile |
//! | [`MessageCostModel`] | Prices single messages and whole requests |
//!
//! ## Example
//!
//! ```rust,no_run
//! use chat_relay::tokens::{resolve_profile, MessageCostModel};
//! use chat_relay::Message;
//!
//! # fn main() -> chat_relay::Result<()> {
//! let costs = MessageCostModel::default();
//! let profile = resolve_profile("gpt-3.5-turbo-0613")?;
//! let tokens = costs.cost(&Message::user("Hello, how are you?"), &profile)?;
//! println!("message occupies {} tokens", tokens);
//! # Ok(())
//! # }
//! ```
//!
//! ## Resolution order
//!
//! 1. Exact pinned snapshots (`gpt-4-0613`, `gpt-3.5-turbo-0301`, ...)
//! 2. Family fragments (`gpt-3.5-turbo`, `gpt-4`) resolve as a pinned snapshot, with a warning
//! 3. Anything else is [`Error::UnsupportedModel`](crate::Error::UnsupportedModel)

mod cost;
mod profile;
mod tokenizer;

pub use cost::MessageCostModel;
pub use profile::{
    resolve_profile, FramingCosts, ModelCostProfile, ModelMatcher, ProfileResolver, ProfileRule,
    RuleResolution,
};
pub use tokenizer::{
    default_tokenizer, CachingTokenizer, CharacterEstimator, Encoding, TiktokenTokenizer,
    Tokenizer,
};
