//! Message and request pricing under a [`ModelCostProfile`].

use super::profile::{ModelCostProfile, ProfileResolver};
use super::tokenizer::{default_tokenizer, Tokenizer};
use crate::types::Message;
use crate::Result;
use std::sync::Arc;

/// Prices messages with a tokenizer and resolves profiles with a rule list.
#[derive(Clone)]
pub struct MessageCostModel {
    tokenizer: Arc<dyn Tokenizer>,
    resolver: Arc<ProfileResolver>,
}

impl MessageCostModel {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, resolver: ProfileResolver) -> Self {
        Self {
            tokenizer,
            resolver: Arc::new(resolver),
        }
    }

    /// Same built-in rules, different tokenizer.
    pub fn with_tokenizer(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self::new(tokenizer, ProfileResolver::openai())
    }

    pub fn resolver(&self) -> &ProfileResolver {
        &self.resolver
    }

    pub fn resolve_profile(&self, model: &str) -> Result<ModelCostProfile> {
        self.resolver.resolve(model)
    }

    /// Tokens one stored message occupies, without reply priming.
    pub fn cost(&self, message: &Message, profile: &ModelCostProfile) -> Result<usize> {
        let count = |text: &str| -> Result<i64> {
            Ok(self.tokenizer.count(text, profile.encoding)? as i64)
        };

        let mut tokens = profile.tokens_per_message as i64;
        tokens += count(message.role.as_str())?;
        if let Some(name) = &message.name {
            tokens += count(name)?;
            tokens += profile.tokens_per_name;
        }
        tokens += count(&message.content)?;
        Ok(usize::try_from(tokens).unwrap_or(0))
    }

    /// Tokens a completion request built from `messages` consumes, including
    /// the reply priming that is added once per request.
    pub fn request_cost(&self, messages: &[Message], profile: &ModelCostProfile) -> Result<usize> {
        let mut total = 0;
        for message in messages {
            total += self.cost(message, profile)?;
        }
        Ok(total + profile.tokens_per_reply_priming)
    }
}

impl Default for MessageCostModel {
    fn default() -> Self {
        Self::with_tokenizer(default_tokenizer())
    }
}

impl std::fmt::Debug for MessageCostModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCostModel")
            .field("rules", &self.resolver.rules().len())
            .finish_non_exhaustive()
    }
}
