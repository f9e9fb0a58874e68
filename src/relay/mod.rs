//! # Relay Module
//!
//! The orchestration contract consumed by a chat-platform dispatcher.
//!
//! A dispatcher authorizes an inbound message, then either
//!
//! - drives the two primitives itself: [`Relay::handle_user_message`]
//!   (reject, or append + evict and get the messages to send) followed by
//!   [`Relay::record_reply`], or
//! - holds one [`Turn`] for the whole pipeline so concurrent messages from
//!   the same user cannot interleave, or
//! - lets [`Relay::exchange`] run `append → evict → complete → record` with a
//!   [`CompletionBackend`].
//!
//! ```rust,no_run
//! use chat_relay::relay::{Dispatch, Relay};
//! use chat_relay::{Message, RelayConfig};
//!
//! # async fn run() -> chat_relay::Result<()> {
//! let relay = Relay::new(RelayConfig::default());
//! match relay.handle_user_message(42, "Hello!", "gpt-3.5-turbo-0613", 4096).await? {
//!     Dispatch::Reject { reason } => println!("{}", reason),
//!     Dispatch::Forward { messages, .. } => {
//!         // call the completion API with `messages` ...
//!         relay
//!             .record_reply(42, Message::assistant("Hi!"), "gpt-3.5-turbo-0613", Some(3))
//!             .await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::access::{AccessPolicy, InboundMessage};
use crate::completion::CompletionBackend;
use crate::config::RelayConfig;
use crate::conversation::{Conversation, ConversationStore, UserId};
use crate::tokens::MessageCostModel;
use crate::types::Message;
use crate::Result;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Reply sent back when an inbound message alone exceeds the budget.
pub const TOO_LONG_NOTICE: &str = "Sorry, your message is too long to process!";

/// Outcome of an inbound user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Do not call the completion API; send `reason` back to the user.
    Reject { reason: String },
    /// Send `messages` to the completion API. `prompt_tokens` is the
    /// window's running total plus the model's reply priming.
    Forward {
        messages: Vec<Message>,
        prompt_tokens: usize,
    },
}

impl Dispatch {
    pub fn is_reject(&self) -> bool {
        matches!(self, Dispatch::Reject { .. })
    }
}

pub struct Relay {
    store: Arc<ConversationStore>,
    costs: MessageCostModel,
    policy: AccessPolicy,
    config: RelayConfig,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            store: Arc::new(ConversationStore::new()),
            costs: MessageCostModel::default(),
            policy: config.access_policy(),
            config,
        }
    }

    pub fn with_cost_model(mut self, costs: MessageCostModel) -> Self {
        self.costs = costs;
        self
    }

    /// Share a store between relays (e.g. several dispatch front-ends).
    pub fn with_store(mut self, store: Arc<ConversationStore>) -> Self {
        self.store = store;
        self
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn costs(&self) -> &MessageCostModel {
        &self.costs
    }

    pub fn authorize(&self, msg: &InboundMessage) -> bool {
        match self.policy.check(msg) {
            Ok(()) => true,
            Err(denial) => {
                debug!(chat_id = msg.chat_id, ?denial, "ignoring inbound message");
                false
            }
        }
    }

    /// Take the user's lock for a whole inbound pipeline.
    pub async fn begin(&self, user_id: UserId) -> Turn {
        Turn {
            conversation: self.store.lock(user_id).await,
            costs: self.costs.clone(),
            user_id,
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub async fn handle_user_message(
        &self,
        user_id: UserId,
        text: &str,
        model: &str,
        budget: usize,
    ) -> Result<Dispatch> {
        self.begin(user_id)
            .await
            .handle_user_message(text, model, budget)
    }

    /// Append the assistant's reply. `reply_token_usage` is the completion
    /// API's `usage.completion_tokens`; when absent the reply is priced
    /// locally. Returns the tokens accounted for the reply.
    pub async fn record_reply(
        &self,
        user_id: UserId,
        reply: Message,
        model: &str,
        reply_token_usage: Option<usize>,
    ) -> Result<usize> {
        self.begin(user_id)
            .await
            .record_reply(reply, model, reply_token_usage)
    }

    /// Run a full turn with the configured model and budget.
    pub async fn exchange(
        &self,
        user_id: UserId,
        text: &str,
        backend: &dyn CompletionBackend,
    ) -> Result<String> {
        let model = self.config.model.clone();
        let budget = self.config.max_tokens;
        self.exchange_with(user_id, text, &model, budget, backend)
            .await
    }

    /// `append → evict → complete → record_reply` under the user's lock.
    /// Returns the text to send back: the rejection notice or the reply.
    ///
    /// If the backend fails the user message stays in the window and the
    /// error is returned; [`Relay::retry_pending`] can resend it.
    pub async fn exchange_with(
        &self,
        user_id: UserId,
        text: &str,
        model: &str,
        budget: usize,
        backend: &dyn CompletionBackend,
    ) -> Result<String> {
        let mut turn = self.begin(user_id).await;
        match turn.handle_user_message(text, model, budget)? {
            Dispatch::Reject { reason } => Ok(reason),
            Dispatch::Forward { messages, .. } => turn.complete(model, &messages, backend).await,
        }
    }

    /// Resend the window of a user whose last completion failed. Returns
    /// `None` when no reply is pending.
    pub async fn retry_pending(
        &self,
        user_id: UserId,
        backend: &dyn CompletionBackend,
    ) -> Result<Option<String>> {
        let model = self.config.model.clone();
        let mut turn = self.begin(user_id).await;
        match turn.pending_request(&model)? {
            Some(Dispatch::Forward { messages, .. }) => {
                turn.complete(&model, &messages, backend).await.map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Authorize, then [`Relay::exchange`]. `None` means the message is
    /// not for us and nothing should be sent.
    pub async fn handle_inbound(
        &self,
        msg: &InboundMessage,
        backend: &dyn CompletionBackend,
    ) -> Result<Option<String>> {
        if !self.authorize(msg) {
            return Ok(None);
        }
        self.exchange(msg.sender_id, &msg.text, backend)
            .await
            .map(Some)
    }
}

/// Exclusive access to one user's conversation for the duration of a turn.
pub struct Turn {
    conversation: OwnedMutexGuard<Conversation>,
    costs: MessageCostModel,
    user_id: UserId,
    request_id: String,
}

impl Turn {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Correlation id attached to this turn's log lines.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Reject an oversized message without touching the window; otherwise
    /// append it, evict down to `budget` and return the request payload.
    pub fn handle_user_message(&mut self, text: &str, model: &str, budget: usize) -> Result<Dispatch> {
        let profile = self.costs.resolve_profile(model)?;
        let message = Message::user(text);

        let standalone = self
            .costs
            .request_cost(std::slice::from_ref(&message), &profile)?;
        if standalone > budget {
            info!(
                request_id = %self.request_id,
                user_id = self.user_id,
                standalone,
                budget,
                "rejecting message that exceeds the budget on its own"
            );
            return Ok(Dispatch::Reject {
                reason: TOO_LONG_NOTICE.to_string(),
            });
        }

        self.conversation
            .append(message.clone(), &self.costs, &profile)?;
        let evicted = self
            .conversation
            .evict_until_within_budget(budget, &self.costs, &profile)?;
        if self.conversation.is_empty() {
            // Usage-accounted replies can leave the running total above the
            // fresh sum; the inbound message fits on its own, so keep it.
            warn!(
                request_id = %self.request_id,
                user_id = self.user_id,
                "running total drifted, inbound message was evicted; re-appending"
            );
            self.conversation.append(message, &self.costs, &profile)?;
        }

        let messages = self.conversation.to_request();
        let prompt_tokens = self.conversation.total_tokens() + profile.tokens_per_reply_priming;
        debug!(
            request_id = %self.request_id,
            user_id = self.user_id,
            evicted = evicted.len(),
            window = messages.len(),
            prompt_tokens,
            "forwarding conversation window"
        );
        Ok(Dispatch::Forward {
            messages,
            prompt_tokens,
        })
    }

    pub fn record_reply(
        &mut self,
        reply: Message,
        model: &str,
        reply_token_usage: Option<usize>,
    ) -> Result<usize> {
        match reply_token_usage {
            Some(tokens) => {
                self.conversation.append_accounted(reply, tokens);
                Ok(tokens)
            }
            None => {
                let profile = self.costs.resolve_profile(model)?;
                self.conversation.append(reply, &self.costs, &profile)
            }
        }
    }

    /// The payload to resend when the last completion call failed, if any.
    pub fn pending_request(&self, model: &str) -> Result<Option<Dispatch>> {
        if !self.conversation.awaiting_reply() {
            return Ok(None);
        }
        let profile = self.costs.resolve_profile(model)?;
        Ok(Some(Dispatch::Forward {
            messages: self.conversation.to_request(),
            prompt_tokens: self.conversation.total_tokens() + profile.tokens_per_reply_priming,
        }))
    }

    async fn complete(
        &mut self,
        model: &str,
        messages: &[Message],
        backend: &dyn CompletionBackend,
    ) -> Result<String> {
        let completion = match backend.complete(model, messages).await {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    request_id = %self.request_id,
                    user_id = self.user_id,
                    error = %e,
                    "completion failed, reply left pending"
                );
                return Err(e);
            }
        };
        let usage = completion.completion_tokens();
        let content = completion.message.content.clone();
        let accounted = self.record_reply(completion.message, model, usage)?;
        info!(
            request_id = %self.request_id,
            user_id = self.user_id,
            reply_tokens = accounted,
            total_tokens = self.conversation.total_tokens(),
            "turn completed"
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{Completion, Usage};
    use crate::tokens::CharacterEstimator;
    use crate::{Error, ErrorContext};
    use async_trait::async_trait;

    const MODEL: &str = "gpt-3.5-turbo-0613";

    fn relay() -> Relay {
        Relay::new(RelayConfig::new().with_model(MODEL).with_user_ids([1]))
            .with_cost_model(MessageCostModel::with_tokenizer(Arc::new(
                CharacterEstimator::with_ratio(1.0),
            )))
    }

    struct Echo;

    #[async_trait]
    impl CompletionBackend for Echo {
        async fn complete(&self, _model: &str, messages: &[Message]) -> Result<Completion> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(Completion::new(Message::assistant(format!("echo: {}", last))).with_usage(Usage {
                prompt_tokens: 0,
                completion_tokens: 7,
                total_tokens: 7,
            }))
        }
    }

    struct Failing;

    #[async_trait]
    impl CompletionBackend for Failing {
        async fn complete(&self, _model: &str, _messages: &[Message]) -> Result<Completion> {
            Err(Error::completion_with_context(
                "upstream unavailable",
                ErrorContext::new().with_source("test"),
            ))
        }
    }

    #[tokio::test]
    async fn test_forward_returns_full_window() {
        let relay = relay();
        let first = relay.handle_user_message(1, "hello", MODEL, 4096).await.unwrap();
        match first {
            Dispatch::Forward {
                messages,
                prompt_tokens,
            } => {
                assert_eq!(messages, vec![Message::user("hello")]);
                // 3 + "user" + "hello" + 3 priming
                assert_eq!(prompt_tokens, 15);
            }
            other => panic!("expected forward, got {:?}", other),
        }
        let snap = relay.store().snapshot(1).await.unwrap();
        assert_eq!(snap.total_tokens(), 12);
    }

    #[tokio::test]
    async fn test_reject_leaves_conversation_untouched() {
        let relay = relay();
        relay.handle_user_message(1, "hello", MODEL, 4096).await.unwrap();
        let before = relay.store().snapshot(1).await.unwrap();

        let dispatch = relay
            .handle_user_message(1, &"x".repeat(5000), MODEL, 4096)
            .await
            .unwrap();
        assert_eq!(
            dispatch,
            Dispatch::Reject {
                reason: TOO_LONG_NOTICE.to_string()
            }
        );
        let after = relay.store().snapshot(1).await.unwrap();
        assert_eq!(after.len(), before.len());
        assert_eq!(after.total_tokens(), before.total_tokens());
    }

    #[tokio::test]
    async fn test_record_reply_prefers_reported_usage() {
        let relay = relay();
        relay.handle_user_message(1, "hello", MODEL, 4096).await.unwrap();
        let accounted = relay
            .record_reply(1, Message::assistant("a long local reply"), MODEL, Some(2))
            .await
            .unwrap();
        assert_eq!(accounted, 2);
        assert_eq!(relay.store().snapshot(1).await.unwrap().total_tokens(), 14);

        let local = relay
            .record_reply(1, Message::assistant("abc"), MODEL, None)
            .await
            .unwrap();
        // 3 + "assistant" + "abc"
        assert_eq!(local, 15);
    }

    #[tokio::test]
    async fn test_unsupported_model_is_surfaced() {
        let relay = relay();
        let err = relay
            .handle_user_message(1, "hello", "claude-3", 4096)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedModel { .. }));
        assert!(relay.store().snapshot(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exchange_records_reply() {
        let relay = relay();
        let reply = relay.exchange(1, "ping", &Echo).await.unwrap();
        assert_eq!(reply, "echo: ping");
        let snap = relay.store().snapshot(1).await.unwrap();
        assert_eq!(
            snap.to_request(),
            vec![Message::user("ping"), Message::assistant("echo: ping")]
        );
        assert_eq!(snap.total_tokens(), 3 + 4 + 4 + 7);
        assert!(!snap.awaiting_reply());
    }

    #[tokio::test]
    async fn test_failed_completion_leaves_reply_pending() {
        let relay = relay();
        assert!(relay.exchange(1, "ping", &Failing).await.is_err());
        let snap = relay.store().snapshot(1).await.unwrap();
        assert_eq!(snap.to_request(), vec![Message::user("ping")]);
        assert!(snap.awaiting_reply());

        let retried = relay.retry_pending(1, &Echo).await.unwrap();
        assert_eq!(retried.as_deref(), Some("echo: ping"));
        let snap = relay.store().snapshot(1).await.unwrap();
        assert_eq!(snap.len(), 2);
        assert_eq!(relay.retry_pending(1, &Echo).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_drifted_total_keeps_inbound_message() {
        let relay = relay();
        {
            let mut turn = relay.begin(1).await;
            turn.handle_user_message("hi", MODEL, 100).unwrap();
            // Reported usage far above the local price of the reply.
            turn.record_reply(Message::assistant("ok"), MODEL, Some(500))
                .unwrap();
        }
        let dispatch = relay.handle_user_message(1, "next", MODEL, 100).await.unwrap();
        match dispatch {
            Dispatch::Forward { messages, .. } => {
                assert_eq!(messages, vec![Message::user("next")])
            }
            other => panic!("expected forward, got {:?}", other),
        }
        let snap = relay.store().snapshot(1).await.unwrap();
        assert_eq!(snap.total_tokens(), 3 + 4 + 4);
    }

    #[tokio::test]
    async fn test_handle_inbound_ignores_unauthorized() {
        let relay = relay();
        let allowed = relay
            .handle_inbound(&InboundMessage::private(1, "ping"), &Echo)
            .await
            .unwrap();
        assert_eq!(allowed.as_deref(), Some("echo: ping"));

        let denied = relay
            .handle_inbound(&InboundMessage::private(2, "ping"), &Echo)
            .await
            .unwrap();
        assert_eq!(denied, None);
        assert!(!relay.store().contains(2));
    }
}
