//! Per-user message queue with a running token total.

use crate::tokens::{MessageCostModel, ModelCostProfile};
use crate::types::Message;
use crate::Result;
use std::collections::VecDeque;
use tracing::debug;

/// Observable state of a [`Conversation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Empty,
    Active,
}

/// Ordered messages (oldest first) and the tokens they occupy.
///
/// `total_tokens` is maintained incrementally on every mutation and is
/// only re-summed by [`Conversation::resync`]. It never includes the
/// per-request reply priming.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: VecDeque<Message>,
    total_tokens: usize,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WindowState {
        if self.messages.is_empty() {
            WindowState::Empty
        } else {
            WindowState::Active
        }
    }

    pub fn messages(&self) -> &VecDeque<Message> {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    /// True when the newest message is from the user, i.e. a completion was
    /// requested (or is about to be) and no reply has been recorded yet.
    pub fn awaiting_reply(&self) -> bool {
        self.messages.back().map(Message::is_user).unwrap_or(false)
    }

    /// Messages in request order.
    pub fn to_request(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    /// Price `message`, push it to the tail and return its cost. Never evicts.
    pub fn append(
        &mut self,
        message: Message,
        costs: &MessageCostModel,
        profile: &ModelCostProfile,
    ) -> Result<usize> {
        let cost = costs.cost(&message, profile)?;
        self.append_accounted(message, cost);
        Ok(cost)
    }

    /// Push `message` with a cost that is already known, e.g. the usage the
    /// completion API reported for a reply.
    pub fn append_accounted(&mut self, message: Message, cost: usize) {
        self.messages.push_back(message);
        self.total_tokens += cost;
        debug!(
            cost,
            total_tokens = self.total_tokens,
            len = self.messages.len(),
            "appended message"
        );
    }

    /// Drop the oldest messages until `total_tokens <= budget` or the queue
    /// is empty. Each dropped message is re-priced on its own rather than
    /// trusting a cached cost. Returns the evicted messages, oldest first.
    pub fn evict_until_within_budget(
        &mut self,
        budget: usize,
        costs: &MessageCostModel,
        profile: &ModelCostProfile,
    ) -> Result<Vec<Message>> {
        let mut evicted = Vec::new();
        while self.total_tokens > budget {
            let cost = match self.messages.front() {
                Some(oldest) => costs.cost(oldest, profile)?,
                None => break,
            };
            if let Some(oldest) = self.messages.pop_front() {
                self.total_tokens = self.total_tokens.saturating_sub(cost);
                evicted.push(oldest);
            }
        }
        if self.messages.is_empty() {
            self.total_tokens = 0;
        }
        if !evicted.is_empty() {
            debug!(
                evicted = evicted.len(),
                budget,
                total_tokens = self.total_tokens,
                "evicted oldest messages"
            );
        }
        Ok(evicted)
    }

    /// Re-sum `total_tokens` from scratch under `profile` and return it.
    ///
    /// Replies recorded with upstream usage are re-priced locally.
    pub fn resync(&mut self, costs: &MessageCostModel, profile: &ModelCostProfile) -> Result<usize> {
        let mut total = 0;
        for message in &self.messages {
            total += costs.cost(message, profile)?;
        }
        if total != self.total_tokens {
            debug!(
                before = self.total_tokens,
                after = total,
                "resynced running token total"
            );
        }
        self.total_tokens = total;
        Ok(total)
    }

    /// Drop every message.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.total_tokens = 0;
    }
}
