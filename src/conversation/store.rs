//! User → conversation map with per-user mutual exclusion.

use super::window::Conversation;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Chat-platform user identifier.
pub type UserId = i64;

/// Explicit owner of every live conversation.
///
/// Each conversation sits behind its own async mutex, so distinct users
/// never contend while one user's pipeline can hold its lock across the
/// completion call. Entries are created lazily and live until removed.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: DashMap<UserId, Arc<Mutex<Conversation>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, user_id: UserId) -> Arc<Mutex<Conversation>> {
        self.conversations
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(Conversation::new())))
            .value()
            .clone()
    }

    /// Exclusive access to the user's conversation, creating it if needed.
    ///
    /// The map shard is released before awaiting the per-user lock.
    pub async fn lock(&self, user_id: UserId) -> OwnedMutexGuard<Conversation> {
        self.slot(user_id).lock_owned().await
    }

    /// Non-blocking variant of [`ConversationStore::lock`].
    pub fn try_lock(&self, user_id: UserId) -> Option<OwnedMutexGuard<Conversation>> {
        self.slot(user_id).try_lock_owned().ok()
    }

    /// A copy of the user's conversation, waiting for any in-flight turn.
    pub async fn snapshot(&self, user_id: UserId) -> Option<Conversation> {
        let slot = self.conversations.get(&user_id)?.value().clone();
        let guard = slot.lock().await;
        Some(guard.clone())
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.conversations.contains_key(&user_id)
    }

    /// Number of users with a conversation.
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Forget a user. A turn already holding the lock finishes on the
    /// detached conversation.
    pub fn remove(&self, user_id: UserId) -> bool {
        self.conversations.remove(&user_id).is_some()
    }

    pub fn clear(&self) {
        self.conversations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use std::time::Duration;

    #[tokio::test]
    async fn test_conversation_created_lazily() {
        let store = ConversationStore::new();
        assert!(store.is_empty());
        assert!(store.snapshot(1).await.is_none());

        {
            let mut conv = store.lock(1).await;
            conv.append_accounted(Message::user("hi"), 5);
        }
        assert!(store.contains(1));
        assert_eq!(store.len(), 1);
        let snap = store.snapshot(1).await.unwrap();
        assert_eq!(snap.total_tokens(), 5);
    }

    #[tokio::test]
    async fn test_same_user_is_serialized() {
        let store = ConversationStore::new();
        let guard = store.lock(7).await;
        assert!(store.try_lock(7).is_none());
        drop(guard);
        assert!(store.try_lock(7).is_some());
    }

    #[tokio::test]
    async fn test_distinct_users_do_not_contend() {
        let store = ConversationStore::new();
        let _a = store.lock(1).await;
        let b = tokio::time::timeout(Duration::from_millis(200), store.lock(2)).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let store = ConversationStore::new();
        drop(store.lock(1).await);
        drop(store.lock(2).await);
        assert!(store.remove(1));
        assert!(!store.remove(1));
        assert_eq!(store.len(), 1);
        store.clear();
        assert!(store.is_empty());
    }
}
