//! # Access Policy
//!
//! Decides which inbound chat messages the relay answers. Private chats are
//! answered for allow-listed chat ids; supergroups only for allow-listed
//! groups and only when the bot is mentioned. Everything else is ignored.

use crate::conversation::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Kind of chat an inbound message arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

/// The parts of a platform update the relay needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub chat_kind: ChatKind,
    /// Keys the conversation; in groups every member gets their own window.
    pub sender_id: UserId,
    pub message_id: i64,
    pub text: String,
}

impl InboundMessage {
    pub fn private(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            chat_kind: ChatKind::Private,
            sender_id: chat_id,
            message_id: 0,
            text: text.into(),
        }
    }

    pub fn in_chat(
        chat_id: i64,
        chat_kind: ChatKind,
        sender_id: UserId,
        text: impl Into<String>,
    ) -> Self {
        Self {
            chat_id,
            chat_kind,
            sender_id,
            message_id: 0,
            text: text.into(),
        }
    }

    pub fn with_message_id(mut self, message_id: i64) -> Self {
        self.message_id = message_id;
        self
    }
}

/// Why a message was not answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    UnknownUser,
    UnknownGroup,
    NotMentioned,
    UnsupportedChat(ChatKind),
}

#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    user_ids: HashSet<i64>,
    group_ids: HashSet<i64>,
    bot_username: Option<String>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_ids(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.user_ids.extend(ids);
        self
    }

    pub fn with_group_ids(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.group_ids.extend(ids);
        self
    }

    /// The bot's handle, with or without the leading `@`.
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        let username = username.into();
        self.bot_username = Some(username.trim_start_matches('@').to_string());
        self
    }

    pub fn check(&self, msg: &InboundMessage) -> Result<(), Denial> {
        match msg.chat_kind {
            ChatKind::Private => {
                if self.user_ids.contains(&msg.chat_id) {
                    Ok(())
                } else {
                    Err(Denial::UnknownUser)
                }
            }
            ChatKind::Supergroup => {
                if !self.group_ids.contains(&msg.chat_id) {
                    return Err(Denial::UnknownGroup);
                }
                if self.mentions_bot(&msg.text) {
                    Ok(())
                } else {
                    Err(Denial::NotMentioned)
                }
            }
            other => Err(Denial::UnsupportedChat(other)),
        }
    }

    pub fn is_authorized(&self, msg: &InboundMessage) -> bool {
        self.check(msg).is_ok()
    }

    fn mentions_bot(&self, text: &str) -> bool {
        match &self.bot_username {
            Some(name) => text.contains(&format!("@{}", name)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AccessPolicy {
        AccessPolicy::new()
            .with_user_ids([100, 200])
            .with_group_ids([-1001])
            .with_bot_username("@relay_bot")
    }

    #[test]
    fn test_private_chat_allow_list() {
        let p = policy();
        assert!(p.is_authorized(&InboundMessage::private(100, "hi")));
        assert_eq!(
            p.check(&InboundMessage::private(300, "hi")),
            Err(Denial::UnknownUser)
        );
    }

    #[test]
    fn test_supergroup_requires_mention() {
        let p = policy();
        let mentioned = InboundMessage::in_chat(-1001, ChatKind::Supergroup, 5, "@relay_bot hello");
        let silent = InboundMessage::in_chat(-1001, ChatKind::Supergroup, 5, "hello all");
        assert!(p.is_authorized(&mentioned));
        assert_eq!(p.check(&silent), Err(Denial::NotMentioned));
    }

    #[test]
    fn test_unknown_supergroup_denied() {
        let p = policy();
        let msg = InboundMessage::in_chat(-2002, ChatKind::Supergroup, 5, "@relay_bot hello");
        assert_eq!(p.check(&msg), Err(Denial::UnknownGroup));
    }

    #[test]
    fn test_plain_groups_and_channels_denied() {
        let p = policy();
        let msg = InboundMessage::in_chat(-1001, ChatKind::Group, 5, "@relay_bot hello");
        assert_eq!(
            p.check(&msg),
            Err(Denial::UnsupportedChat(ChatKind::Group))
        );
    }

    #[test]
    fn test_without_bot_username_groups_never_match() {
        let p = AccessPolicy::new().with_group_ids([-1001]);
        let msg = InboundMessage::in_chat(-1001, ChatKind::Supergroup, 5, "@anyone hi");
        assert!(!p.is_authorized(&msg));
    }
}
