//! Chat message format shared with the completion API.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A role-tagged chat message.
///
/// Serializes to the completion API's wire shape: `{"role", "content"}` plus
/// `"name"` only when one is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: String,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, text)
    }

    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            name: None,
            content: content.into(),
        }
    }

    /// Attach a participant name. The upstream drops the role token when a
    /// name is present, which the cost profiles account for.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    /// The role exactly as it appears on the wire (and is tokenized).
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_name_is_omitted_when_absent() {
        let value = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(value, json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn test_name_is_serialized_when_present() {
        let value = serde_json::to_value(Message::system("be brief").with_name("ops")).unwrap();
        assert_eq!(
            value,
            json!({"role": "system", "name": "ops", "content": "be brief"})
        );
    }

    #[test]
    fn test_deserialize_upstream_reply() {
        let msg: Message =
            serde_json::from_value(json!({"role": "assistant", "content": "Hello!"})).unwrap();
        assert_eq!(msg, Message::assistant("Hello!"));
        assert!(!msg.is_user());
    }
}
