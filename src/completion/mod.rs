//! # Completion Boundary
//!
//! The relay does not speak HTTP to the model provider. Applications plug in
//! a [`CompletionBackend`] that sends the ordered messages and hands back
//! the reply plus the usage the provider reported.

use crate::types::Message;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Token usage as reported by the completion API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: usize,
    #[serde(default)]
    pub completion_tokens: usize,
    #[serde(default)]
    pub total_tokens: usize,
}

/// A single reply from the completion API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub message: Message,
    pub usage: Option<Usage>,
}

impl Completion {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// The reply's authoritative size, when the provider reported one.
    pub fn completion_tokens(&self) -> Option<usize> {
        self.usage.map(|u| u.completion_tokens)
    }

    /// Build from a chat-completions style response body
    /// (`choices[0].message` and an optional `usage` object).
    pub fn from_response(body: &serde_json::Value) -> Result<Self> {
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct Body {
            choices: Vec<Choice>,
            #[serde(default)]
            usage: Option<Usage>,
        }

        let body: Body = serde_json::from_value(body.clone())?;
        let choice = body.choices.into_iter().next().ok_or_else(|| {
            crate::Error::completion_with_context(
                "response contained no choices",
                crate::ErrorContext::new()
                    .with_field_path("choices")
                    .with_source("completion_response"),
            )
        })?;
        Ok(Self {
            message: choice.message,
            usage: body.usage,
        })
    }
}

/// Sends an ordered message list to a model and returns its reply.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, model: &str, messages: &[Message]) -> Result<Completion>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_response_reads_first_choice_and_usage() {
        let body = json!({
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "Hi there"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        });
        let completion = Completion::from_response(&body).unwrap();
        assert_eq!(completion.message, Message::assistant("Hi there"));
        assert_eq!(completion.completion_tokens(), Some(3));
    }

    #[test]
    fn test_from_response_without_usage() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "ok"}}]
        });
        let completion = Completion::from_response(&body).unwrap();
        assert_eq!(completion.completion_tokens(), None);
    }

    #[test]
    fn test_from_response_without_choices() {
        let body = json!({"choices": []});
        assert!(matches!(
            Completion::from_response(&body),
            Err(crate::Error::Completion { .. })
        ));
    }
}
