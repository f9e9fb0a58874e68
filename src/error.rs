use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "MAX_TOKENS", "messages[0].content")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "config_loader", "completion_backend")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the relay.
#[derive(Debug, Error)]
pub enum Error {
    /// No cost profile rule matched the model identifier.
    #[error("Unsupported model: token accounting is not implemented for model {model}")]
    UnsupportedModel { model: String },

    #[error("Tokenizer error ({encoding}): {message}")]
    Tokenizer { encoding: String, message: String },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Completion error: {message}{}", format_context(.context))]
    Completion {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn unsupported_model(model: impl Into<String>) -> Self {
        Error::UnsupportedModel {
            model: model.into(),
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new completion error with structured context
    pub fn completion_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Completion {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Completion { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Whether the failure is tied to the request and should not be retried as-is.
    pub fn is_fatal_for_request(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedModel { .. } | Error::Validation { .. } | Error::Configuration { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_model_names_the_model() {
        let err = Error::unsupported_model("claude-3");
        assert!(err.to_string().contains("claude-3"));
        assert!(err.is_fatal_for_request());
        assert!(err.context().is_none());
    }

    #[test]
    fn test_context_is_rendered() {
        let err = Error::configuration_with_context(
            "MAX_TOKENS must be a positive integer",
            ErrorContext::new()
                .with_field_path("MAX_TOKENS")
                .with_details("got 'lots'"),
        );
        let rendered = err.to_string();
        assert!(rendered.contains("field: MAX_TOKENS"));
        assert!(rendered.contains("details: got 'lots'"));
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("MAX_TOKENS")
        );
    }

    #[test]
    fn test_completion_error_is_retryable() {
        let err = Error::completion_with_context("rate limited", ErrorContext::default());
        assert!(!err.is_fatal_for_request());
    }
}
