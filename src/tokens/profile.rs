//! Per-model framing overheads and the ordered rules that select them.

use super::tokenizer::Encoding;
use crate::{Error, ErrorContext, Result};
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;

/// Alias chains longer than this are treated as a misconfigured rule set.
const MAX_ALIAS_DEPTH: usize = 4;

/// Fixed token overheads of a chat message format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingCosts {
    /// Added once for every message.
    pub tokens_per_message: usize,
    /// Added when a message carries a `name`. May be negative: some formats
    /// drop the role token when a name is present.
    pub tokens_per_name: i64,
    /// Added once per completion request for the reply-start marker.
    pub tokens_per_reply_priming: usize,
}

impl FramingCosts {
    /// `<|start|>{role/name}\n{content}<|end|>\n`, reply primed with
    /// `<|start|>assistant<|message|>`.
    pub const CHAT: FramingCosts = FramingCosts {
        tokens_per_message: 3,
        tokens_per_name: 1,
        tokens_per_reply_priming: 3,
    };

    /// `<im_start>{role/name}\n{content}<im_end>\n`, reply primed with
    /// `<im_start>assistant`.
    pub const CHATML_LEGACY: FramingCosts = FramingCosts {
        tokens_per_message: 4,
        tokens_per_name: -1,
        tokens_per_reply_priming: 2,
    };
}

/// Cost parameters for one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCostProfile {
    /// The identifier the profile was resolved for (after alias resolution).
    pub model: String,
    pub tokens_per_message: usize,
    pub tokens_per_name: i64,
    pub tokens_per_reply_priming: usize,
    pub encoding: Encoding,
}

impl ModelCostProfile {
    pub fn new(model: impl Into<String>, framing: FramingCosts, encoding: Encoding) -> Self {
        Self {
            model: model.into(),
            tokens_per_message: framing.tokens_per_message,
            tokens_per_name: framing.tokens_per_name,
            tokens_per_reply_priming: framing.tokens_per_reply_priming,
            encoding,
        }
    }

    pub fn framing(&self) -> FramingCosts {
        FramingCosts {
            tokens_per_message: self.tokens_per_message,
            tokens_per_name: self.tokens_per_name,
            tokens_per_reply_priming: self.tokens_per_reply_priming,
        }
    }
}

/// Decides whether a rule applies to a model identifier.
#[derive(Clone)]
pub enum ModelMatcher {
    Exact(Vec<String>),
    Contains(String),
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl ModelMatcher {
    pub fn exact<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ModelMatcher::Exact(models.into_iter().map(Into::into).collect())
    }

    pub fn contains(fragment: impl Into<String>) -> Self {
        ModelMatcher::Contains(fragment.into())
    }

    pub fn predicate(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        ModelMatcher::Predicate(Arc::new(f))
    }

    pub fn matches(&self, model: &str) -> bool {
        match self {
            ModelMatcher::Exact(models) => models.iter().any(|m| m == model),
            ModelMatcher::Contains(fragment) => model.contains(fragment.as_str()),
            ModelMatcher::Predicate(f) => f(model),
        }
    }
}

impl fmt::Debug for ModelMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelMatcher::Exact(models) => f.debug_tuple("Exact").field(models).finish(),
            ModelMatcher::Contains(fragment) => f.debug_tuple("Contains").field(fragment).finish(),
            ModelMatcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// What a matching rule yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleResolution {
    /// Use these overheads. The encoding is looked up from the model unless
    /// overridden.
    Framing {
        costs: FramingCosts,
        encoding: Option<Encoding>,
    },
    /// Resolve as another (pinned) model identifier, with a warning.
    Alias { canonical: String },
}

#[derive(Debug, Clone)]
pub struct ProfileRule {
    pub name: String,
    pub matcher: ModelMatcher,
    pub resolution: RuleResolution,
}

impl ProfileRule {
    pub fn framing(name: impl Into<String>, matcher: ModelMatcher, costs: FramingCosts) -> Self {
        Self {
            name: name.into(),
            matcher,
            resolution: RuleResolution::Framing {
                costs,
                encoding: None,
            },
        }
    }

    pub fn alias(
        name: impl Into<String>,
        matcher: ModelMatcher,
        canonical: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            matcher,
            resolution: RuleResolution::Alias {
                canonical: canonical.into(),
            },
        }
    }

    /// Pin the encoding instead of looking it up from the model.
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        if let RuleResolution::Framing {
            encoding: ref mut slot,
            ..
        } = self.resolution
        {
            *slot = Some(encoding);
        }
        self
    }
}

/// Ordered rule list; the first matching rule wins.
#[derive(Debug, Clone)]
pub struct ProfileResolver {
    rules: Vec<ProfileRule>,
}

impl ProfileResolver {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// OpenAI chat models: exact pinned snapshots, then family fallbacks.
    pub fn openai() -> Self {
        Self::empty()
            .with_rule(ProfileRule::framing(
                "chat-format snapshots",
                ModelMatcher::exact([
                    "gpt-3.5-turbo-0613",
                    "gpt-3.5-turbo-16k-0613",
                    "gpt-4-0314",
                    "gpt-4-32k-0314",
                    "gpt-4-0613",
                    "gpt-4-32k-0613",
                    "gpt-4-1106-preview",
                ]),
                FramingCosts::CHAT,
            ))
            .with_rule(ProfileRule::framing(
                "chatml snapshot",
                ModelMatcher::exact(["gpt-3.5-turbo-0301"]),
                FramingCosts::CHATML_LEGACY,
            ))
            .with_rule(ProfileRule::alias(
                "gpt-3.5-turbo family",
                ModelMatcher::contains("gpt-3.5-turbo"),
                "gpt-3.5-turbo-0613",
            ))
            .with_rule(ProfileRule::alias(
                "gpt-4 family",
                ModelMatcher::contains("gpt-4"),
                "gpt-4-0613",
            ))
    }

    /// Append a rule; it is consulted after every existing rule.
    pub fn with_rule(mut self, rule: ProfileRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Insert a rule ahead of every existing rule.
    pub fn with_rule_first(mut self, rule: ProfileRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    pub fn rules(&self) -> &[ProfileRule] {
        &self.rules
    }

    pub fn matching_rule(&self, model: &str) -> Option<&ProfileRule> {
        self.rules.iter().find(|r| r.matcher.matches(model))
    }

    pub fn resolve(&self, model: &str) -> Result<ModelCostProfile> {
        let mut current = model.to_string();
        for _ in 0..=MAX_ALIAS_DEPTH {
            let rule = self
                .matching_rule(&current)
                .ok_or_else(|| Error::unsupported_model(model))?;
            match &rule.resolution {
                RuleResolution::Framing { costs, encoding } => {
                    let encoding = encoding.unwrap_or_else(|| Encoding::for_model(&current));
                    return Ok(ModelCostProfile::new(current, *costs, encoding));
                }
                RuleResolution::Alias { canonical } => {
                    tracing::warn!(
                        model = %current,
                        assumed = %canonical,
                        rule = %rule.name,
                        "model may update over time, counting tokens as the pinned snapshot"
                    );
                    current = canonical.clone();
                }
            }
        }
        Err(Error::validation_with_context(
            "profile alias chain is too deep",
            ErrorContext::new()
                .with_field_path("model")
                .with_details(format!("{} (stopped at {})", model, current))
                .with_source("profile_resolver"),
        ))
    }
}

impl Default for ProfileResolver {
    fn default() -> Self {
        Self::openai()
    }
}

static DEFAULT_RESOLVER: Lazy<ProfileResolver> = Lazy::new(ProfileResolver::openai);

/// Resolve a profile with the built-in OpenAI rules.
pub fn resolve_profile(model: &str) -> Result<ModelCostProfile> {
    DEFAULT_RESOLVER.resolve(model)
}
