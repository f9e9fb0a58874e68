//! Environment-driven relay configuration.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `MODEL` | `gpt-3.5-turbo` | Model identifier sent to the completion API |
//! | `MAX_TOKENS` | `4096` | Token budget per conversation |
//! | `USER_IDS` | empty | Comma-separated private chat ids allowed to talk to the bot |
//! | `GROUP_IDS` | empty | Comma-separated supergroup ids allowed to talk to the bot |
//! | `BOT_USERNAME` | unset | Handle that must be mentioned in supergroups |

use crate::access::AccessPolicy;
use crate::{Error, ErrorContext, Result};
use std::env;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_MAX_TOKENS: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub model: String,
    pub max_tokens: usize,
    pub user_ids: Vec<i64>,
    pub group_ids: Vec<i64>,
    pub bot_username: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            user_ids: Vec::new(),
            group_ids: Vec::new(),
            bot_username: None,
        }
    }
}

impl RelayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut cfg = Self::default();
        if let Some(model) = get("MODEL") {
            cfg.model = model;
        }
        if let Some(raw) = get("MAX_TOKENS") {
            cfg.max_tokens = match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(Error::configuration_with_context(
                        "MAX_TOKENS must be a positive integer",
                        ErrorContext::new()
                            .with_field_path("MAX_TOKENS")
                            .with_details(format!("got '{}'", raw))
                            .with_source("config_loader"),
                    ))
                }
            };
        }
        if let Some(raw) = get("USER_IDS") {
            cfg.user_ids = parse_id_list("USER_IDS", &raw)?;
        }
        if let Some(raw) = get("GROUP_IDS") {
            cfg.group_ids = parse_id_list("GROUP_IDS", &raw)?;
        }
        cfg.bot_username = get("BOT_USERNAME");
        Ok(cfg)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_user_ids(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.user_ids = ids.into_iter().collect();
        self
    }

    pub fn with_group_ids(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.group_ids = ids.into_iter().collect();
        self
    }

    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    pub fn access_policy(&self) -> AccessPolicy {
        let policy = AccessPolicy::new()
            .with_user_ids(self.user_ids.iter().copied())
            .with_group_ids(self.group_ids.iter().copied());
        match &self.bot_username {
            Some(name) => policy.with_bot_username(name.clone()),
            None => policy,
        }
    }
}

fn parse_id_list(key: &str, raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|_| {
                Error::configuration_with_context(
                    format!("{} must be a comma-separated list of integer ids", key),
                    ErrorContext::new()
                        .with_field_path(key)
                        .with_details(format!("invalid id '{}'", s))
                        .with_source("config_loader"),
                )
            })
        })
        .collect()
}
