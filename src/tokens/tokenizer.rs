//! Tokenizer implementations.

use crate::{Error, Result};
use once_cell::sync::{Lazy, OnceCell};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tiktoken_rs::tokenizer::{get_tokenizer, Tokenizer as ModelTokenizer};
use tiktoken_rs::CoreBPE;

/// A BPE encoding scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    O200kBase,
    Cl100kBase,
    P50kBase,
    P50kEdit,
    R50kBase,
}

impl Encoding {
    /// Used whenever a model has no known encoding.
    pub const DEFAULT: Encoding = Encoding::Cl100kBase;

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::O200kBase => "o200k_base",
            Encoding::Cl100kBase => "cl100k_base",
            Encoding::P50kBase => "p50k_base",
            Encoding::P50kEdit => "p50k_edit",
            Encoding::R50kBase => "r50k_base",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "o200k_base" => Some(Encoding::O200kBase),
            "cl100k_base" => Some(Encoding::Cl100kBase),
            "p50k_base" => Some(Encoding::P50kBase),
            "p50k_edit" => Some(Encoding::P50kEdit),
            "r50k_base" | "gpt2" => Some(Encoding::R50kBase),
            _ => None,
        }
    }

    /// Look up the encoding a model uses, falling back to [`Encoding::DEFAULT`].
    pub fn for_model(model: &str) -> Self {
        match Self::lookup_model(model) {
            Some(encoding) => encoding,
            None => {
                tracing::warn!(
                    model,
                    fallback = Encoding::DEFAULT.name(),
                    "model not found in encoding table, using fallback encoding"
                );
                Encoding::DEFAULT
            }
        }
    }

    /// Strict variant of [`Encoding::for_model`]: `None` on a miss.
    #[allow(unreachable_patterns)]
    pub fn lookup_model(model: &str) -> Option<Self> {
        get_tokenizer(model).map(|t| match t {
            ModelTokenizer::O200kBase => Encoding::O200kBase,
            ModelTokenizer::Cl100kBase => Encoding::Cl100kBase,
            ModelTokenizer::P50kBase => Encoding::P50kBase,
            ModelTokenizer::P50kEdit => Encoding::P50kEdit,
            ModelTokenizer::R50kBase | ModelTokenizer::Gpt2 => Encoding::R50kBase,
            _ => Encoding::DEFAULT,
        })
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Counts tokens of a text under an encoding. Implementations must be pure.
pub trait Tokenizer: Send + Sync {
    fn count(&self, text: &str, encoding: Encoding) -> Result<usize>;
}

impl<T: Tokenizer + ?Sized> Tokenizer for Arc<T> {
    fn count(&self, text: &str, encoding: Encoding) -> Result<usize> {
        (**self).count(text, encoding)
    }
}

static O200K: OnceCell<CoreBPE> = OnceCell::new();
static CL100K: OnceCell<CoreBPE> = OnceCell::new();
static P50K: OnceCell<CoreBPE> = OnceCell::new();
static P50K_EDIT: OnceCell<CoreBPE> = OnceCell::new();
static R50K: OnceCell<CoreBPE> = OnceCell::new();

/// Exact BPE token counts backed by `tiktoken-rs`.
///
/// Tables are loaded on first use of each encoding and shared across all
/// instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiktokenTokenizer;

impl TiktokenTokenizer {
    pub fn new() -> Self {
        Self
    }

    fn bpe(encoding: Encoding) -> Result<&'static CoreBPE> {
        let cell = match encoding {
            Encoding::O200kBase => &O200K,
            Encoding::Cl100kBase => &CL100K,
            Encoding::P50kBase => &P50K,
            Encoding::P50kEdit => &P50K_EDIT,
            Encoding::R50kBase => &R50K,
        };
        cell.get_or_try_init(|| {
            tracing::debug!(encoding = encoding.name(), "loading BPE table");
            Self::load(encoding).map_err(|e| Error::Tokenizer {
                encoding: encoding.name().to_string(),
                message: e.to_string(),
            })
        })
    }

    fn load(encoding: Encoding) -> anyhow::Result<CoreBPE> {
        match encoding {
            Encoding::O200kBase => tiktoken_rs::o200k_base(),
            Encoding::Cl100kBase => tiktoken_rs::cl100k_base(),
            Encoding::P50kBase => tiktoken_rs::p50k_base(),
            Encoding::P50kEdit => tiktoken_rs::p50k_edit(),
            Encoding::R50kBase => tiktoken_rs::r50k_base(),
        }
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn count(&self, text: &str, encoding: Encoding) -> Result<usize> {
        if text.is_empty() {
            return Ok(0);
        }
        Ok(Self::bpe(encoding)?.encode_ordinary(text).len())
    }
}

/// Fast character-based approximation, independent of the encoding.
#[derive(Debug, Clone)]
pub struct CharacterEstimator {
    chars_per_token: f64,
}

impl CharacterEstimator {
    pub fn new() -> Self {
        Self::with_ratio(4.0)
    }

    pub fn with_ratio(r: f64) -> Self {
        Self { chars_per_token: r }
    }
}

impl Default for CharacterEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for CharacterEstimator {
    fn count(&self, text: &str, _encoding: Encoding) -> Result<usize> {
        let chars = text.chars().count() as f64;
        Ok((chars / self.chars_per_token).ceil() as usize)
    }
}

/// Memoizes counts of an inner tokenizer, up to `max_size` distinct texts.
pub struct CachingTokenizer {
    inner: Box<dyn Tokenizer>,
    cache: RwLock<HashMap<(Encoding, String), usize>>,
    max_size: usize,
}

impl CachingTokenizer {
    pub fn new(inner: Box<dyn Tokenizer>, max_size: usize) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
            max_size,
        }
    }

    pub fn clear_cache(&self) {
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Tokenizer for CachingTokenizer {
    fn count(&self, text: &str, encoding: Encoding) -> Result<usize> {
        let key = (encoding, text.to_string());
        {
            let c = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(&n) = c.get(&key) {
                return Ok(n);
            }
        }
        let n = self.inner.count(text, encoding)?;
        {
            let mut c = self.cache.write().unwrap_or_else(|e| e.into_inner());
            if c.len() < self.max_size {
                c.insert(key, n);
            }
        }
        Ok(n)
    }
}

static DEFAULT_TOKENIZER: Lazy<Arc<dyn Tokenizer>> = Lazy::new(|| -> Arc<dyn Tokenizer> {
    Arc::new(CachingTokenizer::new(Box::new(TiktokenTokenizer::new()), 4096))
});

/// Process-wide tiktoken tokenizer with a bounded count cache.
pub fn default_tokenizer() -> Arc<dyn Tokenizer> {
    DEFAULT_TOKENIZER.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTokenizer {
        calls: Arc<AtomicUsize>,
    }

    impl Tokenizer for CountingTokenizer {
        fn count(&self, text: &str, _encoding: Encoding) -> Result<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.split_whitespace().count())
        }
    }

    #[test]
    fn test_encoding_names_round_trip() {
        for enc in [
            Encoding::O200kBase,
            Encoding::Cl100kBase,
            Encoding::P50kBase,
            Encoding::P50kEdit,
            Encoding::R50kBase,
        ] {
            assert_eq!(Encoding::from_name(enc.name()), Some(enc));
        }
        assert_eq!(Encoding::from_name("gpt2"), Some(Encoding::R50kBase));
        assert_eq!(Encoding::from_name("sentencepiece"), None);
    }

    #[test]
    fn test_chat_models_use_cl100k() {
        assert_eq!(Encoding::for_model("gpt-3.5-turbo-0613"), Encoding::Cl100kBase);
        assert_eq!(Encoding::for_model("gpt-4-0613"), Encoding::Cl100kBase);
    }

    #[test]
    fn test_unknown_model_falls_back_to_default() {
        assert_eq!(Encoding::lookup_model("claude-3"), None);
        assert_eq!(Encoding::for_model("claude-3"), Encoding::DEFAULT);
    }

    #[test]
    fn test_tiktoken_counts() {
        let tok = TiktokenTokenizer::new();
        assert_eq!(tok.count("", Encoding::Cl100kBase).unwrap(), 0);
        assert_eq!(tok.count("hello world", Encoding::Cl100kBase).unwrap(), 2);
        assert_eq!(tok.count("user", Encoding::Cl100kBase).unwrap(), 1);
        assert_eq!(tok.count("assistant", Encoding::Cl100kBase).unwrap(), 1);
    }

    #[test]
    fn test_tiktoken_is_deterministic() {
        let tok = TiktokenTokenizer::new();
        let text = "The quick brown fox jumps over the lazy dog.";
        let a = tok.count(text, Encoding::Cl100kBase).unwrap();
        let b = tok.count(text, Encoding::Cl100kBase).unwrap();
        assert_eq!(a, b);
        assert!(a > 0);
    }

    #[test]
    fn test_character_estimator_rounds_up() {
        let est = CharacterEstimator::with_ratio(4.0);
        assert_eq!(est.count("abcde", Encoding::DEFAULT).unwrap(), 2);
        assert_eq!(est.count("", Encoding::DEFAULT).unwrap(), 0);
    }

    #[test]
    fn test_caching_tokenizer_hits_inner_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let caching = CachingTokenizer::new(
            Box::new(CountingTokenizer {
                calls: calls.clone(),
            }),
            8,
        );
        assert_eq!(caching.count("a b c", Encoding::DEFAULT).unwrap(), 3);
        assert_eq!(caching.count("a b c", Encoding::DEFAULT).unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Same text under another encoding is a separate entry.
        caching.count("a b c", Encoding::P50kBase).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(caching.cached_entries(), 2);

        caching.clear_cache();
        assert_eq!(caching.cached_entries(), 0);
    }

    #[test]
    fn test_caching_tokenizer_respects_max_size() {
        let calls = Arc::new(AtomicUsize::new(0));
        let caching = CachingTokenizer::new(
            Box::new(CountingTokenizer {
                calls: calls.clone(),
            }),
            1,
        );
        caching.count("one", Encoding::DEFAULT).unwrap();
        caching.count("two", Encoding::DEFAULT).unwrap();
        caching.count("two", Encoding::DEFAULT).unwrap();
        assert_eq!(caching.cached_entries(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
