//! Runtime settings resolved from command-line flags and the environment.

use std::{path::PathBuf, time::Duration};

use clap::ValueEnum;
use serde::Serialize;

use crate::{
    chunking::ChunkStrategy,
    cli::Cli,
    corpus::Corpus,
    error::{Error, Result},
    generation::GenerationSettings,
    providers::{
        DEFAULT_GEMINI_EMBEDDING_MODEL,
        DEFAULT_GEMINI_MODEL,
        DEFAULT_OPENAI_EMBEDDING_MODEL,
        DEFAULT_OPENAI_MODEL,
        GEMINI_BASE_URL,
        HttpSettings,
        OPENAI_BASE_URL,
    },
};

/// Embedding and generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Gemini
    Gemini,
    /// OpenAI or any OpenAI-compatible endpoint
    #[value(name = "openai")]
    OpenAi,
    /// Hash embeddings and an echo generator; no network
    Offline,
}

impl Provider {
    /// Environment variables consulted, in order, when no explicit key is
    /// given.
    pub fn key_variables(self) -> &'static [&'static str] {
        match self {
            Self::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            Self::OpenAi => &["OPENAI_API_KEY"],
            Self::Offline => &[],
        }
    }

    pub fn needs_api_key(self) -> bool {
        !matches!(self, Self::Offline)
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Self::Gemini => GEMINI_BASE_URL,
            Self::OpenAi => OPENAI_BASE_URL,
            Self::Offline => "",
        }
    }

    fn default_embedding_model(self) -> &'static str {
        match self {
            Self::Gemini => DEFAULT_GEMINI_EMBEDDING_MODEL,
            Self::OpenAi => DEFAULT_OPENAI_EMBEDDING_MODEL,
            Self::Offline => "hash",
        }
    }

    fn default_generation_model(self) -> &'static str {
        match self {
            Self::Gemini => DEFAULT_GEMINI_MODEL,
            Self::OpenAi => DEFAULT_OPENAI_MODEL,
            Self::Offline => "echo",
        }
    }
}

/// Retrieval strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrieverKind {
    /// Nearest neighbors over chunk embeddings
    Embedding,
    /// Keyword matching against document keywords
    Keyword,
}

/// Where documents come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpusSource {
    Builtin,
    Path(PathBuf),
}

impl CorpusSource {
    pub fn load(&self) -> Result<Corpus> {
        match self {
            Self::Builtin => Ok(Corpus::builtin()),
            Self::Path(path) => Corpus::load(path),
        }
    }
}

/// Fully resolved and validated settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub corpus: CorpusSource,
    pub retriever: RetrieverKind,
    pub top_k: usize,
    pub min_score: Option<f32>,
    pub chunking: ChunkStrategy,
    pub embedding_model: String,
    pub generation_model: String,
    pub base_url: String,
    pub http: HttpSettings,
    pub generation: GenerationSettings,
    pub hash_dimension: usize,
}

impl Settings {
    /// Resolve settings from parsed flags, reading provider key variables
    /// from the process environment.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        Self::resolve_with(cli, |name| std::env::var(name).ok())
    }

    /// Like [`Settings::resolve`] with an injectable environment lookup.
    pub fn resolve_with<F>(cli: &Cli, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = cli.provider;
        let chunking = match cli.chunk_size {
            None => ChunkStrategy::Lines,
            Some(size) => ChunkStrategy::Window {
                size,
                overlap: cli.chunk_overlap,
            },
        };

        let settings = Self {
            provider,
            api_key: resolve_api_key(provider, cli.api_key.as_deref(), lookup),
            corpus: cli
                .corpus
                .clone()
                .map_or(CorpusSource::Builtin, CorpusSource::Path),
            retriever: cli.retriever,
            top_k: cli.top_k,
            min_score: cli.min_score,
            chunking,
            embedding_model: cli
                .embedding_model
                .clone()
                .unwrap_or_else(|| provider.default_embedding_model().to_string()),
            generation_model: cli.generation_model.clone().unwrap_or_else(|| {
                provider.default_generation_model().to_string()
            }),
            base_url: cli
                .base_url
                .clone()
                .unwrap_or_else(|| provider.default_base_url().to_string()),
            http: HttpSettings {
                timeout: Duration::from_secs(cli.timeout_secs),
                max_retries: cli.max_retries,
            },
            generation: GenerationSettings {
                temperature: cli.temperature,
                max_output_tokens: cli.max_output_tokens,
            },
            hash_dimension: cli.hash_dimension,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::InvalidTopK);
        }
        if let ChunkStrategy::Window { size, overlap } = self.chunking {
            if size == 0 {
                return Err(Error::Config(
                    "--chunk-size must be at least 1".to_string(),
                ));
            }
            if overlap >= size {
                return Err(Error::Config(format!(
                    "--chunk-overlap ({overlap}) must be smaller than --chunk-size ({size})"
                )));
            }
        }
        if let Some(min) = self.min_score
            && !(-1.0..=1.0).contains(&min)
        {
            return Err(Error::Config(format!(
                "--min-score must be within [-1, 1], got {min}"
            )));
        }
        if self.http.max_retries == 0 {
            return Err(Error::Config(
                "--max-retries must be at least 1".to_string(),
            ));
        }
        if self.http.timeout.is_zero() {
            return Err(Error::Config(
                "--timeout-secs must be at least 1".to_string(),
            ));
        }
        if self.hash_dimension == 0 {
            return Err(Error::Config(
                "--hash-dimension must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The API key, or a configuration error naming where it is read from.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            let vars = self.provider.key_variables().join(" or ");
            Error::Config(format!(
                "no API key for {:?}; pass --api-key or set GROUNDRAG_API_KEY or {vars}",
                self.provider
            ))
        })
    }
}

/// Pick the API key: the explicit value first, then the provider's
/// variables in order. Blank values count as unset.
pub fn resolve_api_key<F>(
    provider: Provider,
    explicit: Option<&str>,
    lookup: F,
) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if !provider.needs_api_key() {
        return None;
    }

    explicit
        .map(str::to_string)
        .into_iter()
        .chain(provider.key_variables().iter().filter_map(|v| lookup(v)))
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["groundrag"];
        argv.extend_from_slice(args);
        argv.push("chunks");
        Cli::parse_from(argv)
    }

    #[test]
    fn explicit_key_wins() {
        let key = resolve_api_key(Provider::Gemini, Some("flag"), |_| {
            Some("env".to_string())
        });
        assert_eq!(key.as_deref(), Some("flag"));
    }

    #[test]
    fn gemini_falls_back_through_variables() {
        let key = resolve_api_key(Provider::Gemini, None, |name| {
            (name == "GOOGLE_API_KEY").then(|| "google".to_string())
        });
        assert_eq!(key.as_deref(), Some("google"));

        let key = resolve_api_key(Provider::Gemini, Some("  "), |name| {
            (name == "GEMINI_API_KEY").then(|| "gemini".to_string())
        });
        assert_eq!(key.as_deref(), Some("gemini"));
    }

    #[test]
    fn openai_reads_its_own_variable() {
        let key = resolve_api_key(Provider::OpenAi, None, |name| {
            (name == "OPENAI_API_KEY").then(|| "sk-test".to_string())
        });
        assert_eq!(key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn offline_never_has_key() {
        assert_eq!(
            resolve_api_key(Provider::Offline, Some("x"), |_| None),
            None
        );
    }

    #[test]
    fn missing_key_is_reported_on_demand() {
        let settings =
            Settings::resolve_with(&cli(&["--provider", "gemini"]), no_env)
                .unwrap();
        let err = settings.require_api_key().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn provider_defaults() {
        let settings =
            Settings::resolve_with(&cli(&["--provider", "openai"]), no_env)
                .unwrap();
        assert_eq!(settings.base_url, OPENAI_BASE_URL);
        assert_eq!(settings.embedding_model, DEFAULT_OPENAI_EMBEDDING_MODEL);
        assert_eq!(settings.generation_model, DEFAULT_OPENAI_MODEL);
        assert_eq!(settings.corpus, CorpusSource::Builtin);
        assert_eq!(settings.chunking, ChunkStrategy::Lines);
        assert_eq!(settings.http, HttpSettings::default());
        assert_eq!(settings.generation, GenerationSettings::default());
    }

    #[test]
    fn window_chunking_from_flags() {
        let settings = Settings::resolve_with(
            &cli(&[
                "--provider",
                "offline",
                "--chunk-size",
                "100",
                "--chunk-overlap",
                "10",
            ]),
            no_env,
        )
        .unwrap();
        assert_eq!(
            settings.chunking,
            ChunkStrategy::Window {
                size: 100,
                overlap: 10
            }
        );
    }

    #[test]
    fn rejects_invalid_values() {
        let cases: &[&[&str]] = &[
            &["--top-k", "0"],
            &["--chunk-size", "0"],
            &["--chunk-size", "10", "--chunk-overlap", "10"],
            &["--max-retries", "0"],
            &["--hash-dimension", "0"],
            &["--timeout-secs", "0"],
            &["--min-score", "1.5"],
        ];
        for args in cases {
            let mut argv = vec!["--provider", "offline"];
            argv.extend_from_slice(args);
            assert!(
                Settings::resolve_with(&cli(&argv), no_env).is_err(),
                "{args:?} should be rejected"
            );
        }
    }
}
