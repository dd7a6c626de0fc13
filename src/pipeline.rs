//! Retrieve, compose, generate.
//!
//! [`RagPipeline`] ties a built [`Retriever`] to a [`Generator`]. It is only
//! constructed from an already built retriever, so queries never observe a
//! partially built index. Collaborator failures during a query are logged
//! and turned into a fixed degraded [`Answer`]; they never abort the caller.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    config::{Provider, RetrieverKind, Settings},
    embedding::{Embedder, HashEmbedder},
    error::{Error, Result},
    generation::{EchoGenerator, Generator},
    prompt,
    providers::{GeminiEmbedder, GeminiGenerator, OpenAiEmbedder, OpenAiGenerator},
    retriever::{
        EmbeddingOptions,
        EmbeddingRetriever,
        KeywordRetriever,
        RetrievedChunk,
        Retrieval,
        Retriever,
    },
};

/// Reply used when the query could not be searched.
pub const RETRIEVAL_FAILED_MESSAGE: &str =
    "Sorry, I couldn't search the knowledge base for that question. Please try again.";

/// Reply used when the model could not produce an answer.
pub const GENERATION_FAILED_MESSAGE: &str =
    "Sorry, I couldn't generate an answer right now. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// Generated from retrieved context.
    Grounded,
    /// Nothing relevant was retrieved; the raw query was sent.
    Ungrounded,
    /// The query could not be embedded or searched. The generator was not
    /// called.
    RetrievalFailed,
    /// Context was retrieved but generation failed.
    GenerationFailed,
}

impl AnswerOutcome {
    pub fn is_failure(self) -> bool {
        matches!(self, Self::RetrievalFailed | Self::GenerationFailed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub outcome: AnswerOutcome,
    /// Chunks the prompt was built from, in rank order.
    pub context: Vec<RetrievedChunk>,
    /// The prompt sent to the generator, if one was composed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl Answer {
    fn failed(outcome: AnswerOutcome, message: &str) -> Self {
        Self {
            text: message.to_string(),
            outcome,
            context: Vec::new(),
            prompt: None,
        }
    }

    pub fn is_grounded(&self) -> bool {
        self.outcome == AnswerOutcome::Grounded
    }
}

pub struct RagPipeline {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    top_k: usize,
}

impl RagPipeline {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        top_k: usize,
    ) -> Result<Self> {
        if top_k == 0 {
            return Err(Error::InvalidTopK);
        }
        Ok(Self {
            retriever,
            generator,
            top_k,
        })
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn retriever(&self) -> &dyn Retriever {
        self.retriever.as_ref()
    }

    pub fn generator(&self) -> &dyn Generator {
        self.generator.as_ref()
    }

    /// Retrieve with the configured `top_k`.
    pub fn retrieve(&self, query: &str) -> Result<Retrieval> {
        self.retriever.retrieve(query, self.top_k)
    }

    /// Retrieve and compose, without generating.
    pub fn prompt(&self, query: &str) -> Result<String> {
        let retrieval = self.retrieve(query)?;
        Ok(prompt::compose(query, retrieval.texts().as_deref()))
    }

    /// Answer with the configured `top_k`.
    pub fn answer(&self, query: &str) -> Answer {
        self.answer_with(query, self.top_k)
    }

    /// Answer one query.
    ///
    /// A retrieval error yields [`RETRIEVAL_FAILED_MESSAGE`] without calling
    /// the generator. An empty retrieval sends the query as is. A generation
    /// error yields [`GENERATION_FAILED_MESSAGE`].
    pub fn answer_with(&self, query: &str, top_k: usize) -> Answer {
        let retrieval = match self.retriever.retrieve(query, top_k) {
            Ok(retrieval) => retrieval,
            Err(e) => {
                warn!(
                    retriever = self.retriever.name(),
                    error = %e,
                    "retrieval failed"
                );
                return Answer::failed(
                    AnswerOutcome::RetrievalFailed,
                    RETRIEVAL_FAILED_MESSAGE,
                );
            }
        };

        let outcome = if retrieval.is_empty() {
            AnswerOutcome::Ungrounded
        } else {
            AnswerOutcome::Grounded
        };
        let prompt = prompt::compose(query, retrieval.texts().as_deref());
        debug!(?outcome, context = retrieval.chunks().len(), "prompt composed");

        let context = match retrieval {
            Retrieval::Context(chunks) => chunks,
            Retrieval::NoContext => Vec::new(),
        };

        match self.generator.generate(&prompt) {
            Ok(text) => Answer {
                text,
                outcome,
                context,
                prompt: Some(prompt),
            },
            Err(e) => {
                warn!(
                    generator = self.generator.name(),
                    error = %e,
                    "generation failed"
                );
                Answer {
                    text: GENERATION_FAILED_MESSAGE.to_string(),
                    outcome: AnswerOutcome::GenerationFailed,
                    context,
                    prompt: Some(prompt),
                }
            }
        }
    }
}

/// Load the corpus, build the retriever and connect the generator.
///
/// The generator is created first so a missing API key is reported before
/// any document is embedded.
pub fn build_pipeline(settings: &Settings) -> Result<RagPipeline> {
    let generator = build_generator(settings)?;

    let corpus = settings.corpus.load()?;
    if settings.retriever == RetrieverKind::Keyword && !corpus.has_keywords() {
        return Err(Error::Config(
            "keyword retrieval needs a corpus with keywords (a JSON corpus \
             or the built-in one); use --retriever embedding"
                .to_string(),
        ));
    }
    let chunks = corpus.chunks(settings.chunking)?;
    info!(
        documents = corpus.len(),
        chunks = chunks.len(),
        "corpus loaded"
    );

    let retriever: Arc<dyn Retriever> = match settings.retriever {
        RetrieverKind::Keyword => Arc::new(KeywordRetriever::build(chunks)?),
        RetrieverKind::Embedding => Arc::new(EmbeddingRetriever::build(
            chunks,
            build_embedder(settings)?,
            EmbeddingOptions {
                min_score: settings.min_score,
            },
        )?),
    };

    RagPipeline::new(retriever, generator, settings.top_k)
}

pub fn build_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    Ok(match settings.provider {
        Provider::Gemini => Arc::new(GeminiEmbedder::new(
            settings.require_api_key()?,
            &settings.base_url,
            &settings.embedding_model,
            settings.http,
        )?),
        Provider::OpenAi => Arc::new(OpenAiEmbedder::new(
            settings.require_api_key()?,
            &settings.base_url,
            &settings.embedding_model,
            settings.http,
        )?),
        Provider::Offline => {
            Arc::new(HashEmbedder::new(settings.hash_dimension))
        }
    })
}

pub fn build_generator(settings: &Settings) -> Result<Arc<dyn Generator>> {
    Ok(match settings.provider {
        Provider::Gemini => Arc::new(GeminiGenerator::new(
            settings.require_api_key()?,
            &settings.base_url,
            &settings.generation_model,
            settings.generation,
            settings.http,
        )?),
        Provider::OpenAi => Arc::new(OpenAiGenerator::new(
            settings.require_api_key()?,
            &settings.base_url,
            &settings.generation_model,
            settings.generation,
            settings.http,
        )?),
        Provider::Offline => Arc::new(EchoGenerator),
    })
}
