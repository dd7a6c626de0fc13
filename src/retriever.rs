//! Query to ranked supporting chunks.
//!
//! Two implementations share the [`Retriever`] contract: embedding-based
//! nearest-neighbor retrieval over a [`VectorIndex`], and keyword matching.

use std::{cmp::Ordering, sync::Arc};

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    chunking::Chunk,
    embedding::{self, Embedder},
    error::{Error, Result},
    index::{SearchHit, VectorIndex},
};

/// A chunk selected for a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub ordinal: usize,
    /// Display form of the chunk id, e.g. `#a1b2c3`.
    pub id: String,
    pub document: String,
    pub text: String,
    pub score: f32,
}

impl RetrievedChunk {
    fn from_chunk(chunk: &Chunk, score: f32) -> Self {
        Self {
            ordinal: chunk.ordinal,
            id: chunk.id.to_string(),
            document: chunk.document.clone(),
            text: chunk.text.clone(),
            score,
        }
    }
}

/// Outcome of a retrieval.
///
/// `NoContext` is the explicit "fall back to an ungrounded prompt" signal;
/// `Context` always holds at least one chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    Context(Vec<RetrievedChunk>),
    NoContext,
}

impl Retrieval {
    pub fn from_chunks(chunks: Vec<RetrievedChunk>) -> Self {
        if chunks.is_empty() {
            Self::NoContext
        } else {
            Self::Context(chunks)
        }
    }

    pub fn chunks(&self) -> &[RetrievedChunk] {
        match self {
            Self::Context(chunks) => chunks,
            Self::NoContext => &[],
        }
    }

    /// Chunk texts in rank order, or `None` when there is no context.
    pub fn texts(&self) -> Option<Vec<&str>> {
        match self {
            Self::Context(chunks) => {
                Some(chunks.iter().map(|c| c.text.as_str()).collect())
            }
            Self::NoContext => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::NoContext)
    }
}

/// Text query to ranked chunks.
pub trait Retriever: Send + Sync {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Retrieval>;

    /// Every chunk this retriever can return, in ordinal order.
    fn chunks(&self) -> &[Chunk];

    fn name(&self) -> &'static str;
}

/// Options for [`EmbeddingRetriever`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddingOptions {
    /// Drop hits scoring below this cosine similarity. A hit scoring exactly
    /// the threshold is kept.
    pub min_score: Option<f32>,
}

/// Nearest-neighbor retrieval over chunk embeddings.
pub struct EmbeddingRetriever {
    chunks: Vec<Chunk>,
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    options: EmbeddingOptions,
}

impl EmbeddingRetriever {
    /// Embed every chunk in ordinal order and build the index.
    ///
    /// Any embedding failure aborts the build.
    pub fn build(
        chunks: Vec<Chunk>,
        embedder: Arc<dyn Embedder>,
        options: EmbeddingOptions,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(Error::EmptyCorpus);
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = embedding::embed_all(embedder.as_ref(), &texts)?;
        let index = VectorIndex::build(vectors)?;

        info!(
            chunks = chunks.len(),
            dimension = index.dimension(),
            embedder = embedder.name(),
            "vector index built"
        );

        Ok(Self {
            chunks,
            index,
            embedder,
            options,
        })
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Raw index hits for `query`, before the score threshold is applied.
    pub fn search_scores(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let query_vector = self.embedder.embed(query)?;
        self.index.search(&query_vector, top_k)
    }
}

impl Retriever for EmbeddingRetriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Retrieval> {
        let hits = self.search_scores(query, top_k)?;

        let retrieved: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter(|hit| {
                self.options.min_score.is_none_or(|min| hit.score >= min)
            })
            .filter_map(|hit| {
                self.chunks
                    .get(hit.row)
                    .map(|chunk| RetrievedChunk::from_chunk(chunk, hit.score))
            })
            .collect();

        debug!(
            query,
            top_k,
            returned = retrieved.len(),
            best = retrieved.first().map(|c| c.score),
            "embedding retrieval"
        );

        Ok(Retrieval::from_chunks(retrieved))
    }

    fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    fn name(&self) -> &'static str {
        "embedding"
    }
}

/// Keyword retrieval: a chunk matches when one of its keywords occurs in the
/// lowercased query. Chunks are ranked by the number of matching keywords.
pub struct KeywordRetriever {
    chunks: Vec<Chunk>,
}

impl KeywordRetriever {
    pub fn build(chunks: Vec<Chunk>) -> Result<Self> {
        if chunks.is_empty() {
            return Err(Error::EmptyCorpus);
        }
        if chunks.iter().all(|c| c.keywords.is_empty()) {
            return Err(Error::Config(
                "keyword retrieval needs documents with keywords".to_string(),
            ));
        }
        Ok(Self { chunks })
    }
}

impl Retriever for KeywordRetriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Retrieval> {
        if top_k == 0 {
            return Err(Error::InvalidTopK);
        }

        let query = query.to_lowercase();
        let mut matched: Vec<RetrievedChunk> = self
            .chunks
            .iter()
            .filter_map(|chunk| {
                let hits = chunk
                    .keywords
                    .iter()
                    .filter(|k| query.contains(k.as_str()))
                    .count();
                (hits > 0)
                    .then(|| RetrievedChunk::from_chunk(chunk, hits as f32))
            })
            .collect();

        matched.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.ordinal.cmp(&b.ordinal))
        });
        matched.truncate(top_k);

        debug!(query, returned = matched.len(), "keyword retrieval");
        Ok(Retrieval::from_chunks(matched))
    }

    fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}
