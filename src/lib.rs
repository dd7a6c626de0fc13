//! groundrag - retrieval-augmented answers grounded in a small document
//! corpus.
//!
//! Documents are cut into chunks, embedded once into an in-memory
//! [`VectorIndex`], and searched by cosine similarity for every question.
//! The best chunks are placed into a prompt that restricts the model to that
//! context and names a fixed refusal sentence for questions the context does
//! not answer.
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//!
//! use groundrag::{
//!     Corpus, EchoGenerator, EmbeddingOptions, EmbeddingRetriever,
//!     HashEmbedder, RagPipeline,
//!     chunking::ChunkStrategy,
//! };
//!
//! let chunks = Corpus::builtin().chunks(ChunkStrategy::Lines).unwrap();
//! let retriever = EmbeddingRetriever::build(
//!     chunks,
//!     Arc::new(HashEmbedder::default()),
//!     EmbeddingOptions::default(),
//! )
//! .unwrap();
//! let pipeline =
//!     RagPipeline::new(Arc::new(retriever), Arc::new(EchoGenerator), 1).unwrap();
//!
//! let answer = pipeline.answer("How much does cloud storage cost?");
//! assert!(answer.is_grounded());
//! ```

pub mod chunk_id;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod history;
pub mod index;
pub mod mcp;
pub mod pipeline;
pub mod prompt;
pub mod providers;
pub mod repl;
pub mod retriever;

pub use chunk_id::ChunkId;
pub use config::Settings;
pub use corpus::{Corpus, Document};
pub use embedding::{Embedder, HashEmbedder};
pub use error::{Error, Result};
pub use generation::{EchoGenerator, Generator};
pub use index::VectorIndex;
pub use pipeline::{Answer, AnswerOutcome, RagPipeline, build_pipeline};
pub use retriever::{
    EmbeddingOptions,
    EmbeddingRetriever,
    KeywordRetriever,
    Retrieval,
    Retriever,
};
