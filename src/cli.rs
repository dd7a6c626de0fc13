use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::config::{Provider, RetrieverKind};

#[derive(Debug, Parser)]
#[command(
    name = "groundrag",
    version,
    about = "Answer questions grounded in your own documents"
)]
pub struct Cli {
    /// Corpus file or directory (default: the built-in knowledge base)
    #[arg(long, env = "GROUNDRAG_CORPUS", global = true)]
    pub corpus: Option<PathBuf>,

    /// Embedding and generation backend
    #[arg(
        long,
        value_enum,
        env = "GROUNDRAG_PROVIDER",
        default_value_t = Provider::Gemini,
        global = true
    )]
    pub provider: Provider,

    /// API key for the provider (falls back to GEMINI_API_KEY,
    /// GOOGLE_API_KEY or OPENAI_API_KEY)
    #[arg(long, env = "GROUNDRAG_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Retrieval strategy
    #[arg(
        long,
        value_enum,
        default_value_t = RetrieverKind::Embedding,
        global = true
    )]
    pub retriever: RetrieverKind,

    /// Number of chunks to retrieve per query
    #[arg(short = 'k', long, default_value = "1", global = true)]
    pub top_k: usize,

    /// Drop retrieved chunks scoring below this cosine similarity
    #[arg(long, global = true)]
    pub min_score: Option<f32>,

    /// Cut documents into windows of this many characters instead of lines
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    /// Characters shared by adjacent windows (requires --chunk-size)
    #[arg(long, default_value = "0", requires = "chunk_size", global = true)]
    pub chunk_overlap: usize,

    /// Override the embedding model
    #[arg(long, global = true)]
    pub embedding_model: Option<String>,

    /// Override the generation model
    #[arg(long, global = true)]
    pub generation_model: Option<String>,

    /// Override the provider's API base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, default_value = "30", global = true)]
    pub timeout_secs: u64,

    /// Attempts per HTTP request, including the first
    #[arg(long, default_value = "3", global = true)]
    pub max_retries: usize,

    /// Sampling temperature for generation
    #[arg(long, default_value = "0.2", global = true)]
    pub temperature: f32,

    /// Upper bound on generated tokens
    #[arg(long, default_value = "512", global = true)]
    pub max_output_tokens: usize,

    /// Vector dimension of the offline hash embedder
    #[arg(long, default_value = "256", global = true)]
    pub hash_dimension: usize,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Answer one question
    Ask(AskArgs),
    /// Interactive question and answer session
    Chat,
    /// Show the chunks retrieved for a query, with scores
    Search(SearchArgs),
    /// Print the prompt that would be sent for a query
    Prompt(PromptArgs),
    /// List the corpus chunks
    Chunks(ChunksArgs),
    /// Start MCP server for AI agent integration
    Mcp,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Ask --

#[derive(Debug, Parser)]
pub struct AskArgs {
    /// The question
    pub query: String,

    /// Print the composed prompt to stderr before the answer
    #[arg(long)]
    pub show_prompt: bool,

    /// Output the answer and its context as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Prompt --

#[derive(Debug, Parser)]
pub struct PromptArgs {
    /// The question
    pub query: String,
}

// -- Chunks --

#[derive(Debug, Parser)]
pub struct ChunksArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "groundrag",
            &mut std::io::stdout(),
        );
    }
}
