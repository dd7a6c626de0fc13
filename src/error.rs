pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("corpus produced no chunks; nothing can be retrieved")]
    EmptyCorpus,

    #[error("cannot build a vector index from zero vectors")]
    EmptyIndex,

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid vector at row {row}: {reason}")]
    InvalidVector { row: usize, reason: &'static str },

    #[error("top_k must be at least 1")]
    InvalidTopK,

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("generation failed: {0}")]
    Generation(String),
}
