use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use tracing::debug;

use crate::error::{Error, Result};

/// Default dimension of [`HashEmbedder`] vectors.
pub const DEFAULT_HASH_DIMENSION: usize = 256;

/// Text to fixed-dimension vector.
///
/// Implementations must return vectors of one fixed dimension and, for
/// batches, exactly one vector per input in input order.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts. Output order matches input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?.pop().ok_or_else(|| {
            Error::Embedding("embedder returned no vector".to_string())
        })
    }

    /// Largest batch a single `embed_batch` call accepts.
    fn max_batch_size(&self) -> usize {
        100
    }

    /// Short identifier for logs.
    fn name(&self) -> &str;
}

/// Embed `texts` in order, issuing batches no larger than the embedder's
/// limit, and check that one vector came back per input.
pub fn embed_all(embedder: &dyn Embedder, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
    let batch_size = embedder.max_batch_size().max(1);
    let mut vectors = Vec::with_capacity(texts.len());

    for (i, batch) in texts.chunks(batch_size).enumerate() {
        debug!(
            embedder = embedder.name(),
            batch = i,
            size = batch.len(),
            "embedding batch"
        );
        let embedded = embedder.embed_batch(batch)?;
        if embedded.len() != batch.len() {
            return Err(Error::Embedding(format!(
                "{} returned {} vectors for {} inputs",
                embedder.name(),
                embedded.len(),
                batch.len()
            )));
        }
        vectors.extend(embedded);
    }

    Ok(vectors)
}

/// Offline embedder based on feature hashing.
///
/// Each lowercased alphanumeric token is hashed into one of `dimension`
/// buckets with a hash-derived sign. Texts sharing tokens get a positive
/// inner product; the output is deterministic for a given build of the
/// binary. Text without any token embeds to the zero vector.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMENSION)
    }
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let h = hasher.finish();
            let bucket = (h % self.dimension as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        vector
    }
}

impl Embedder for HashEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn max_batch_size(&self) -> usize {
        usize::MAX
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// Lowercased alphanumeric tokens.
pub(crate) fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}
