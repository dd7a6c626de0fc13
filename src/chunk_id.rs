use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

/// A chunk identifier derived from (document label, position in document).
///
/// Stable for a given corpus snapshot: rebuilding from the same documents
/// yields the same ids. It is a display/diagnostic handle only; the index
/// correlates rows to chunks by ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkId {
    pub numeric: u64,
    /// Short hex form for humans (e.g. "a1b2c3").
    pub short: String,
}

impl ChunkId {
    pub fn new(document: &str, position: usize) -> Self {
        let numeric = Self::hash_pair(document, position);
        let short = Self::short_hex(numeric, 6);
        Self { numeric, short }
    }

    fn hash_pair(document: &str, position: usize) -> u64 {
        let mut hasher = DefaultHasher::new();
        document.hash(&mut hasher);
        position.hash(&mut hasher);
        hasher.finish()
    }

    fn short_hex(value: u64, len: usize) -> String {
        let full = format!("{value:016x}");
        full[..len].to_string()
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.short)
    }
}
