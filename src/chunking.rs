//! Splitting documents into retrieval units.
//!
//! The default strategy is line based: every non-blank line of a document
//! becomes one chunk, trimmed, with no overlap and no length bound. A
//! character-window strategy with optional overlap is available for corpora
//! whose formatting produces very long lines.

use crate::{chunk_id::ChunkId, corpus::Document, error::Error, error::Result};

/// How documents are cut into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkStrategy {
    /// One chunk per non-blank line.
    #[default]
    Lines,
    /// Character windows of at most `size` chars, adjacent windows sharing
    /// `overlap` chars.
    Window { size: usize, overlap: usize },
}

/// A retrievable unit of text.
///
/// `ordinal` is the chunk's position in corpus-wide ingestion order and is
/// the row it occupies in the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: ChunkId,
    pub ordinal: usize,
    /// Label of the source document.
    pub document: String,
    pub text: String,
    /// Keywords inherited from the source document.
    pub keywords: Vec<String>,
}

/// Split text on line boundaries, trimming each piece and dropping blanks.
///
/// # Examples
///
/// ```
/// use groundrag::chunking::split;
///
/// let pieces = split("  alpha \n\n\tbeta\r\n   \n");
/// assert_eq!(pieces, vec!["alpha", "beta"]);
/// ```
pub fn split(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Chunk every document in order, assigning corpus-wide ordinals.
///
/// Returns [`Error::EmptyCorpus`] when no document yields a chunk.
pub fn chunk_documents(
    documents: &[Document],
    strategy: ChunkStrategy,
) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();

    for doc in documents {
        let pieces = match strategy {
            ChunkStrategy::Lines => split(&doc.text),
            ChunkStrategy::Window { size, overlap } => {
                chunk_text(&doc.text, size, overlap)
                    .into_iter()
                    .map(|w| w.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            }
        };

        for (position, text) in pieces.into_iter().enumerate() {
            chunks.push(Chunk {
                id: ChunkId::new(&doc.label, position),
                ordinal: chunks.len(),
                document: doc.label.clone(),
                text,
                keywords: doc.keywords.clone(),
            });
        }
    }

    if chunks.is_empty() {
        return Err(Error::EmptyCorpus);
    }

    Ok(chunks)
}

/// Split text into (optionally overlapping) character windows.
///
/// If the text is no longer than `chunk_size`, returns a single window.
/// Window ends are pulled back to the nearest whitespace when one exists in
/// the last 100 chars, and the next window starts `overlap` chars before
/// that end. Every char of `text` lands in at least one window. UTF-8 safe.
///
/// # Examples
///
/// ```
/// use groundrag::chunking::chunk_text;
///
/// let windows = chunk_text("Hello, world!", 1000, 0);
/// assert_eq!(windows, vec!["Hello, world!"]);
///
/// let text = "word ".repeat(500);
/// assert!(chunk_text(&text, 1000, 200).len() >= 2);
/// ```
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let char_count = text.chars().count();

    if char_count <= chunk_size {
        return vec![text.to_string()];
    }

    // char index -> byte index
    let char_to_byte: Vec<usize> = text
        .char_indices()
        .map(|(byte_idx, _)| byte_idx)
        .chain(std::iter::once(text.len()))
        .collect();

    let mut windows = Vec::new();
    let mut start_char = 0;

    loop {
        let end_char = (start_char + chunk_size).min(char_count);

        let window_end_char = if end_char < char_count {
            find_word_boundary_char(text, &char_to_byte, start_char, end_char)
        } else {
            end_char
        };

        let slice = &text[char_to_byte[start_char]..char_to_byte[window_end_char]];
        if !slice.trim().is_empty() {
            windows.push(slice.to_string());
        }

        if window_end_char >= char_count {
            break;
        }
        start_char = window_end_char
            .saturating_sub(overlap)
            .max(start_char + 1);
    }

    windows
}

/// Find the char position just after the last whitespace in the 100 chars
/// before `pos_char`, never at or before `floor_char`.
fn find_word_boundary_char(
    text: &str,
    char_to_byte: &[usize],
    floor_char: usize,
    pos_char: usize,
) -> usize {
    let search_start_char = pos_char.saturating_sub(100).max(floor_char);

    let start_byte = char_to_byte[search_start_char];
    let end_byte = char_to_byte[pos_char];
    let region = &text[start_byte..end_byte];

    if let Some(ws_offset) = region.rfind(char::is_whitespace) {
        let ws_byte = start_byte + ws_offset;
        let boundary = char_to_byte.partition_point(|&b| b <= ws_byte);
        if boundary > floor_char {
            return boundary;
        }
    }

    pos_char
}
