//! Corpus sources: the built-in knowledge base, single files, JSON corpora
//! and directories of text documents.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    chunking::{self, Chunk, ChunkStrategy},
    error::{Error, Result},
};

/// Extensions picked up when a corpus path is a directory.
const SUPPORTED_EXTENSIONS: &[&str] = &["md", "txt"];

/// A labeled source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable document name, e.g. `product-a` or a relative file path.
    pub label: String,
    /// Full document text.
    pub text: String,
    /// Lowercase trigger phrases for keyword retrieval.
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Document {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
            keywords: Vec::new(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords
            .into_iter()
            .map(|k| k.into().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        self
    }
}

/// An ordered set of documents. Order is significant: it fixes chunk
/// ordinals and therefore index rows.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    documents: Vec<Document>,
}

impl Corpus {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    /// The small knowledge base shipped with the binary.
    pub fn builtin() -> Self {
        Self::new(vec![
            Document::new(
                "product-a",
                "Product A is a next-generation software tool for data \
                 analysis. It uses machine learning algorithms to predict \
                 market trends. It costs $500 per month and includes 24/7 \
                 priority support.",
            )
            .with_keywords([
                "product a",
                "price of a",
                "software",
                "data analysis",
            ]),
            Document::new(
                "product-b",
                "Product B is a cloud storage service with 1TB of space. \
                 Security is guaranteed by end-to-end encryption. It costs \
                 $50 per month.",
            )
            .with_keywords([
                "product b",
                "price of b",
                "cloud",
                "storage",
                "security",
            ]),
            Document::new(
                "company",
                "Our company, Tech Solutions, was founded in 2010. We are \
                 leaders in technology innovation and have offices in São \
                 Paulo and Rio de Janeiro.",
            )
            .with_keywords([
                "company",
                "tech solutions",
                "about us",
                "offices",
            ]),
        ])
    }

    /// Load a corpus from a path.
    ///
    /// - a directory: every `.md`/`.txt` file below it, one document each,
    ///   sorted by relative path, hidden entries skipped
    /// - a `.json` file: an array of [`Document`] objects
    /// - any other file: a single document labeled by its file stem
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "corpus path does not exist: {}",
                path.display()
            )));
        }

        if path.is_dir() {
            return Self::load_dir(path);
        }

        let content = std::fs::read_to_string(path)?;
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            let documents: Vec<Document> = serde_json::from_str(&content)?;
            let documents = documents
                .into_iter()
                .map(|d| {
                    let label = d.label;
                    Document::new(label, d.text).with_keywords(d.keywords)
                })
                .collect();
            return Ok(Self::new(documents));
        }

        let label = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("corpus")
            .to_string();
        Ok(Self::new(vec![Document::new(label, content)]))
    }

    fn load_dir(root: &Path) -> Result<Self> {
        let root = root.canonicalize()?;
        let mut files = Vec::new();
        collect_files(&root, &mut files)?;
        files.sort();

        let mut documents = Vec::with_capacity(files.len());
        for file in files {
            let text = std::fs::read_to_string(&file)?;
            let label = file
                .strip_prefix(&root)
                .unwrap_or(&file)
                .to_string_lossy()
                .to_string();
            documents.push(Document::new(label, text));
        }

        Ok(Self::new(documents))
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Whether any document can be matched by the keyword retriever.
    pub fn has_keywords(&self) -> bool {
        self.documents.iter().any(|d| !d.keywords.is_empty())
    }

    /// Split every document into chunks, in corpus order.
    pub fn chunks(&self, strategy: ChunkStrategy) -> Result<Vec<Chunk>> {
        chunking::chunk_documents(&self.documents, strategy)
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }

        let path = entry.path();
        // Directory symlinks are not followed to avoid cycles.
        if entry.file_type()?.is_dir() {
            collect_files(&path, out)?;
        } else if path.is_file() && is_supported(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
}
