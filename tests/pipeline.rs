use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use groundrag::{
    AnswerOutcome,
    Corpus,
    Document,
    EchoGenerator,
    Embedder,
    EmbeddingOptions,
    EmbeddingRetriever,
    Error,
    Generator,
    KeywordRetriever,
    RagPipeline,
    Result,
    Retrieval,
    Retriever,
    chunking::{ChunkStrategy, chunk_documents},
    pipeline::{GENERATION_FAILED_MESSAGE, RETRIEVAL_FAILED_MESSAGE},
    prompt::{REFUSAL_SENTENCE, compose},
};

const VOCABULARY: &[&str] = &[
    "product", "a", "b", "cost", "costs", "month", "cloud", "storage",
    "weather", "company",
];

/// Word-count vectors over a fixed vocabulary.
struct Vocabulary;

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

impl Embedder for Vocabulary {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let tokens: Vec<String> = words(text).collect();
                VOCABULARY
                    .iter()
                    .map(|v| tokens.iter().filter(|t| t == v).count() as f32)
                    .collect()
            })
            .collect())
    }

    fn name(&self) -> &str {
        "vocabulary"
    }
}

/// Embeds the corpus, then fails every later call.
struct FlakyEmbedder {
    calls: AtomicUsize,
    healthy_calls: usize,
}

impl Embedder for FlakyEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.healthy_calls {
            return Err(Error::Embedding("service unavailable".to_string()));
        }
        Vocabulary.embed_batch(texts)
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

struct FailingGenerator;

impl Generator for FailingGenerator {
    fn generate(&self, _prompt: &str) -> Result<String> {
        Err(Error::Generation("rate limited".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

struct CountingGenerator(AtomicUsize);

impl Generator for CountingGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(prompt.to_string())
    }

    fn name(&self) -> &str {
        "counting"
    }
}

fn pricing_corpus() -> Vec<Document> {
    vec![Document::new(
        "pricing",
        "Product A costs $500/month\nProduct B costs $50/month",
    )]
}

fn embedding_retriever(embedder: Arc<dyn Embedder>) -> Result<EmbeddingRetriever> {
    EmbeddingRetriever::build(
        chunk_documents(&pricing_corpus(), ChunkStrategy::Lines)?,
        embedder,
        EmbeddingOptions::default(),
    )
}

#[test]
fn end_to_end_product_b() {
    let retriever = embedding_retriever(Arc::new(Vocabulary)).unwrap();
    let pipeline =
        RagPipeline::new(Arc::new(retriever), Arc::new(EchoGenerator), 1)
            .unwrap();

    let query = "How much does Product B cost?";
    let retrieval = pipeline.retrieve(query).unwrap();
    assert_eq!(retrieval.chunks()[0].text, "Product B costs $50/month");

    let answer = pipeline.answer(query);
    assert_eq!(answer.outcome, AnswerOutcome::Grounded);
    assert!(answer.text.contains("Product B costs $50/month"));
    assert!(!answer.text.contains("Product A costs $500/month"));
    assert!(answer.text.contains(REFUSAL_SENTENCE));
    assert!(answer.text.contains(query));
    assert_eq!(
        answer.text,
        compose(query, Some(&["Product B costs $50/month"]))
    );
}

#[test]
fn top_k_two_returns_both_in_rank_order() {
    let retriever = embedding_retriever(Arc::new(Vocabulary)).unwrap();
    let chunks = retriever.retrieve("product b", 2).unwrap();
    let texts: Vec<&str> = chunks.chunks().iter().map(|c| c.text.as_str()).collect();
    assert_eq!(
        texts,
        vec!["Product B costs $50/month", "Product A costs $500/month"]
    );
    assert!(chunks.chunks()[0].score >= chunks.chunks()[1].score);
}

#[test]
fn embedder_failure_at_build_is_fatal() {
    let embedder = Arc::new(FlakyEmbedder {
        calls: AtomicUsize::new(0),
        healthy_calls: 0,
    });
    let err = embedding_retriever(embedder).err().unwrap();
    assert!(matches!(err, Error::Embedding(_)));
}

#[test]
fn embedder_failure_at_query_time_skips_generation() {
    let embedder = Arc::new(FlakyEmbedder {
        calls: AtomicUsize::new(0),
        healthy_calls: 1,
    });
    let retriever = embedding_retriever(embedder).unwrap();
    let generator = Arc::new(CountingGenerator(AtomicUsize::new(0)));
    let pipeline =
        RagPipeline::new(Arc::new(retriever), generator.clone(), 1).unwrap();

    let answer = pipeline.answer("How much does Product B cost?");
    assert_eq!(answer.outcome, AnswerOutcome::RetrievalFailed);
    assert_eq!(answer.text, RETRIEVAL_FAILED_MESSAGE);
    assert_eq!(generator.0.load(Ordering::SeqCst), 0);
}

#[test]
fn generator_failure_is_degraded_answer() {
    let retriever = embedding_retriever(Arc::new(Vocabulary)).unwrap();
    let pipeline =
        RagPipeline::new(Arc::new(retriever), Arc::new(FailingGenerator), 1)
            .unwrap();

    let answer = pipeline.answer("How much does Product B cost?");
    assert_eq!(answer.outcome, AnswerOutcome::GenerationFailed);
    assert_eq!(answer.text, GENERATION_FAILED_MESSAGE);
    assert_eq!(answer.context.len(), 1);
}

#[test]
fn min_score_can_empty_retrieval_into_ungrounded_fallback() {
    let retriever = Arc::new(
        EmbeddingRetriever::build(
            chunk_documents(&pricing_corpus(), ChunkStrategy::Lines).unwrap(),
            Arc::new(Vocabulary),
            EmbeddingOptions {
                min_score: Some(0.5),
            },
        )
        .unwrap(),
    );
    let pipeline =
        RagPipeline::new(retriever.clone(), Arc::new(EchoGenerator), 1)
            .unwrap();

    // "weather" is orthogonal to both chunks: score 0 < 0.5.
    assert_eq!(pipeline.retrieve("weather").unwrap(), Retrieval::NoContext);
    // The raw hits are still there below the threshold.
    let raw = retriever.search_scores("weather", 1).unwrap();
    assert_eq!(raw.len(), 1);
    assert!(raw[0].score < 0.5);
    let answer = pipeline.answer("weather");
    assert_eq!(answer.outcome, AnswerOutcome::Ungrounded);
    assert_eq!(answer.text, "weather");
}

#[test]
fn retrievers_are_interchangeable() {
    let chunks = Corpus::builtin().chunks(ChunkStrategy::Lines).unwrap();
    let retrievers: Vec<Arc<dyn Retriever>> = vec![
        Arc::new(
            EmbeddingRetriever::build(
                chunks.clone(),
                Arc::new(Vocabulary),
                EmbeddingOptions::default(),
            )
            .unwrap(),
        ),
        Arc::new(KeywordRetriever::build(chunks).unwrap()),
    ];

    for retriever in retrievers {
        let name = retriever.name();
        let pipeline =
            RagPipeline::new(retriever, Arc::new(EchoGenerator), 1).unwrap();
        let answer = pipeline.answer("What does cloud storage from product b cost?");
        assert_eq!(answer.outcome, AnswerOutcome::Grounded, "{name}");
        assert_eq!(answer.context[0].document, "product-b", "{name}");
        assert!(answer.text.contains("$50 per month"), "{name}");
    }
}

#[test]
fn single_chunk_corpus_maps_ordinal_zero() {
    let chunks = chunk_documents(
        &[Document::new("only", "Product A costs $500/month")],
        ChunkStrategy::Lines,
    )
    .unwrap();
    let retriever = EmbeddingRetriever::build(
        chunks,
        Arc::new(Vocabulary),
        EmbeddingOptions::default(),
    )
    .unwrap();

    let retrieval = retriever.retrieve("product", 3).unwrap();
    assert_eq!(retrieval.chunks().len(), 1);
    assert_eq!(retrieval.chunks()[0].ordinal, 0);
    assert_eq!(retrieval.chunks()[0].text, "Product A costs $500/month");
}

#[test]
fn empty_corpus_is_rejected() {
    let err = chunk_documents(&[Document::new("blank", "  \n\n")], ChunkStrategy::Lines)
        .unwrap_err();
    assert!(matches!(err, Error::EmptyCorpus));
}
