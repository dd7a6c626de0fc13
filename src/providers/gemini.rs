//! Google Gemini (Generative Language API) clients.

use reqwest::{blocking::Client, header::HeaderMap};
use serde::{Deserialize, Serialize};

use super::{HttpSettings, build_client, decode, header_value, send_with_retry};
use crate::{
    embedding::Embedder,
    error::{Error, Result},
    generation::{GenerationSettings, Generator},
};

pub const GEMINI_BASE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// `batchEmbedContents` accepts at most this many requests.
const MAX_BATCH: usize = 100;

fn gemini_client(api_key: &str, http: &HttpSettings) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert("x-goog-api-key", header_value(api_key, "Gemini API key")?);
    build_client(headers, http.timeout)
}

fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

fn endpoint(base_url: &str, model: &str, method: &str) -> String {
    format!("{}/{model}:{method}", base_url.trim_end_matches('/'))
}

/// Embeddings through `embedContent` / `batchEmbedContents`.
pub struct GeminiEmbedder {
    client: Client,
    base_url: String,
    model: String,
    http: HttpSettings,
}

impl GeminiEmbedder {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        http: HttpSettings,
    ) -> Result<Self> {
        Ok(Self {
            client: gemini_client(api_key, &http)?,
            base_url: base_url.to_string(),
            model: model_path(model),
            http,
        })
    }

    fn request<'a>(&'a self, text: &'a str) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: &self.model,
            content: Content::text(text),
        }
    }
}

impl Embedder for GeminiEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = endpoint(&self.base_url, &self.model, "embedContent");
        let body = self.request(text);
        let resp = send_with_retry("gemini", &self.http, Error::Embedding, || {
            self.client.post(&url).json(&body).send()
        })?;
        let parsed: EmbedContentResponse =
            decode("gemini", resp, Error::Embedding)?;
        Ok(parsed.embedding.values)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = endpoint(&self.base_url, &self.model, "batchEmbedContents");
        let body = BatchEmbedRequest {
            requests: texts.iter().map(|t| self.request(t)).collect(),
        };
        let resp = send_with_retry("gemini", &self.http, Error::Embedding, || {
            self.client.post(&url).json(&body).send()
        })?;
        let parsed: BatchEmbedResponse =
            decode("gemini", resp, Error::Embedding)?;
        parsed.into_vectors(texts.len())
    }

    fn max_batch_size(&self) -> usize {
        MAX_BATCH
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Text generation through `generateContent`.
pub struct GeminiGenerator {
    client: Client,
    url: String,
    model: String,
    settings: GenerationSettings,
    http: HttpSettings,
}

impl GeminiGenerator {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        settings: GenerationSettings,
        http: HttpSettings,
    ) -> Result<Self> {
        let model = model_path(model);
        Ok(Self {
            client: gemini_client(api_key, &http)?,
            url: endpoint(base_url, &model, "generateContent"),
            model,
            settings,
            http,
        })
    }
}

impl Generator for GeminiGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.settings.temperature,
                max_output_tokens: self.settings.max_output_tokens,
            },
        };
        let resp =
            send_with_retry("gemini", &self.http, Error::Generation, || {
                self.client.post(&self.url).json(&body).send()
            })?;
        let parsed: GenerateContentResponse =
            decode("gemini", resp, Error::Generation)?;
        parsed.into_text()
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

impl<'a> Content<'a> {
    fn text(text: &'a str) -> Self {
        Self {
            role: None,
            parts: vec![Part { text }],
        }
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

impl BatchEmbedResponse {
    fn into_vectors(self, expected: usize) -> Result<Vec<Vec<f32>>> {
        if self.embeddings.len() != expected {
            return Err(Error::Embedding(format!(
                "gemini returned {} embeddings for {expected} inputs",
                self.embeddings.len()
            )));
        }
        Ok(self.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String> {
        let text = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if !text.trim().is_empty() {
            return Ok(text);
        }

        match self.prompt_feedback.and_then(|f| f.block_reason) {
            Some(reason) => Err(Error::Generation(format!(
                "gemini blocked the prompt: {reason}"
            ))),
            None => Err(Error::Generation(
                "gemini response contained no text".to_string(),
            )),
        }
    }
}
