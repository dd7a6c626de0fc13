//! OpenAI-compatible `/embeddings` and `/chat/completions` clients.

use reqwest::{
    blocking::Client,
    header::{AUTHORIZATION, HeaderMap},
};
use serde::{Deserialize, Serialize};

use super::{HttpSettings, build_client, decode, header_value, send_with_retry};
use crate::{
    embedding::Embedder,
    error::{Error, Result},
    generation::{GenerationSettings, Generator},
};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

const MAX_BATCH: usize = 512;

fn openai_client(api_key: &str, http: &HttpSettings) -> Result<Client> {
    let mut headers = HeaderMap::new();
    let auth = format!("Bearer {}", api_key.trim());
    if api_key.trim().is_empty() {
        return Err(Error::Config("missing OpenAI API key".to_string()));
    }
    headers.insert(AUTHORIZATION, header_value(&auth, "OpenAI API key")?);
    build_client(headers, http.timeout)
}

pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    http: HttpSettings,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        http: HttpSettings,
    ) -> Result<Self> {
        Ok(Self {
            client: openai_client(api_key, &http)?,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            http,
        })
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let resp = send_with_retry("openai", &self.http, Error::Embedding, || {
            self.client.post(&self.endpoint).json(&body).send()
        })?;
        let parsed: EmbeddingResponse =
            decode("openai", resp, Error::Embedding)?;
        parsed.into_vectors(texts.len())
    }

    fn max_batch_size(&self) -> usize {
        MAX_BATCH
    }

    fn name(&self) -> &str {
        &self.model
    }
}

pub struct OpenAiGenerator {
    client: Client,
    endpoint: String,
    model: String,
    settings: GenerationSettings,
    http: HttpSettings,
}

impl OpenAiGenerator {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        settings: GenerationSettings,
        http: HttpSettings,
    ) -> Result<Self> {
        Ok(Self {
            client: openai_client(api_key, &http)?,
            endpoint: format!(
                "{}/chat/completions",
                base_url.trim_end_matches('/')
            ),
            model: model.to_string(),
            settings,
            http,
        })
    }
}

impl Generator for OpenAiGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_output_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let resp =
            send_with_retry("openai", &self.http, Error::Generation, || {
                self.client.post(&self.endpoint).json(&body).send()
            })?;
        let parsed: ChatResponse = decode("openai", resp, Error::Generation)?;
        parsed.into_text()
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl EmbeddingResponse {
    fn into_vectors(mut self, expected: usize) -> Result<Vec<Vec<f32>>> {
        self.data.sort_by_key(|entry| entry.index);
        if self.data.len() != expected {
            return Err(Error::Embedding(format!(
                "openai returned {} embeddings for {expected} inputs",
                self.data.len()
            )));
        }
        Ok(self.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> Result<String> {
        self.choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                Error::Generation("openai response contained no text".to_string())
            })
    }
}
