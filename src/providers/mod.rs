//! Hosted embedding and generation backends.
//!
//! Both backends use blocking `reqwest` clients with a request timeout and a
//! bounded retry loop (429, 5xx and transport errors back off
//! exponentially). Callers inside an async runtime must run them on a
//! blocking thread.

use std::{thread, time::Duration};

use reqwest::{
    StatusCode,
    blocking::{Client, Response},
    header::{CONTENT_TYPE, HeaderMap, HeaderValue},
};
use tracing::warn;

use crate::error::{Error, Result};

mod gemini;
mod openai;

pub use gemini::{
    DEFAULT_GEMINI_EMBEDDING_MODEL,
    DEFAULT_GEMINI_MODEL,
    GEMINI_BASE_URL,
    GeminiEmbedder,
    GeminiGenerator,
};
pub use openai::{
    DEFAULT_OPENAI_EMBEDDING_MODEL,
    DEFAULT_OPENAI_MODEL,
    OPENAI_BASE_URL,
    OpenAiEmbedder,
    OpenAiGenerator,
};

/// Transport settings shared by every hosted client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    /// Whole-request timeout.
    pub timeout: Duration,
    /// Total attempts per request, including the first.
    pub max_retries: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

fn build_client(headers: HeaderMap, timeout: Duration) -> Result<Client> {
    let mut headers = headers;
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()?)
}

fn header_value(secret: &str, what: &str) -> Result<HeaderValue> {
    let secret = secret.trim();
    if secret.is_empty() {
        return Err(Error::Config(format!("missing {what}")));
    }
    HeaderValue::from_str(secret)
        .map_err(|_| Error::Config(format!("invalid {what}")))
}

/// Send a request built by `send` until it succeeds or attempts run out.
///
/// Failures are converted with `fail` so embedding and generation errors
/// keep their own variants.
fn send_with_retry<F>(
    service: &str,
    settings: &HttpSettings,
    fail: fn(String) -> Error,
    mut send: F,
) -> Result<Response>
where
    F: FnMut() -> reqwest::Result<Response>,
{
    let max_attempts = settings.max_retries.max(1);
    let mut attempt = 0usize;

    loop {
        match send() {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return Ok(resp);
                }

                let body = resp
                    .text()
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                if should_retry(status) && attempt + 1 < max_attempts {
                    attempt += 1;
                    warn!(service, %status, attempt, "retrying request");
                    thread::sleep(retry_backoff(attempt));
                    continue;
                }
                return Err(fail(format!(
                    "{service} returned {status}: {}",
                    body.trim()
                )));
            }
            Err(err) => {
                if is_retryable_error(&err) && attempt + 1 < max_attempts {
                    attempt += 1;
                    warn!(service, error = %err, attempt, "retrying request");
                    thread::sleep(retry_backoff(attempt));
                    continue;
                }
                return Err(fail(format!("{service} request failed: {err}")));
            }
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

/// Decode a JSON response body, converting failures with `fail`.
fn decode<T: serde::de::DeserializeOwned>(
    service: &str,
    resp: Response,
    fail: fn(String) -> Error,
) -> Result<T> {
    resp.json()
        .map_err(|e| fail(format!("failed to parse {service} response: {e}")))
}
