//! Local backend speaking the Ollama generate/chat API

use std::fmt::Display;

use async_trait::async_trait;
use carepath_config::BackendConfig;
use futures_util::{Stream, StreamExt, stream};
use reqwest::Client;
use serde::{Serialize, de::DeserializeOwned};
use url::Url;

use super::{EventStream, InferenceBackend, TextStream};
use crate::convert::ollama::{chat_line_to_events, chat_request, chat_response_to_completion, generate_request};
use crate::error::BackendError;
use crate::protocol::ollama::{OllamaChatResponse, OllamaGenerateResponse};
use crate::types::{CompletionRequest, CompletionResponse, GenerateOptions};

/// Default Ollama address
const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ollama-compatible backend
pub struct OllamaBackend {
    name: String,
    client: Client,
    base_url: Url,
    default_model: String,
}

impl OllamaBackend {
    /// Create from backend configuration
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Internal` if the timeout is invalid or the
    /// HTTP client cannot be built.
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded default base URL is invalid (should never happen).
    pub fn new(name: String, config: &BackendConfig) -> Result<Self, BackendError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL).expect("valid default URL"));

        let client = Client::builder()
            .timeout(config.timeout()?)
            .build()
            .map_err(|e| BackendError::Internal(e.into()))?;

        Ok(Self {
            name,
            client,
            base_url,
            default_model: config.default_model.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/{path}")
    }

    fn model_or_default(&self, model: Option<&str>) -> String {
        model
            .filter(|m| !m.is_empty())
            .unwrap_or(self.default_model.as_str())
            .to_owned()
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<reqwest::Response, BackendError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(backend = %self.name, error = %e, "upstream request failed");
                BackendError::unavailable(&self.name, &e)
            })?;

        if !response.status().is_success() {
            return Err(super::upstream_error(&self.name, response).await);
        }

        Ok(response)
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn health_check(&self) -> bool {
        match self.client.get(self.url("api/tags")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(backend = %self.name, error = %e, "health probe failed");
                false
            }
        }
    }

    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, BackendError> {
        let model = self.model_or_default(options.model.as_deref());
        let body = generate_request(prompt, options, model, false);

        let response: OllamaGenerateResponse = self
            .post("api/generate", &body)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Malformed(format!("failed to parse generate response: {e}")))?;

        Ok(response.response)
    }

    async fn generate_stream(&self, prompt: &str, options: &GenerateOptions) -> Result<TextStream, BackendError> {
        let model = self.model_or_default(options.model.as_deref());
        let body = generate_request(prompt, options, model, true);
        let response = self.post("api/generate", &body).await?;

        let fragments = ndjson::<OllamaGenerateResponse, _, _, _>(response.bytes_stream()).filter_map(|line| {
            futures_util::future::ready(match line {
                Ok(line) if line.response.is_empty() => None,
                Ok(line) => Some(Ok(line.response)),
                Err(e) => Some(Err(e)),
            })
        });

        Ok(Box::pin(fragments))
    }

    async fn chat_complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, BackendError> {
        let model = self.model_or_default(Some(&request.model));
        let body = chat_request(request, model, false);

        let response: OllamaChatResponse = self
            .post("api/chat", &body)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Malformed(format!("failed to parse chat response: {e}")))?;

        Ok(chat_response_to_completion(response))
    }

    async fn chat_complete_stream(&self, request: &CompletionRequest) -> Result<EventStream, BackendError> {
        let model = self.model_or_default(Some(&request.model));
        let body = chat_request(request, model, true);
        let response = self.post("api/chat", &body).await?;

        let events = ndjson::<OllamaChatResponse, _, _, _>(response.bytes_stream())
            .map(|line| match line {
                Ok(line) => chat_line_to_events(&line).into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            })
            .flat_map(stream::iter);

        Ok(Box::pin(events))
    }
}

struct LineReader<S> {
    bytes: std::pin::Pin<Box<S>>,
    buffer: Vec<u8>,
    exhausted: bool,
}

/// Split a byte stream into newline-delimited JSON objects
///
/// Blank lines are skipped and lines that fail to parse are logged and
/// dropped; a transport error ends the stream after being yielded.
fn ndjson<T, S, B, E>(bytes: S) -> impl Stream<Item = Result<T, BackendError>> + Send
where
    T: DeserializeOwned + Send,
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let reader = LineReader {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        exhausted: false,
    };

    stream::unfold(reader, |mut reader| async move {
        loop {
            let line = if let Some(pos) = reader.buffer.iter().position(|b| *b == b'\n') {
                reader.buffer.drain(..=pos).collect::<Vec<u8>>()
            } else if reader.exhausted {
                if reader.buffer.is_empty() {
                    return None;
                }
                std::mem::take(&mut reader.buffer)
            } else {
                match reader.bytes.next().await {
                    Some(Ok(chunk)) => reader.buffer.extend_from_slice(chunk.as_ref()),
                    Some(Err(e)) => {
                        reader.exhausted = true;
                        reader.buffer.clear();
                        return Some((Err(BackendError::Streaming(e.to_string())), reader));
                    }
                    None => reader.exhausted = true,
                }
                continue;
            };

            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            match serde_json::from_str::<T>(text) {
                Ok(value) => return Some((Ok(value), reader)),
                Err(e) => tracing::debug!(error = %e, line = text, "skipping unparseable NDJSON line"),
            }
        }
    })
}
