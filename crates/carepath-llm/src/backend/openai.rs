//! Hosted backend speaking the `OpenAI` chat completions API

use async_trait::async_trait;
use carepath_config::BackendConfig;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{EventStream, InferenceBackend};
use crate::convert::openai::openai_chunk_to_events;
use crate::error::BackendError;
use crate::protocol::openai::{OpenAiRequest, OpenAiResponse, OpenAiStreamChunk};
use crate::types::{CompletionRequest, CompletionResponse, GenerateOptions, StreamEvent};

/// Default `OpenAI` API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible backend
pub struct OpenAiBackend {
    name: String,
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    default_model: String,
}

impl OpenAiBackend {
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
            api_key: config.api_key.clone(),
            default_model: config.default_model.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/{path}")
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }

    fn wire_request(&self, request: &CompletionRequest, stream: bool) -> OpenAiRequest {
        let mut wire_request = OpenAiRequest::from(request);
        if wire_request.model.is_empty() {
            wire_request.model.clone_from(&self.default_model);
        }
        wire_request.stream = stream.then_some(true);
        wire_request
    }

    async fn post(&self, body: &OpenAiRequest) -> Result<reqwest::Response, BackendError> {
        let builder = self.client.post(self.url("chat/completions")).json(body);

        let response = self.authorized(builder).send().await.map_err(|e| {
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
impl InferenceBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn health_check(&self) -> bool {
        let builder = self.client.get(self.url("models"));

        match self.authorized(builder).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(backend = %self.name, error = %e, "health probe failed");
                false
            }
        }
    }

    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, BackendError> {
        let request = CompletionRequest::from_prompt(prompt, options);
        let response = self.chat_complete(&request).await?;

        response
            .first_text()
            .map(ToOwned::to_owned)
            .ok_or_else(|| BackendError::Malformed("completion has no text choice".to_owned()))
    }

    async fn chat_complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, BackendError> {
        let wire_request = self.wire_request(request, false);
        let response = self.post(&wire_request).await?;

        let wire_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(format!("failed to parse response: {e}")))?;

        Ok(wire_response.into())
    }

    async fn chat_complete_stream(&self, request: &CompletionRequest) -> Result<EventStream, BackendError> {
        let wire_request = self.wire_request(request, true);
        let response = self.post(&wire_request).await?;

        let mapped = response
            .bytes_stream()
            .eventsource()
            .map(|result| match result {
                Ok(event) => {
                    let data = event.data.trim();
                    if data == "[DONE]" {
                        return vec![Ok(StreamEvent::Done)];
                    }

                    match serde_json::from_str::<OpenAiStreamChunk>(data) {
                        Ok(chunk) => openai_chunk_to_events(&chunk).into_iter().map(Ok).collect(),
                        Err(e) => {
                            tracing::debug!(error = %e, data, "skipping unparseable SSE chunk");
                            vec![]
                        }
                    }
                }
                Err(e) => vec![Err(BackendError::Streaming(e.to_string()))],
            })
            .flat_map(futures_util::stream::iter);

        Ok(Box::pin(mapped))
    }
}
