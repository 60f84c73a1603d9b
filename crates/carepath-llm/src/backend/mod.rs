//! Inference backend capability and its implementations

pub mod ollama;
pub mod openai;

use std::{collections::BTreeMap, pin::Pin, sync::Arc};

use async_trait::async_trait;
use carepath_config::{BackendConfig, BackendKind, BackendProtocol, BackendsConfig};
use futures_util::{Stream, StreamExt, future};

use crate::error::BackendError;
use crate::types::{CompletionRequest, CompletionResponse, GenerateOptions, StreamEvent};

/// Streamed chat completion
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, BackendError>> + Send>>;

/// Streamed prompt completion, one text fragment per item
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, BackendError>> + Send>>;

/// Uniform contract implemented by every inference backend
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Model used when a request does not name one
    fn default_model(&self) -> &str;

    /// Whether the backend answers its cheapest endpoint
    async fn health_check(&self) -> bool;

    /// Complete a bare prompt
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, BackendError>;

    /// Complete a bare prompt, streaming text fragments
    async fn generate_stream(&self, prompt: &str, options: &GenerateOptions) -> Result<TextStream, BackendError> {
        let mut request = CompletionRequest::from_prompt(prompt, options);
        request.stream = true;

        let events = self.chat_complete_stream(&request).await?;
        let text = events.filter_map(|event| {
            future::ready(match event {
                Ok(StreamEvent::Delta(delta)) => delta.content.filter(|c| !c.is_empty()).map(Ok),
                Ok(StreamEvent::Usage(_) | StreamEvent::Done) => None,
                Err(e) => Some(Err(e)),
            })
        });

        Ok(Box::pin(text))
    }

    /// Send a non-streaming chat completion
    async fn chat_complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, BackendError>;

    /// Send a streaming chat completion
    async fn chat_complete_stream(&self, request: &CompletionRequest) -> Result<EventStream, BackendError>;
}

/// Build a backend from its configuration
///
/// # Errors
///
/// Returns an error if the HTTP client or base URL cannot be set up
pub fn build_backend(kind: BackendKind, config: &BackendConfig) -> Result<Arc<dyn InferenceBackend>, BackendError> {
    let backend: Arc<dyn InferenceBackend> = match config.protocol {
        BackendProtocol::Openai => Arc::new(openai::OpenAiBackend::new(kind.as_str().to_owned(), config)?),
        BackendProtocol::Ollama => Arc::new(ollama::OllamaBackend::new(kind.as_str().to_owned(), config)?),
    };

    Ok(backend)
}

/// The hosted and local backend slots
#[derive(Clone, Default)]
pub struct Backends {
    hosted: Option<Arc<dyn InferenceBackend>>,
    local: Option<Arc<dyn InferenceBackend>>,
}

impl Backends {
    /// Build every configured backend
    ///
    /// # Errors
    ///
    /// Returns an error if any backend fails to initialize
    pub fn from_config(config: &BackendsConfig) -> Result<Self, BackendError> {
        let mut backends = Self::default();

        for kind in BackendKind::ALL {
            if let Some(backend_config) = config.get(kind) {
                let backend = build_backend(kind, backend_config)?;
                tracing::debug!(backend = %kind, model = backend.default_model(), "backend configured");
                backends = backends.with(kind, backend);
            }
        }

        Ok(backends)
    }

    /// Install a backend in a slot, replacing any previous one
    #[must_use]
    pub fn with(mut self, kind: BackendKind, backend: Arc<dyn InferenceBackend>) -> Self {
        match kind {
            BackendKind::Hosted => self.hosted = Some(backend),
            BackendKind::Local => self.local = Some(backend),
        }
        self
    }

    /// Backend bound to a slot
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotConfigured` if the slot is empty
    pub fn get(&self, kind: BackendKind) -> Result<&Arc<dyn InferenceBackend>, BackendError> {
        let slot = match kind {
            BackendKind::Hosted => self.hosted.as_ref(),
            BackendKind::Local => self.local.as_ref(),
        };

        slot.ok_or(BackendError::NotConfigured(kind))
    }

    /// Configured slots in a stable order
    pub fn configured(&self) -> impl Iterator<Item = (BackendKind, &Arc<dyn InferenceBackend>)> {
        BackendKind::ALL
            .into_iter()
            .filter_map(|kind| self.get(kind).ok().map(|backend| (kind, backend)))
    }

    /// Probe every configured backend concurrently
    pub async fn health(&self) -> BTreeMap<BackendKind, bool> {
        let probes = self.configured().map(|(kind, backend)| async move {
            let healthy = backend.health_check().await;
            if !healthy {
                tracing::warn!(backend = %kind, "backend health check failed");
            }
            (kind, healthy)
        });

        future::join_all(probes).await.into_iter().collect()
    }
}

/// Error for a non-success upstream status, consuming the body
pub(crate) async fn upstream_error(backend: &str, response: reqwest::Response) -> BackendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    tracing::warn!(backend, %status, "upstream returned error");

    BackendError::Upstream {
        backend: backend.to_owned(),
        status: status.as_u16(),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Choice, ChoiceMessage, StreamDelta};

    struct Scripted {
        fragments: Vec<&'static str>,
    }

    #[async_trait]
    impl InferenceBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "scripted-1"
        }

        async fn health_check(&self) -> bool {
            !self.fragments.is_empty()
        }

        async fn generate(&self, _prompt: &str, _options: &GenerateOptions) -> Result<String, BackendError> {
            Ok(self.fragments.concat())
        }

        async fn chat_complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, BackendError> {
            Ok(CompletionResponse {
                id: "x".to_owned(),
                object: "chat.completion".to_owned(),
                created: 0,
                model: "scripted-1".to_owned(),
                choices: vec![Choice {
                    index: 0,
                    message: ChoiceMessage::text(self.fragments.concat()),
                    finish_reason: None,
                }],
                usage: None,
            })
        }

        async fn chat_complete_stream(&self, request: &CompletionRequest) -> Result<EventStream, BackendError> {
            assert!(request.stream);
            let mut events: Vec<_> = self
                .fragments
                .iter()
                .map(|f| Ok(StreamEvent::Delta(StreamDelta::text(*f))))
                .collect();
            events.push(Ok(StreamEvent::Done));
            Ok(Box::pin(futures_util::stream::iter(events)))
        }
    }

    #[tokio::test]
    async fn default_generate_stream_yields_text_only() {
        let backend = Scripted {
            fragments: vec!["Hello", "", " world"],
        };

        let stream = backend.generate_stream("hi", &GenerateOptions::default()).await.unwrap();
        let parts: Vec<String> = stream.map(Result::unwrap).collect().await;

        assert_eq!(parts, ["Hello", " world"]);
    }

    #[tokio::test]
    async fn empty_slot_is_not_configured() {
        let backends = Backends::default().with(BackendKind::Hosted, Arc::new(Scripted { fragments: vec!["ok"] }));

        assert!(backends.get(BackendKind::Hosted).is_ok());
        assert!(matches!(
            backends.get(BackendKind::Local),
            Err(BackendError::NotConfigured(BackendKind::Local))
        ));
    }

    #[tokio::test]
    async fn health_reports_each_configured_slot() {
        let backends = Backends::default()
            .with(BackendKind::Hosted, Arc::new(Scripted { fragments: vec!["ok"] }))
            .with(BackendKind::Local, Arc::new(Scripted { fragments: vec![] }));

        let health = backends.health().await;

        assert_eq!(health.get(&BackendKind::Hosted), Some(&true));
        assert_eq!(health.get(&BackendKind::Local), Some(&false));
    }
}
