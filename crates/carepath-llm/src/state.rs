//! Shared state for the chat gateway routes

use std::sync::Arc;

use carepath_config::Config;

use crate::backend::{Backends, EventStream, TextStream};
use crate::error::BackendError;
use crate::routing::{ModelRouter, ResolvedModel};
use crate::types::{CompletionRequest, CompletionResponse, GenerateOptions};

/// Shared state for gateway route handlers
#[derive(Clone)]
pub struct GatewayState {
    pub(crate) inner: Arc<GatewayStateInner>,
}

pub(crate) struct GatewayStateInner {
    pub(crate) router: ModelRouter,
    pub(crate) backends: Backends,
}

impl GatewayState {
    pub fn new(backends: Backends, router: ModelRouter) -> Self {
        Self {
            inner: Arc::new(GatewayStateInner { router, backends }),
        }
    }

    /// Build from configuration, constructing all backends
    ///
    /// # Errors
    ///
    /// Returns an error if any backend fails to initialize
    pub fn from_config(config: &Config) -> Result<Self, BackendError> {
        let backends = Backends::from_config(&config.backends)?;
        Ok(Self::new(backends, ModelRouter::new(&config.routing)))
    }

    pub fn backends(&self) -> &Backends {
        &self.inner.backends
    }

    /// Resolve a requested model, filling in the backend default
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotConfigured` if the routed slot is empty
    pub fn resolve(&self, model: &str) -> Result<ResolvedModel, BackendError> {
        let mut resolved = self.inner.router.resolve(model);
        let backend = self.inner.backends.get(resolved.backend)?;

        if resolved.model.is_empty() {
            backend.default_model().clone_into(&mut resolved.model);
        }

        Ok(resolved)
    }

    /// Route and execute a non-streaming chat completion
    ///
    /// # Errors
    ///
    /// Returns an error if routing fails or the backend call fails
    pub async fn complete(&self, mut request: CompletionRequest) -> Result<CompletionResponse, BackendError> {
        let resolved = self.resolve(&request.model)?;
        tracing::debug!(backend = %resolved.backend, model = %resolved.model, "routing chat completion");

        request.model = resolved.model;
        self.inner.backends.get(resolved.backend)?.chat_complete(&request).await
    }

    /// Route and execute a streaming chat completion
    ///
    /// Returns the model actually used together with the event stream.
    ///
    /// # Errors
    ///
    /// Returns an error if routing fails or the backend rejects the request
    pub async fn complete_stream(&self, mut request: CompletionRequest) -> Result<(String, EventStream), BackendError> {
        let resolved = self.resolve(&request.model)?;
        tracing::debug!(backend = %resolved.backend, model = %resolved.model, "routing streamed chat completion");

        request.model.clone_from(&resolved.model);
        request.stream = true;
        let stream = self
            .inner
            .backends
            .get(resolved.backend)?
            .chat_complete_stream(&request)
            .await?;

        Ok((resolved.model, stream))
    }

    /// Route and execute a prompt completion
    ///
    /// # Errors
    ///
    /// Returns an error if routing fails or the backend call fails
    pub async fn generate(&self, model: &str, prompt: &str, mut options: GenerateOptions) -> Result<(String, String), BackendError> {
        let resolved = self.resolve(model)?;
        options.model = Some(resolved.model.clone());

        let text = self.inner.backends.get(resolved.backend)?.generate(prompt, &options).await?;
        Ok((resolved.model, text))
    }

    /// Route and execute a streamed prompt completion
    ///
    /// # Errors
    ///
    /// Returns an error if routing fails or the backend rejects the request
    pub async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        mut options: GenerateOptions,
    ) -> Result<(String, TextStream), BackendError> {
        let resolved = self.resolve(model)?;
        options.model = Some(resolved.model.clone());

        let stream = self
            .inner
            .backends
            .get(resolved.backend)?
            .generate_stream(prompt, &options)
            .await?;

        Ok((resolved.model, stream))
    }
}
