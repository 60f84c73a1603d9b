//! Inference backends and the chat gateway
//!
//! Provides one capability trait over a hosted OpenAI-compatible API and a
//! locally served Ollama model, model-name routing between the two, and
//! OpenAI-compatible HTTP endpoints.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod backend;
pub mod convert;
pub mod error;
#[cfg(feature = "http")]
pub mod handler;
pub mod protocol;
pub mod routing;
pub mod state;
pub mod types;

pub use backend::{Backends, EventStream, InferenceBackend, TextStream};
pub use carepath_config::BackendKind;
pub use error::BackendError;
#[cfg(feature = "http")]
pub use handler::gateway_router;
pub use routing::{ModelRouter, ResolvedModel};
pub use state::GatewayState;
pub use types::{CompletionRequest, CompletionResponse, GenerateOptions, StreamEvent};
