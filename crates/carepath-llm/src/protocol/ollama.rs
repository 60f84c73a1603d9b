//! Ollama generate and chat API wire format types
//!
//! Streaming responses are newline-delimited JSON objects; the last one
//! carries `done: true` together with token counts.

use serde::{Deserialize, Serialize};

/// Sampling options shared by generate and chat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OllamaOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

// -- /api/generate --

/// `POST /api/generate` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaGenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    #[serde(default)]
    pub options: OllamaOptions,
}

/// `/api/generate` response or stream line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaGenerateResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
}

// -- /api/chat --

/// `POST /api/chat` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<OllamaMessage>,
    pub stream: bool,
    #[serde(default)]
    pub options: OllamaOptions,
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// `/api/chat` response or stream line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaChatResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub message: Option<OllamaMessage>,
    #[serde(default)]
    pub done: bool,
    /// Why generation stopped (`stop`, `length`)
    #[serde(default)]
    pub done_reason: Option<String>,
    /// Prompt tokens, reported on the final object
    #[serde(default)]
    pub prompt_eval_count: Option<u32>,
    /// Generated tokens, reported on the final object
    #[serde(default)]
    pub eval_count: Option<u32>,
}

// -- /api/tags --

/// `GET /api/tags` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OllamaTags {
    #[serde(default)]
    pub models: Vec<OllamaModelTag>,
}

/// Locally installed model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaModelTag {
    pub name: String,
}
