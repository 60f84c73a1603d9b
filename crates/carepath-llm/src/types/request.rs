use serde::{Deserialize, Serialize};

use super::message::Message;

/// Parameters controlling text generation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionParams {
    /// Sampling temperature (0.0 to 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

/// Internal canonical chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier; empty means the backend default
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub params: CompletionParams,
    #[serde(default)]
    pub stream: bool,
}

impl CompletionRequest {
    /// Single-turn request built from a bare prompt
    pub fn from_prompt(prompt: &str, options: &GenerateOptions) -> Self {
        Self {
            model: options.model.clone().unwrap_or_default(),
            messages: vec![Message::user(prompt)],
            params: CompletionParams {
                temperature: Some(f64::from(options.temperature)),
                max_tokens: Some(options.max_tokens),
                ..CompletionParams::default()
            },
            stream: false,
        }
    }
}

/// Options for a single prompt completion
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    /// Model override; the backend default is used when absent
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.0,
            max_tokens: 512,
        }
    }
}

impl GenerateOptions {
    /// Cheapest possible call, used to wake a backend up
    pub fn warmup(model: Option<String>) -> Self {
        Self {
            model,
            temperature: 0.0,
            max_tokens: 1,
        }
    }
}
