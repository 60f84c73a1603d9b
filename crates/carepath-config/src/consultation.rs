use std::time::Duration;

use serde::Deserialize;

use crate::BackendKind;

/// Consultation pipeline configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsultationConfig {
    /// Idle time after which a session is evicted (e.g. "2h")
    #[serde(default = "default_session_ttl")]
    pub session_ttl: String,
    /// Maximum number of sessions held at once
    #[serde(default = "default_max_sessions")]
    pub max_sessions: u64,
    /// Number of providers recommended by the matching stage
    #[serde(default = "default_provider_count")]
    pub provider_count: usize,
    /// Delay between streamed explanation words (e.g. "100ms")
    #[serde(default = "default_stream_pacing")]
    pub stream_pacing: String,
    /// Number of leading explanation words streamed as chunks
    #[serde(default = "default_streamed_words")]
    pub streamed_words: usize,
    /// Capacity of the per-run event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Per-stage backend bindings
    #[serde(default)]
    pub stages: StagesConfig,
    /// Replaces the built-in provider directory when non-empty
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
}

impl Default for ConsultationConfig {
    fn default() -> Self {
        Self {
            session_ttl: default_session_ttl(),
            max_sessions: default_max_sessions(),
            provider_count: default_provider_count(),
            stream_pacing: default_stream_pacing(),
            streamed_words: default_streamed_words(),
            event_buffer: default_event_buffer(),
            stages: StagesConfig::default(),
            providers: Vec::new(),
        }
    }
}

impl ConsultationConfig {
    /// Parsed session idle TTL
    ///
    /// # Errors
    ///
    /// Returns an error if `session_ttl` is not a valid duration
    pub fn session_ttl(&self) -> anyhow::Result<Duration> {
        crate::parse_duration("consultation.session_ttl", &self.session_ttl)
    }

    /// Parsed explanation stream pacing
    ///
    /// # Errors
    ///
    /// Returns an error if `stream_pacing` is not a valid duration
    pub fn stream_pacing(&self) -> anyhow::Result<Duration> {
        crate::parse_duration("consultation.stream_pacing", &self.stream_pacing)
    }
}

/// Overrides for each pipeline stage
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StagesConfig {
    #[serde(default)]
    pub symptom: StageOverride,
    #[serde(default)]
    pub diagnostic: StageOverride,
    #[serde(default)]
    pub procedure: StageOverride,
    #[serde(default)]
    pub provider_match: StageOverride,
}

impl StagesConfig {
    pub fn symptom(&self) -> StageBinding {
        self.symptom.resolve(BackendKind::Hosted, 500, 0.0)
    }

    pub fn diagnostic(&self) -> StageBinding {
        self.diagnostic.resolve(BackendKind::Local, 1000, 0.0)
    }

    pub fn procedure(&self) -> StageBinding {
        self.procedure.resolve(BackendKind::Local, 1000, 0.0)
    }

    pub fn provider_match(&self) -> StageBinding {
        self.provider_match.resolve(BackendKind::Hosted, 150, 0.3)
    }

    /// All resolved bindings with their config key
    pub fn all(&self) -> [(&'static str, StageBinding); 4] {
        [
            ("symptom", self.symptom()),
            ("diagnostic", self.diagnostic()),
            ("procedure", self.procedure()),
            ("provider_match", self.provider_match()),
        ]
    }
}

/// Partial stage configuration as written in the file
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageOverride {
    #[serde(default)]
    pub backend: Option<BackendKind>,
    /// Model id; the backend's default model is used when absent
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl StageOverride {
    fn resolve(&self, backend: BackendKind, max_tokens: u32, temperature: f32) -> StageBinding {
        StageBinding {
            backend: self.backend.unwrap_or(backend),
            model: self.model.clone(),
            max_tokens: self.max_tokens.unwrap_or(max_tokens),
            temperature: self.temperature.unwrap_or(temperature),
        }
    }
}

/// Fully resolved stage binding
#[derive(Debug, Clone, PartialEq)]
pub struct StageBinding {
    pub backend: BackendKind,
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A provider directory entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderEntry {
    pub name: String,
    pub specialty: String,
    pub hospital: String,
    pub rating: f64,
}

fn default_session_ttl() -> String {
    "2h".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_sessions() -> u64 {
    10_000
}

#[allow(clippy::missing_const_for_fn)]
fn default_provider_count() -> usize {
    2
}

fn default_stream_pacing() -> String {
    "100ms".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_streamed_words() -> usize {
    5
}

#[allow(clippy::missing_const_for_fn)]
fn default_event_buffer() -> usize {
    64
}
