use std::{fmt, time::Duration};

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Which backend slot a stage or model route is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Hosted API (typically OpenAI-compatible)
    Hosted,
    /// Locally served model (typically Ollama-compatible)
    Local,
}

impl BackendKind {
    pub const ALL: [Self; 2] = [Self::Hosted, Self::Local];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hosted => "hosted",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Both backend slots
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendsConfig {
    #[serde(default)]
    pub hosted: Option<BackendConfig>,
    #[serde(default)]
    pub local: Option<BackendConfig>,
}

impl BackendsConfig {
    /// Configuration for a slot, if present
    pub const fn get(&self, kind: BackendKind) -> Option<&BackendConfig> {
        match kind {
            BackendKind::Hosted => self.hosted.as_ref(),
            BackendKind::Local => self.local.as_ref(),
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.hosted.is_none() && self.local.is_none()
    }
}

/// Configuration for a single inference backend
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Wire protocol spoken by the backend
    #[serde(rename = "type")]
    pub protocol: BackendProtocol,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Model used when a request does not name one
    pub default_model: String,
    /// Request timeout (e.g. "60s")
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

impl BackendConfig {
    /// Parsed request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout string is not a valid duration
    pub fn timeout(&self) -> anyhow::Result<Duration> {
        crate::parse_duration("timeout", &self.timeout)
    }
}

/// Supported backend wire protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendProtocol {
    /// OpenAI-compatible chat completions API
    Openai,
    /// Ollama generate/chat API
    Ollama,
}

fn default_timeout() -> String {
    "60s".to_string()
}
