use std::time::Duration;

use serde::Deserialize;

/// CORS configuration for browser clients of the consultation API
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorsConfig {
    /// `"*"` or an explicit list of origins
    #[serde(default)]
    pub origins: AllowedOrigins,
    /// Allowed methods
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
    /// Allow credentials; requires an explicit origin list
    #[serde(default)]
    pub credentials: bool,
    /// Preflight cache lifetime (e.g. "10m")
    #[serde(default)]
    pub max_age: Option<String>,
}

/// Origins accepted by the CORS layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "OriginsRepr")]
pub enum AllowedOrigins {
    #[default]
    Any,
    List(Vec<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OriginsRepr {
    One(String),
    Many(Vec<String>),
}

impl From<OriginsRepr> for AllowedOrigins {
    fn from(repr: OriginsRepr) -> Self {
        let origins = match repr {
            OriginsRepr::One(origin) => vec![origin],
            OriginsRepr::Many(origins) => origins,
        };

        if origins.iter().any(|o| o == "*") {
            Self::Any
        } else {
            Self::List(origins)
        }
    }
}

impl CorsConfig {
    /// Parsed preflight max age
    ///
    /// # Errors
    ///
    /// Returns an error if `max_age` is set but not a valid duration
    pub fn max_age(&self) -> anyhow::Result<Option<Duration>> {
        self.max_age
            .as_deref()
            .map(|raw| crate::parse_duration("server.cors.max_age", raw))
            .transpose()
    }
}

fn default_methods() -> Vec<String> {
    ["GET", "POST", "DELETE", "OPTIONS"].map(String::from).to_vec()
}
