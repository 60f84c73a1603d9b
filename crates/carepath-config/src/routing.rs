use indexmap::IndexMap;
use serde::Deserialize;

use crate::BackendKind;

/// Model routing for the chat gateway
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// Backend used for models not listed in `models`
    #[serde(default = "default_backend")]
    pub default_backend: BackendKind,
    /// Model name (or alias) to backend binding
    #[serde(default)]
    pub models: IndexMap<String, ModelRoute>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_backend: default_backend(),
            models: IndexMap::new(),
        }
    }
}

/// A single model route
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelRoute {
    pub backend: BackendKind,
    /// Concrete model id sent upstream; the route name is used when absent
    #[serde(default)]
    pub model: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_backend() -> BackendKind {
    BackendKind::Hosted
}
