//! Model name to backend resolution
//!
//! Routes come from configuration and double as aliases: a route named
//! `medgemma` can point at the concrete `medgemma:27b` id on the local
//! backend. Clients may also address a slot explicitly with
//! `hosted/<model>` or `local/<model>`.

use carepath_config::{BackendKind, ModelRoute, RoutingConfig};
use indexmap::IndexMap;

/// Resolved target for a model request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub backend: BackendKind,
    /// Model id sent upstream; empty means the backend default
    pub model: String,
}

/// Model routing table
#[derive(Debug, Clone)]
pub struct ModelRouter {
    routes: IndexMap<String, ModelRoute>,
    default_backend: BackendKind,
}

impl ModelRouter {
    pub fn new(config: &RoutingConfig) -> Self {
        Self {
            routes: config.models.clone(),
            default_backend: config.default_backend,
        }
    }

    /// Resolve a requested model name
    ///
    /// Unknown names go to the default backend unchanged.
    pub fn resolve(&self, model: &str) -> ResolvedModel {
        if let Some(route) = self.routes.get(model) {
            return ResolvedModel {
                backend: route.backend,
                model: route.model.clone().unwrap_or_else(|| model.to_owned()),
            };
        }

        if let Some((slot, model_id)) = model.split_once('/')
            && let Some(backend) = BackendKind::ALL.into_iter().find(|k| k.as_str() == slot)
        {
            return ResolvedModel {
                backend,
                model: model_id.to_owned(),
            };
        }

        ResolvedModel {
            backend: self.default_backend,
            model: model.to_owned(),
        }
    }

    /// Configured route names with their backend, in configuration order
    pub fn list_models(&self) -> Vec<(String, BackendKind)> {
        self.routes
            .iter()
            .map(|(name, route)| (name.clone(), route.backend))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> ModelRouter {
        let mut models = IndexMap::new();
        models.insert(
            "phraser".to_owned(),
            ModelRoute {
                backend: BackendKind::Hosted,
                model: Some("gpt-4o-mini".to_owned()),
            },
        );
        models.insert(
            "medgemma".to_owned(),
            ModelRoute {
                backend: BackendKind::Local,
                model: Some("medgemma:27b".to_owned()),
            },
        );
        models.insert(
            "medgemma:27b".to_owned(),
            ModelRoute {
                backend: BackendKind::Local,
                model: None,
            },
        );

        ModelRouter::new(&RoutingConfig {
            default_backend: BackendKind::Hosted,
            models,
        })
    }

    #[test]
    fn alias_resolves_to_concrete_model() {
        let resolved = router().resolve("medgemma");

        assert_eq!(resolved.backend, BackendKind::Local);
        assert_eq!(resolved.model, "medgemma:27b");
    }

    #[test]
    fn route_without_model_passes_name_through() {
        let resolved = router().resolve("medgemma:27b");

        assert_eq!(resolved.backend, BackendKind::Local);
        assert_eq!(resolved.model, "medgemma:27b");
    }

    #[test]
    fn unknown_model_goes_to_default_backend() {
        let resolved = router().resolve("gpt-4.1");

        assert_eq!(resolved.backend, BackendKind::Hosted);
        assert_eq!(resolved.model, "gpt-4.1");
    }

    #[test]
    fn explicit_slot_prefix() {
        let resolved = router().resolve("local/llama3:8b");

        assert_eq!(resolved.backend, BackendKind::Local);
        assert_eq!(resolved.model, "llama3:8b");

        let resolved = router().resolve("acme/llama3");
        assert_eq!(resolved.backend, BackendKind::Hosted);
        assert_eq!(resolved.model, "acme/llama3");
    }

    #[test]
    fn list_keeps_configuration_order() {
        let names: Vec<_> = router().list_models().into_iter().map(|(n, _)| n).collect();

        assert_eq!(names, ["phraser", "medgemma", "medgemma:27b"]);
    }
}
