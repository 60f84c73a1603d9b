use std::{path::Path, time::Duration};

use crate::{AllowedOrigins, Config};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no backend is configured, a stage or route is
    /// bound to a missing backend, or a value is out of range
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_backends()?;
        self.validate_bindings()?;
        self.validate_consultation()?;
        self.validate_cors()?;
        Ok(())
    }

    fn validate_backends(&self) -> anyhow::Result<()> {
        if self.backends.is_empty() {
            anyhow::bail!("at least one backend must be configured ([backends.hosted] or [backends.local])");
        }

        for kind in crate::BackendKind::ALL {
            let Some(backend) = self.backends.get(kind) else {
                continue;
            };

            if backend.default_model.trim().is_empty() {
                anyhow::bail!("backends.{kind}.default_model must not be empty");
            }

            backend
                .timeout()
                .map_err(|e| anyhow::anyhow!("backends.{kind}: {e}"))?;
        }

        Ok(())
    }

    /// Every stage and model route must point at a configured backend
    fn validate_bindings(&self) -> anyhow::Result<()> {
        for (stage, binding) in self.consultation.stages.all() {
            if self.backends.get(binding.backend).is_none() {
                anyhow::bail!(
                    "consultation stage '{stage}' is bound to backend '{}' which is not configured",
                    binding.backend
                );
            }
        }

        if self.backends.get(self.routing.default_backend).is_none() {
            anyhow::bail!(
                "routing.default_backend '{}' is not configured",
                self.routing.default_backend
            );
        }

        for (model, route) in &self.routing.models {
            if self.backends.get(route.backend).is_none() {
                anyhow::bail!("model route '{model}' is bound to backend '{}' which is not configured", route.backend);
            }
        }

        Ok(())
    }

    fn validate_consultation(&self) -> anyhow::Result<()> {
        let consultation = &self.consultation;

        consultation.session_ttl()?;
        consultation.stream_pacing()?;

        if consultation.provider_count == 0 {
            anyhow::bail!("consultation.provider_count must be at least 1");
        }

        if consultation.event_buffer == 0 {
            anyhow::bail!("consultation.event_buffer must be at least 1");
        }

        for provider in &consultation.providers {
            if !provider.rating.is_finite() {
                anyhow::bail!("provider '{}' has a non-finite rating", provider.name);
            }
        }

        Ok(())
    }

    fn validate_cors(&self) -> anyhow::Result<()> {
        let Some(ref cors) = self.server.cors else {
            return Ok(());
        };

        cors.max_age()?;

        if cors.credentials && cors.origins == AllowedOrigins::Any {
            anyhow::bail!("server.cors.credentials requires an explicit origin list");
        }

        Ok(())
    }
}

/// Parse a human duration such as `"2h"` or `"100ms"`
pub(crate) fn parse_duration(field: &str, raw: &str) -> anyhow::Result<Duration> {
    duration_str::parse(raw).map_err(|e| anyhow::anyhow!("invalid duration for {field} ('{raw}'): {e}"))
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::{BackendKind, BackendProtocol, Config};

    const MINIMAL: &str = indoc! {r#"
        [backends.hosted]
        type = "openai"
        default_model = "gpt-4o-mini"

        [backends.local]
        type = "ollama"
        base_url = "http://localhost:11434"
        default_model = "medgemma:27b"
    "#};

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();

        assert_eq!(config.backends.hosted.as_ref().unwrap().protocol, BackendProtocol::Openai);
        assert_eq!(config.backends.local.as_ref().unwrap().protocol, BackendProtocol::Ollama);
        assert_eq!(config.consultation.provider_count, 2);
        assert_eq!(config.consultation.session_ttl().unwrap().as_secs(), 2 * 60 * 60);
        assert_eq!(config.consultation.stream_pacing().unwrap().as_millis(), 100);
        assert_eq!(config.routing.default_backend, BackendKind::Hosted);
        assert!(config.server.health.enabled);
    }

    #[test]
    fn stage_defaults_follow_stage_role() {
        let config = Config::from_toml(MINIMAL).unwrap();
        let stages = &config.consultation.stages;

        assert_eq!(stages.symptom().backend, BackendKind::Hosted);
        assert_eq!(stages.symptom().max_tokens, 500);
        assert_eq!(stages.diagnostic().backend, BackendKind::Local);
        assert_eq!(stages.procedure().max_tokens, 1000);
        assert!((stages.diagnostic().temperature - 0.0).abs() < f32::EPSILON);
        assert_eq!(stages.provider_match().max_tokens, 150);
    }

    #[test]
    fn stage_override_is_partial() {
        let raw = format!(
            "{MINIMAL}\n{}",
            indoc! {r#"
                [consultation.stages.diagnostic]
                backend = "hosted"
                model = "gpt-4o"
            "#}
        );

        let config = Config::from_toml(&raw).unwrap();
        let diagnostic = config.consultation.stages.diagnostic();

        assert_eq!(diagnostic.backend, BackendKind::Hosted);
        assert_eq!(diagnostic.model.as_deref(), Some("gpt-4o"));
        assert_eq!(diagnostic.max_tokens, 1000);
    }

    #[test]
    fn empty_config_is_rejected() {
        let err = Config::from_toml("").unwrap_err();
        assert!(err.to_string().contains("at least one backend"));
    }

    #[test]
    fn stage_bound_to_missing_backend_is_rejected() {
        let raw = indoc! {r#"
            [backends.hosted]
            type = "openai"
            default_model = "gpt-4o-mini"
        "#};

        let err = Config::from_toml(raw).unwrap_err();
        assert!(err.to_string().contains("'diagnostic'"), "{err}");
    }

    #[test]
    fn hosted_only_config_with_rebound_stages() {
        let raw = indoc! {r#"
            [backends.hosted]
            type = "openai"
            default_model = "gpt-4o-mini"

            [consultation.stages.diagnostic]
            backend = "hosted"

            [consultation.stages.procedure]
            backend = "hosted"
        "#};

        assert!(Config::from_toml(raw).is_ok());
    }

    #[test]
    fn model_routes_are_parsed_in_order() {
        let raw = format!(
            "{MINIMAL}\n{}",
            indoc! {r#"
                [routing.models.phraser]
                backend = "hosted"
                model = "gpt-4o-mini"

                [routing.models.medgemma]
                backend = "local"
                model = "medgemma:27b"
            "#}
        );

        let config = Config::from_toml(&raw).unwrap();
        let names: Vec<_> = config.routing.models.keys().cloned().collect();

        assert_eq!(names, ["phraser", "medgemma"]);
        assert_eq!(config.routing.models["medgemma"].backend, BackendKind::Local);
    }

    #[test]
    fn invalid_duration_is_rejected() {
        let raw = format!("{MINIMAL}\n[consultation]\nsession_ttl = \"soon\"\n");
        let err = Config::from_toml(&raw).unwrap_err();
        assert!(err.to_string().contains("consultation.session_ttl"), "{err}");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = format!("{MINIMAL}\n[consultation]\nsesion_ttl = \"1h\"\n");
        assert!(Config::from_toml(&raw).is_err());
    }

    #[test]
    fn cors_credentials_need_explicit_origins() {
        let raw = format!("{MINIMAL}\n[server.cors]\norigins = \"*\"\ncredentials = true\n");
        assert!(Config::from_toml(&raw).is_err());

        let raw = format!("{MINIMAL}\n[server.cors]\norigins = [\"https://app.example\"]\ncredentials = true\n");
        assert!(Config::from_toml(&raw).is_ok());
    }

    #[test]
    fn api_key_comes_from_environment() {
        let raw = indoc! {r#"
            [backends.hosted]
            type = "openai"
            api_key = "{{ env.CAREPATH_LOADER_KEY }}"
            default_model = "gpt-4o-mini"

            [consultation.stages.diagnostic]
            backend = "hosted"

            [consultation.stages.procedure]
            backend = "hosted"
        "#};

        temp_env::with_var("CAREPATH_LOADER_KEY", Some("sk-live"), || {
            use secrecy::ExposeSecret;

            let config = Config::from_toml(raw).unwrap();
            let key = config.backends.hosted.unwrap().api_key.unwrap();
            assert_eq!(key.expose_secret(), "sk-live");
        });
    }
}
