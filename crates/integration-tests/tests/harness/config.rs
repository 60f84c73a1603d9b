//! Configuration builder for integration tests
//!
//! Assembles TOML text and loads it through `Config::from_toml`, so every
//! test configuration also passes validation.

use carepath_config::Config;

pub struct ConfigBuilder {
    sections: Vec<String>,
    health_enabled: bool,
    include_backends: bool,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            sections: Vec::new(),
            health_enabled: true,
            include_backends: false,
        }
    }

    /// OpenAI-compatible hosted backend pointed at a mock
    pub fn with_hosted(mut self, base_url: &str) -> Self {
        self.sections.push(format!(
            "[backends.hosted]\n\
             type = \"openai\"\n\
             base_url = \"{base_url}\"\n\
             api_key = \"test-key\"\n\
             default_model = \"mock-gpt\"\n\
             timeout = \"5s\"\n"
        ));
        self
    }

    /// Ollama-compatible local backend pointed at a mock
    pub fn with_local(mut self, base_url: &str) -> Self {
        self.sections.push(format!(
            "[backends.local]\n\
             type = \"ollama\"\n\
             base_url = \"{base_url}\"\n\
             default_model = \"mock-med\"\n\
             timeout = \"5s\"\n"
        ));
        self
    }

    /// Bind every consultation stage to the hosted backend
    pub fn all_stages_hosted(mut self) -> Self {
        for stage in ["symptom", "diagnostic", "procedure", "provider_match"] {
            self.sections
                .push(format!("[consultation.stages.{stage}]\nbackend = \"hosted\"\n"));
        }
        self
    }

    /// Route a model name to a backend slot
    pub fn with_route(mut self, name: &str, backend: &str, model: &str) -> Self {
        self.sections.push(format!(
            "[routing.models.\"{name}\"]\nbackend = \"{backend}\"\nmodel = \"{model}\"\n"
        ));
        self
    }

    pub fn without_health(mut self) -> Self {
        self.health_enabled = false;
        self
    }

    pub fn with_backend_health(mut self) -> Self {
        self.include_backends = true;
        self
    }

    pub fn build(self) -> Config {
        let mut raw = format!(
            "[server]\n\
             listen_address = \"127.0.0.1:0\"\n\n\
             [server.health]\n\
             enabled = {}\n\
             include_backends = {}\n\n\
             [consultation]\n\
             stream_pacing = \"1ms\"\n\n",
            self.health_enabled, self.include_backends
        );

        for section in self.sections {
            raw.push_str(&section);
            raw.push('\n');
        }

        Config::from_toml(&raw).expect("test configuration is valid")
    }
}
