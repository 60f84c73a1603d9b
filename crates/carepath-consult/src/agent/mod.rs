//! Stage agents: one backend call per stage, parsed into a typed result
//!
//! Agents never fail. Unreachable backends and unparseable output are
//! absorbed by the heuristics in [`fallback`], so the pipeline always has a
//! best-effort result to carry forward.

pub mod diagnostic;
pub mod directory;
pub mod fallback;
pub mod parse;
pub mod procedure;
pub mod provider_match;
pub mod symptom;

use std::sync::Arc;
use std::time::Instant;

use carepath_config::{ConsultationConfig, StageBinding};
use carepath_llm::{BackendError, Backends, GenerateOptions, InferenceBackend};

pub use diagnostic::DiagnosticAgent;
pub use directory::ProviderDirectory;
pub use procedure::ProcedureAgent;
pub use provider_match::ProviderMatchAgent;
pub use symptom::SymptomAgent;

use crate::session::{QaEntry, StageName};

/// An inference backend bound to one stage's sampling settings
#[derive(Clone)]
pub struct BoundBackend {
    stage: StageName,
    backend: Arc<dyn InferenceBackend>,
    options: GenerateOptions,
}

impl BoundBackend {
    pub fn new(stage: StageName, backend: Arc<dyn InferenceBackend>, binding: &StageBinding) -> Self {
        Self {
            stage,
            backend,
            options: GenerateOptions {
                model: binding.model.clone(),
                temperature: binding.temperature,
                max_tokens: binding.max_tokens,
            },
        }
    }

    /// Resolve a stage binding against the configured backends
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotConfigured` if the bound slot is empty
    pub fn resolve(stage: StageName, backends: &Backends, binding: &StageBinding) -> Result<Self, BackendError> {
        let backend = backends.get(binding.backend)?;
        Ok(Self::new(stage, Arc::clone(backend), binding))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let started = Instant::now();
        let result = self.backend.generate(prompt, &self.options).await;

        tracing::debug!(
            stage = %self.stage,
            backend = self.backend.name(),
            elapsed_ms = started.elapsed().as_millis(),
            ok = result.is_ok(),
            "stage inference finished"
        );
        result
    }

    /// Issue a one-token request so the model is loaded before it is needed
    pub async fn warmup(&self) -> Result<(), BackendError> {
        let options = GenerateOptions::warmup(self.options.model.clone());
        self.backend.generate("ping", &options).await.map(|_| ())
    }
}

/// Render prior answers for inclusion in a prompt, empty when there are none
pub fn qa_transcript(history: &[QaEntry]) -> String {
    if history.is_empty() {
        return String::new();
    }

    let pairs: Vec<String> = history
        .iter()
        .map(|qa| format!("Q: {} A: {}", qa.question, qa.answer))
        .collect();
    format!("Previous Q&A: {}", pairs.join("; "))
}

/// The four backend-calling agents of a pipeline
#[derive(Clone)]
pub struct Agents {
    pub symptom: SymptomAgent,
    pub diagnostic: DiagnosticAgent,
    pub procedure: ProcedureAgent,
    pub provider_match: ProviderMatchAgent,
}

impl Agents {
    /// Bind every stage to its configured backend
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotConfigured` if a stage names an empty slot
    pub fn from_config(config: &ConsultationConfig, backends: &Backends) -> Result<Self, BackendError> {
        let stages = &config.stages;
        let pacing = config
            .stream_pacing()
            .map_err(BackendError::Internal)?;

        Ok(Self {
            symptom: SymptomAgent::new(BoundBackend::resolve(StageName::Symptom, backends, &stages.symptom())?),
            diagnostic: DiagnosticAgent::new(BoundBackend::resolve(
                StageName::Diagnostic,
                backends,
                &stages.diagnostic(),
            )?),
            procedure: ProcedureAgent::new(BoundBackend::resolve(
                StageName::Procedure,
                backends,
                &stages.procedure(),
            )?),
            provider_match: ProviderMatchAgent::new(
                BoundBackend::resolve(StageName::ProviderMatch, backends, &stages.provider_match())?,
                ProviderDirectory::from_config(&config.providers),
            )
            .with_streaming(config.streamed_words, pacing),
        })
    }

    /// Backend bound to a backend-calling stage
    pub fn backend(&self, stage: StageName) -> Option<&BoundBackend> {
        match stage {
            StageName::Symptom => Some(self.symptom.backend()),
            StageName::Diagnostic => Some(self.diagnostic.backend()),
            StageName::Procedure => Some(self.procedure.backend()),
            StageName::ProviderMatch => Some(self.provider_match.backend()),
            StageName::Summary => None,
        }
    }
}
