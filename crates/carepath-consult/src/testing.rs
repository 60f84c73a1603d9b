//! Scripted backend and pipeline assembly shared by unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use carepath_config::{BackendKind, ConsultationConfig};
use carepath_llm::{BackendError, Backends, CompletionRequest, CompletionResponse, EventStream, GenerateOptions, InferenceBackend};

use crate::agent::Agents;
use crate::orchestrator::{Orchestrator, PipelineSettings};
use crate::store::SessionStore;

pub const SYMPTOMS_JSON: &str = r#"{"symptoms": ["severe headache", "nausea"], "pregnancy_related": true}"#;

pub const DIAGNOSIS_JSON: &str = r#"{"codes": [
    {"code": "R51", "description": "Headache", "importance": 2},
    {"code": "O26.89", "description": "Other specified pregnancy related conditions", "importance": 1}
], "questions": []}"#;

pub const DIAGNOSIS_WITH_QUESTION: &str = r#"{"codes": [
    {"code": "O26.89", "description": "Other specified pregnancy related conditions", "importance": 1}
], "questions": ["Have you had any vision changes?"]}"#;

pub const PROCEDURE_JSON: &str = r#"{"codes": [
    {"code": "99214", "description": "Office visit", "importance": 1},
    {"code": "36415", "description": "Venipuncture", "importance": 2}
], "explanation": "Evaluation with blood pressure monitoring and labs.", "questions": []}"#;

pub const PROCEDURE_WITH_QUESTION: &str = r#"{"codes": [
    {"code": "99214", "description": "Office visit", "importance": 1}
], "explanation": "Office evaluation recommended.", "questions": ["What medications are you taking?"]}"#;

pub const EXPLANATION: &str = "They manage high risk pregnancies with daily monitoring.";

type Hook = Box<dyn Fn(&str) + Send + Sync>;

/// Backend answering each stage prompt from a script
pub struct Scripted {
    diagnostic: Mutex<VecDeque<&'static str>>,
    procedure: Mutex<VecDeque<&'static str>>,
    fail_warmup: bool,
    hook: Option<Hook>,
    pub warmups: AtomicUsize,
    pub calls: AtomicUsize,
}

impl Scripted {
    pub fn new() -> Self {
        Self {
            diagnostic: Mutex::new(VecDeque::new()),
            procedure: Mutex::new(VecDeque::new()),
            fail_warmup: false,
            hook: None,
            warmups: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Diagnostic replies, used in order; the last default applies afterwards
    pub fn diagnostic(self, replies: &[&'static str]) -> Self {
        *self.diagnostic.lock().unwrap() = replies.iter().copied().collect();
        self
    }

    pub fn procedure(self, replies: &[&'static str]) -> Self {
        *self.procedure.lock().unwrap() = replies.iter().copied().collect();
        self
    }

    pub fn failing_warmup(mut self) -> Self {
        self.fail_warmup = true;
        self
    }

    /// Run a callback before answering each prompt
    pub fn on_generate(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    fn next(queue: &Mutex<VecDeque<&'static str>>, default: &'static str) -> String {
        queue.lock().unwrap().pop_front().unwrap_or(default).to_owned()
    }
}

#[async_trait]
impl InferenceBackend for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-1"
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn generate(&self, prompt: &str, _options: &GenerateOptions) -> Result<String, BackendError> {
        if prompt == "ping" {
            self.warmups.fetch_add(1, Ordering::SeqCst);
            if self.fail_warmup {
                return Err(BackendError::Unavailable {
                    backend: "scripted".to_owned(),
                    message: "model still loading".to_owned(),
                });
            }
            return Ok(String::new());
        }

        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.hook {
            hook(prompt);
        }

        let reply = if prompt.contains("ICD-10") {
            Self::next(&self.diagnostic, DIAGNOSIS_JSON)
        } else if prompt.contains("CPT") {
            Self::next(&self.procedure, PROCEDURE_JSON)
        } else if prompt.contains("distinct symptoms") {
            SYMPTOMS_JSON.to_owned()
        } else {
            EXPLANATION.to_owned()
        };
        Ok(reply)
    }

    async fn chat_complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, BackendError> {
        Err(BackendError::InvalidRequest("not scripted".to_owned()))
    }

    async fn chat_complete_stream(&self, _request: &CompletionRequest) -> Result<EventStream, BackendError> {
        Err(BackendError::InvalidRequest("not scripted".to_owned()))
    }
}

pub fn backends(backend: Arc<Scripted>) -> Backends {
    Backends::default()
        .with(BackendKind::Hosted, backend.clone())
        .with(BackendKind::Local, backend)
}

pub fn config() -> ConsultationConfig {
    ConsultationConfig {
        stream_pacing: "1ms".to_owned(),
        ..ConsultationConfig::default()
    }
}

/// Orchestrator over a scripted backend with the given event buffer
pub fn orchestrator_with(backend: Arc<Scripted>, store: SessionStore, event_buffer: usize) -> Orchestrator {
    let backends = backends(backend);
    let agents = Agents::from_config(&config(), &backends).unwrap();
    let settings = PipelineSettings {
        provider_count: 2,
        event_buffer,
    };

    Orchestrator::new(store, agents, backends, settings)
}

pub fn orchestrator(backend: Arc<Scripted>) -> Orchestrator {
    orchestrator_with(backend, store(), 64)
}

pub fn store() -> SessionStore {
    SessionStore::new(Duration::from_secs(60), 100)
}
