//! Drives the five consultation stages and publishes their events
//!
//! Each run executes in its own task and writes events into a bounded
//! channel; the caller consumes them as a stream. While a stage executes,
//! the backend of the following stage is warmed up on the same task so the
//! model is loaded by the time it is needed. Coding stages may pause the
//! run with a clarifying question, after which [`Orchestrator::resume`]
//! re-enters the same stage with the answer appended to the history.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use carepath_config::{BackendKind, ConsultationConfig};
use carepath_llm::{BackendError, Backends};
use futures_util::future;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

use crate::agent::{Agents, symptom};
use crate::error::ConsultError;
use crate::event::PipelineEvent;
use crate::session::{
    CodingResult, ConsultationSummary, Intake, MatchedProvider, QaEntry, Session, SessionStatus, StageName,
    StageResult,
};
use crate::store::{SessionLease, SessionStore};

/// Events of one run, ending with a question, completion or error
pub type ConsultationStream = ReceiverStream<PipelineEvent>;

/// Tunables for a pipeline
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Providers recommended per consultation
    pub provider_count: usize,
    /// Capacity of each run's event channel
    pub event_buffer: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            provider_count: 2,
            event_buffer: 64,
        }
    }
}

/// Consultation pipeline entry points
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    store: SessionStore,
    agents: Agents,
    backends: Backends,
    settings: PipelineSettings,
}

enum Outcome {
    Continue,
    Halt,
}

impl Orchestrator {
    pub fn new(store: SessionStore, agents: Agents, backends: Backends, settings: PipelineSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                agents,
                backends,
                settings,
            }),
        }
    }

    /// Build the store and agents from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a stage is bound to an unconfigured backend or a
    /// duration setting does not parse
    pub fn from_config(config: &ConsultationConfig, backends: Backends) -> Result<Self, BackendError> {
        let store = SessionStore::new(config.session_ttl()?, config.max_sessions);
        let agents = Agents::from_config(config, &backends)?;
        let settings = PipelineSettings {
            provider_count: config.provider_count,
            event_buffer: config.event_buffer,
        };

        Ok(Self::new(store, agents, backends, settings))
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    /// Validate an intake and open a session for it
    ///
    /// # Errors
    ///
    /// Returns `ConsultError::Validation` for blank symptoms and
    /// `ConsultError::SessionBusy` when the requested id is running
    pub fn start(&self, id: Option<String>, intake: Intake) -> Result<Session, ConsultError> {
        if intake.symptoms.trim().is_empty() {
            return Err(ConsultError::Validation("symptoms description is required".to_owned()));
        }

        let session = self.inner.store.create(id, intake)?;
        tracing::info!(session_id = %session.id, "consultation started");
        Ok(session)
    }

    /// Run the pipeline from the first stage
    ///
    /// # Errors
    ///
    /// Returns `ConsultError::SessionNotFound`, `ConsultError::SessionBusy`
    /// when another run holds the session, or `ConsultError::InvalidState`
    /// unless the session is active or failed
    pub fn run(&self, session_id: &str) -> Result<ConsultationStream, ConsultError> {
        let lease = self.inner.store.acquire(session_id)?;

        self.inner.store.mutate(session_id, |session| match session.status {
            SessionStatus::Active | SessionStatus::Error => {
                session.status = SessionStatus::Active;
                session.pending_stage = None;
                Ok(())
            }
            SessionStatus::AwaitingAnswer => Err(ConsultError::InvalidState(format!(
                "session '{session_id}' is waiting for an answer"
            ))),
            SessionStatus::Completed => Err(ConsultError::InvalidState(format!(
                "session '{session_id}' is already completed"
            ))),
        })??;

        Ok(self.spawn(lease, StageName::Symptom))
    }

    /// Answer the outstanding question and continue from the asking stage
    ///
    /// # Errors
    ///
    /// Returns `ConsultError::Validation` for a blank answer,
    /// `ConsultError::SessionNotFound`, `ConsultError::SessionBusy`, or
    /// `ConsultError::InvalidState` when the session is not waiting on `stage`
    pub fn resume(&self, session_id: &str, stage: StageName, answer: &str) -> Result<ConsultationStream, ConsultError> {
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(ConsultError::Validation("answer is required".to_owned()));
        }

        self.inner.store.get(session_id)?;
        let lease = self.inner.store.acquire(session_id)?;

        self.inner.store.mutate(session_id, |session| {
            if session.status != SessionStatus::AwaitingAnswer {
                return Err(ConsultError::InvalidState(format!(
                    "session '{session_id}' is not waiting for an answer"
                )));
            }
            if session.pending_stage != Some(stage) {
                return Err(ConsultError::InvalidState(format!(
                    "stage '{stage}' has no outstanding question"
                )));
            }

            let question = session.pending_question(stage).unwrap_or_default().to_owned();
            session.qa_history.push(QaEntry {
                question,
                answer: answer.to_owned(),
                stage,
            });
            session.status = SessionStatus::Active;
            session.pending_stage = None;
            Ok(())
        })??;

        tracing::info!(session_id, stage = %stage, "consultation resumed");
        Ok(self.spawn(lease, stage))
    }

    /// Additional providers beyond those already recommended
    ///
    /// # Errors
    ///
    /// Returns `ConsultError::Validation` for a zero count,
    /// `ConsultError::SessionNotFound`, or `ConsultError::InvalidState` when
    /// diagnostic coding has not run yet
    pub async fn more_providers(&self, session_id: &str, count: usize) -> Result<Vec<MatchedProvider>, ConsultError> {
        if count == 0 {
            return Err(ConsultError::Validation("count must be at least 1".to_owned()));
        }

        let session = self.inner.store.get(session_id)?;
        let codes = session
            .diagnostic()
            .map(|result| result.codes.clone())
            .ok_or_else(|| ConsultError::InvalidState("diagnostic coding has not run".to_owned()))?;
        let current: Vec<String> = session
            .providers()
            .unwrap_or_default()
            .iter()
            .map(|provider| provider.name.clone())
            .collect();
        let symptoms = session.symptoms().map(|s| s.symptoms.clone()).unwrap_or_default();

        Ok(self
            .inner
            .agents
            .provider_match
            .more_providers(&codes, &current, count, &symptoms)
            .await)
    }

    /// Warm every stage's backend concurrently, reporting which succeeded
    pub async fn warmup_all(&self) -> BTreeMap<StageName, bool> {
        let warmups = StageName::ALL.into_iter().filter_map(|stage| {
            let backend = self.inner.agents.backend(stage)?.clone();
            Some(async move {
                let result = backend.warmup().await;
                if let Err(e) = &result {
                    tracing::warn!(stage = %stage, backend = backend.backend_name(), error = %e, "warmup failed");
                }
                (stage, result.is_ok())
            })
        });

        future::join_all(warmups).await.into_iter().collect()
    }

    /// Health of every configured backend
    pub async fn health(&self) -> BTreeMap<BackendKind, bool> {
        self.inner.backends.health().await
    }

    fn spawn(&self, lease: SessionLease, from: StageName) -> ConsultationStream {
        let (tx, rx) = mpsc::channel(self.inner.settings.event_buffer.max(1));
        let sink = EventSink {
            session_id: lease.session_id().to_owned(),
            tx,
        };
        let span = tracing::info_span!("consultation", session_id = %sink.session_id, from = %from);
        let inner = Arc::clone(&self.inner);

        tokio::spawn(
            async move {
                inner.drive(&sink, from).await;
                drop(lease);
            }
            .instrument(span),
        );

        ReceiverStream::new(rx)
    }
}

/// Sending half of a run's event channel
struct EventSink {
    session_id: String,
    tx: mpsc::Sender<PipelineEvent>,
}

impl EventSink {
    async fn send(&self, event: PipelineEvent) -> Result<(), ConsultError> {
        self.tx.send(event).await.map_err(|_| ConsultError::Cancelled)
    }

    /// Run a future unless the consumer goes away first
    async fn guard<F: Future>(&self, work: F) -> Result<F::Output, ConsultError> {
        tokio::select! {
            biased;
            () = self.tx.closed() => Err(ConsultError::Cancelled),
            output = work => Ok(output),
        }
    }
}

#[derive(Serialize)]
struct ProviderChunk<'a> {
    #[serde(flatten)]
    provider: &'a MatchedProvider,
    explanation_chunk: &'a str,
}

impl Inner {
    async fn drive(&self, sink: &EventSink, from: StageName) {
        let id = sink.session_id.as_str();

        match self.execute(sink, from).await {
            Ok(()) => tracing::info!("consultation run finished"),
            Err(ConsultError::Cancelled) => tracing::info!("consultation stream closed by client"),
            Err(e) => {
                tracing::error!(error = %e, "consultation run failed");

                let marked = self.store.mutate(id, |session| {
                    session.status = SessionStatus::Error;
                    session.pending_stage = None;
                });
                if marked.is_err() {
                    tracing::debug!("session vanished before it could be marked failed");
                }

                // the consumer may already be gone
                let _ = sink.send(PipelineEvent::error(id, None, e.to_string())).await;
            }
        }
    }

    async fn execute(&self, sink: &EventSink, from: StageName) -> Result<(), ConsultError> {
        let mut stage = from;

        loop {
            let next = stage.next();
            let warmup = async {
                let backend = next.and_then(|n| self.agents.backend(n))?;
                match sink.guard(backend.warmup()).await {
                    Ok(Err(e)) => Some(e),
                    _ => None,
                }
            };

            let (outcome, warmup_error) = tokio::join!(self.run_stage(sink, stage), warmup);

            if let Outcome::Halt = outcome? {
                return Ok(());
            }

            if let (Some(next), Some(e)) = (next, warmup_error) {
                tracing::warn!(stage = %next, error = %e, "warmup failed, continuing");
                sink.send(PipelineEvent::warning(
                    &sink.session_id,
                    Some(next),
                    format!("warmup failed: {e}"),
                ))
                .await?;
            }

            match next {
                Some(next) => stage = next,
                None => return Ok(()),
            }
        }
    }

    async fn run_stage(&self, sink: &EventSink, stage: StageName) -> Result<Outcome, ConsultError> {
        match stage {
            StageName::Symptom => self.symptom_stage(sink).await,
            StageName::Diagnostic | StageName::Procedure => self.coding_stage(sink, stage).await,
            StageName::ProviderMatch => self.provider_stage(sink).await,
            StageName::Summary => self.summary_stage(sink).await,
        }
    }

    async fn symptom_stage(&self, sink: &EventSink) -> Result<Outcome, ConsultError> {
        let id = sink.session_id.as_str();
        let stage = StageName::Symptom;
        sink.send(PipelineEvent::progress(id, stage, "Extracting symptoms...")).await?;

        let session = self.store.get(id)?;
        let result = sink
            .guard(
                self.agents
                    .symptom
                    .process(&session.raw_symptom_text, &session.patient_context),
            )
            .await?;

        sink.send(PipelineEvent::stream_started(id, stage)).await?;
        for partial in symptom::progressive(&result) {
            sink.send(PipelineEvent::chunk(id, stage, &partial)).await?;
        }

        self.record(id, stage, StageResult::Symptoms(result.clone()))?;
        sink.send(PipelineEvent::stage_complete(id, stage, &result)).await?;
        Ok(Outcome::Continue)
    }

    async fn coding_stage(&self, sink: &EventSink, stage: StageName) -> Result<Outcome, ConsultError> {
        let id = sink.session_id.as_str();
        let message = match stage {
            StageName::Diagnostic => "Analyzing diagnostic codes...",
            _ => "Generating procedure codes...",
        };
        sink.send(PipelineEvent::progress(id, stage, message)).await?;

        let session = self.store.get(id)?;
        let symptoms = session
            .symptoms()
            .cloned()
            .ok_or_else(|| ConsultError::Pipeline("symptom extraction has not run".to_owned()))?;

        let result: CodingResult = if stage == StageName::Diagnostic {
            let work = self
                .agents
                .diagnostic
                .process(&symptoms, &session.patient_context, &session.qa_history);
            sink.guard(work).await?
        } else {
            let diagnosis = session
                .diagnostic()
                .map(|d| d.codes.clone())
                .ok_or_else(|| ConsultError::Pipeline("diagnostic coding has not run".to_owned()))?;
            let work = self.agents.procedure.process(&symptoms, &diagnosis, &session.qa_history);
            sink.guard(work).await?
        };

        sink.send(PipelineEvent::stream_started(id, stage)).await?;

        let stored = if stage == StageName::Diagnostic {
            StageResult::Diagnostic(result.clone())
        } else {
            StageResult::Procedure(result.clone())
        };
        self.record(id, stage, stored)?;
        sink.send(PipelineEvent::stage_complete(id, stage, &result)).await?;

        if result.questions.is_empty() || !stage.asks_questions() {
            return Ok(Outcome::Continue);
        }

        self.store.mutate(id, |session| {
            session.status = SessionStatus::AwaitingAnswer;
            session.pending_stage = Some(stage);
        })?;

        tracing::info!(stage = %stage, "waiting for an answer");
        let message = match stage {
            StageName::Diagnostic => "Need additional information for diagnosis",
            _ => "Need additional information for procedures",
        };
        sink.send(PipelineEvent::question(id, stage, result.questions, message)).await?;
        Ok(Outcome::Halt)
    }

    async fn provider_stage(&self, sink: &EventSink) -> Result<Outcome, ConsultError> {
        let id = sink.session_id.as_str();
        let stage = StageName::ProviderMatch;
        let agent = &self.agents.provider_match;
        sink.send(PipelineEvent::progress(id, stage, "Selecting healthcare providers..."))
            .await?;

        let session = self.store.get(id)?;
        let codes = session
            .diagnostic()
            .map(|d| d.codes.clone())
            .ok_or_else(|| ConsultError::Pipeline("diagnostic coding has not run".to_owned()))?;
        let symptoms = session.symptoms().map(|s| s.symptoms.clone()).unwrap_or_default();

        let selected = agent.select_providers(&codes, self.settings.provider_count);
        sink.send(PipelineEvent::stream_started(id, stage)).await?;

        let mut providers = Vec::with_capacity(selected.len());
        for mut provider in selected {
            let explanation = sink.guard(agent.explain(&provider, &symptoms)).await?;

            for word in agent.chunks(&explanation) {
                let chunk = ProviderChunk {
                    provider: &provider,
                    explanation_chunk: &word,
                };
                sink.send(PipelineEvent::chunk(id, stage, &chunk)).await?;
                tokio::time::sleep(agent.pacing()).await;
            }

            provider.explanation = explanation;
            sink.send(PipelineEvent::provider_complete(id, &provider)).await?;
            providers.push(provider);
        }

        self.record(id, stage, StageResult::Providers(providers.clone()))?;
        sink.send(PipelineEvent::stage_complete(id, stage, &providers)).await?;
        Ok(Outcome::Continue)
    }

    async fn summary_stage(&self, sink: &EventSink) -> Result<Outcome, ConsultError> {
        let id = sink.session_id.as_str();
        let stage = StageName::Summary;
        sink.send(PipelineEvent::progress(id, stage, "Summarizing consultation...")).await?;

        let summary = summarize(&self.store.get(id)?);
        sink.send(PipelineEvent::stream_started(id, stage)).await?;

        self.store.mutate(id, |session| {
            session
                .stage_results
                .insert(stage, StageResult::Summary(summary.clone()));
            session.status = SessionStatus::Completed;
            session.pending_stage = None;
        })?;

        sink.send(PipelineEvent::stage_complete(id, stage, &summary)).await?;
        sink.send(PipelineEvent::pipeline_complete(id, &summary)).await?;
        Ok(Outcome::Continue)
    }

    /// Replace a stage's stored result wholesale
    fn record(&self, id: &str, stage: StageName, result: StageResult) -> Result<(), ConsultError> {
        self.store.mutate(id, |session| {
            session.stage_results.insert(stage, result);
        })
    }
}

/// Deterministic summary of the stored stage results
pub fn summarize(session: &Session) -> ConsultationSummary {
    let diagnostic_codes = session.diagnostic().map(|d| d.codes.clone()).unwrap_or_default();
    let primary_diagnosis = diagnostic_codes
        .iter()
        .find(|code| code.importance == 1)
        .or_else(|| diagnostic_codes.first())
        .cloned();
    let procedure = session.procedure();

    ConsultationSummary {
        primary_diagnosis,
        procedure_codes: procedure.map(|p| p.codes.clone()).unwrap_or_default(),
        procedure_explanation: procedure.and_then(|p| p.explanation.clone()),
        providers: session
            .providers()
            .unwrap_or_default()
            .iter()
            .map(|provider| provider.name.clone())
            .collect(),
        qa_rounds: session.qa_history.len(),
        diagnostic_codes,
    }
}
