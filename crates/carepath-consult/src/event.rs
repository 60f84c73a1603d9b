//! Pipeline events and their SSE wire form

use serde::Serialize;
use serde_json::Value;

use crate::session::StageName;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Progress,
    StreamStarted,
    StreamingChunk,
    StageComplete,
    /// One provider's finished explanation inside the matching stage
    ProviderComplete,
    Question,
    PipelineComplete,
    Error,
    /// Non-fatal problem, the run continues
    Warning,
}

impl EventKind {
    /// Status string used on the wire
    pub const fn status(self) -> &'static str {
        match self {
            Self::Progress => "processing",
            Self::StreamStarted => "stream_started",
            Self::StreamingChunk => "streaming",
            Self::StageComplete => "complete",
            Self::ProviderComplete => "doctor_complete",
            Self::Question => "question",
            Self::PipelineComplete => "consultation_complete",
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

/// Data carried by an event
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    None,
    Message(String),
    Chunk(Value),
    Result(Value),
    Questions { questions: Vec<String>, message: String },
}

/// One step of a pipeline run as seen by the client
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineEvent {
    pub session_id: String,
    pub stage: Option<StageName>,
    pub kind: EventKind,
    pub payload: EventPayload,
}

impl PipelineEvent {
    pub fn new(session_id: impl Into<String>, stage: Option<StageName>, kind: EventKind, payload: EventPayload) -> Self {
        Self {
            session_id: session_id.into(),
            stage,
            kind,
            payload,
        }
    }

    pub fn progress(session_id: &str, stage: StageName, message: impl Into<String>) -> Self {
        Self::new(session_id, Some(stage), EventKind::Progress, EventPayload::Message(message.into()))
    }

    pub fn stream_started(session_id: &str, stage: StageName) -> Self {
        Self::new(session_id, Some(stage), EventKind::StreamStarted, EventPayload::None)
    }

    pub fn chunk(session_id: &str, stage: StageName, chunk: &impl Serialize) -> Self {
        Self::new(session_id, Some(stage), EventKind::StreamingChunk, EventPayload::Chunk(to_value(chunk)))
    }

    pub fn stage_complete(session_id: &str, stage: StageName, result: &impl Serialize) -> Self {
        Self::new(session_id, Some(stage), EventKind::StageComplete, EventPayload::Result(to_value(result)))
    }

    pub fn provider_complete(session_id: &str, provider: &impl Serialize) -> Self {
        Self::new(
            session_id,
            Some(StageName::ProviderMatch),
            EventKind::ProviderComplete,
            EventPayload::Result(to_value(provider)),
        )
    }

    pub fn question(session_id: &str, stage: StageName, questions: Vec<String>, message: impl Into<String>) -> Self {
        Self::new(
            session_id,
            Some(stage),
            EventKind::Question,
            EventPayload::Questions {
                questions,
                message: message.into(),
            },
        )
    }

    pub fn pipeline_complete(session_id: &str, summary: &impl Serialize) -> Self {
        Self::new(session_id, None, EventKind::PipelineComplete, EventPayload::Result(to_value(summary)))
    }

    pub fn error(session_id: &str, stage: Option<StageName>, message: impl Into<String>) -> Self {
        Self::new(session_id, stage, EventKind::Error, EventPayload::Message(message.into()))
    }

    pub fn warning(session_id: &str, stage: Option<StageName>, message: impl Into<String>) -> Self {
        Self::new(session_id, stage, EventKind::Warning, EventPayload::Message(message.into()))
    }

    /// Flat JSON object sent as one SSE `data:` line
    pub fn to_wire(&self) -> WireEvent<'_> {
        let mut wire = WireEvent {
            session_id: &self.session_id,
            agent: self.stage,
            status: self.kind.status(),
            message: None,
            result: None,
            chunk: None,
            questions: None,
        };

        match &self.payload {
            EventPayload::None => {}
            EventPayload::Message(message) => wire.message = Some(message),
            EventPayload::Chunk(chunk) => wire.chunk = Some(chunk),
            EventPayload::Result(result) => wire.result = Some(result),
            EventPayload::Questions { questions, message } => {
                wire.questions = Some(questions);
                wire.message = Some(message);
            }
        }

        wire
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.to_wire()).unwrap_or_default()
    }
}

/// Serialized shape of a [`PipelineEvent`]
#[derive(Debug, Serialize)]
pub struct WireEvent<'a> {
    pub session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<StageName>,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions: Option<&'a [String]>,
}

fn to_value(value: &impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}
