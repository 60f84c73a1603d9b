//! Medical consultation pipeline
//!
//! Turns a free-text symptom description into diagnostic and procedure
//! codes, matched providers and a summary by running five stages against
//! the inference backends, publishing each step as an event stream.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod agent;
pub mod error;
pub mod event;
#[cfg(feature = "http")]
pub mod handler;
pub mod multiplex;
pub mod orchestrator;
pub mod session;
pub mod store;
#[cfg(test)]
mod testing;

pub use agent::{Agents, ProviderDirectory};
pub use error::ConsultError;
pub use event::{EventKind, EventPayload, PipelineEvent};
#[cfg(feature = "http")]
pub use handler::consultation_router;
pub use orchestrator::{ConsultationStream, Orchestrator, PipelineSettings, summarize};
pub use session::{Intake, PatientContext, Session, SessionStatus, StageName};
pub use store::SessionStore;
